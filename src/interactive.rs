//! Menu-driven front-end. It owns no persistent state and only reacts to the
//! events the core sends back.

use crate::error::{GovmError, Result};
use crate::events::{spawn_operation, Core, CoreEvent, Operation};
use crate::models::VersionRecord;
use crate::shim::path_instructions;
use crate::utils::{report, Status};
use colored::*;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Install,
    Use,
    Delete,
    ShowInstalled,
    Refresh,
    Quit,
}

impl Action {
    const MENU: [Action; 6] = [
        Action::Install,
        Action::Use,
        Action::Delete,
        Action::ShowInstalled,
        Action::Refresh,
        Action::Quit,
    ];

    fn label(&self) -> &'static str {
        match self {
            Action::Install => "Install a version",
            Action::Use => "Switch to an installed version",
            Action::Delete => "Delete an installed version",
            Action::ShowInstalled => "Show installed versions",
            Action::Refresh => "Refresh the catalog",
            Action::Quit => "Quit",
        }
    }
}

/// What the user sees between operations.
#[derive(Debug, Default)]
pub struct Session {
    pub records: Vec<VersionRecord>,
    pub message: Option<(Status, String)>,
    pub shim_dir: PathBuf,
}

impl Session {
    pub fn new(shim_dir: PathBuf) -> Self {
        Self {
            shim_dir,
            ..Self::default()
        }
    }

    fn set_message(&mut self, status: Status, message: String) {
        self.message = Some((status, message));
    }

    /// Turn a menu choice on `record` into an operation, or explain why not.
    pub fn request(&self, action: Action, record: &VersionRecord) -> std::result::Result<Operation, String> {
        match action {
            Action::Install if record.installed => {
                Err(format!("Go {} is already installed.", record.version))
            }
            Action::Install => Ok(Operation::Install(record.clone())),
            Action::Use if !record.installed => {
                Err("You need to install this version first.".to_string())
            }
            Action::Use => Ok(Operation::Switch(record.clone())),
            Action::Delete if !record.installed => Err("This version is not installed.".to_string()),
            Action::Delete if record.active => Err(
                "Cannot delete active version. Switch to another version first.".to_string(),
            ),
            Action::Delete => Ok(Operation::Delete(record.clone())),
            _ => Err(format!("{} does not act on a version.", action.label())),
        }
    }

    /// Fold one core event into the session.
    pub fn apply(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::CatalogReady(records) => {
                self.records = records;
                self.message = None;
            }
            CoreEvent::CatalogFailed(e) | CoreEvent::OperationFailed(e) => {
                self.set_message(Status::Error, e.to_string());
            }
            CoreEvent::InstallCompleted { version, path } => {
                if let Some(record) = self.records.iter_mut().find(|r| r.version == version) {
                    record.installed = true;
                    record.path = Some(path);
                }
                self.set_message(Status::Success, format!("Successfully installed Go {}", version));
            }
            CoreEvent::SwitchCompleted {
                version,
                shim_on_path,
            } => {
                for record in &mut self.records {
                    record.active = record.version == version;
                }
                let message = if shim_on_path {
                    format!("Switched to Go {}! Run 'go version' to verify.", version)
                } else {
                    format!(
                        "Switched to Go {}!\n\n{}",
                        version,
                        path_instructions(&self.shim_dir)
                    )
                };
                self.set_message(Status::Success, message);
            }
            CoreEvent::DeleteCompleted { version } => {
                if let Some(record) = self.records.iter_mut().find(|r| r.version == version) {
                    record.installed = false;
                    record.active = false;
                    record.path = None;
                }
                self.set_message(Status::Success, format!("Successfully deleted Go {}", version));
            }
        }
    }

    fn candidates(&self, action: Action) -> Vec<&VersionRecord> {
        self.records
            .iter()
            .filter(|r| match action {
                Action::Use | Action::Delete => r.installed,
                _ => true,
            })
            .collect()
    }
}

fn record_label(record: &VersionRecord) -> String {
    let mut label = record.version.clone();
    if record.active {
        label.push_str(&format!(" {}", "(active)".green()));
    }
    if record.installed {
        label.push_str(&format!(" {}", "(installed)".cyan()));
    }
    if !record.stable {
        label.push_str(&format!(" {}", "(unstable)".yellow()));
    }
    label
}

/// Run one operation in the background while a spinner ticks.
async fn execute(core: Arc<Core>, operation: Operation, label: String) -> CoreEvent {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _handle = spawn_operation(core, operation, tx);

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.blue} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(label);
    spinner.enable_steady_tick(Duration::from_millis(100));

    let event = rx.recv().await.unwrap_or_else(|| {
        CoreEvent::OperationFailed(GovmError::Config(
            "operation ended without reporting a result".to_string(),
        ))
    });

    spinner.finish_and_clear();
    event
}

fn prompt_error(e: dialoguer::Error) -> GovmError {
    match e {
        dialoguer::Error::IO(source) => GovmError::Io(source),
    }
}

fn print_installed(session: &Session) {
    let installed: Vec<&VersionRecord> = session.records.iter().filter(|r| r.installed).collect();
    if installed.is_empty() {
        println!("  No versions installed yet");
        return;
    }

    println!("{}", "Installed Go Versions:".green().bold());
    for record in installed {
        let path = record
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let status = if record.active { "active" } else { "" };
        println!("  {:<10} {:<50} {}", record.version.cyan(), path.dimmed(), status.green());
    }
}

pub async fn run(core: Arc<Core>) -> Result<()> {
    let theme = ColorfulTheme::default();
    let mut session = Session::new(core.config().shim_dir.clone());

    println!("{}", "GoVM - Go Version Manager".blue().bold());
    if !core.shims.shim_on_path() {
        report(
            Status::Warning,
            &format!("GoVM is not in your PATH\n{}", path_instructions(&core.config().shim_dir)),
        );
    }

    let event = execute(core.clone(), Operation::FetchCatalog, "Loading versions...".to_string()).await;
    session.apply(event);

    loop {
        if let Some((status, message)) = session.message.take() {
            report(status, &message);
        }

        let labels: Vec<&str> = Action::MENU.iter().map(|a| a.label()).collect();
        let choice = Select::with_theme(&theme)
            .with_prompt("What would you like to do?")
            .items(&labels)
            .default(0)
            .interact_opt()
            .map_err(prompt_error)?;

        let action = match choice {
            Some(index) => Action::MENU[index],
            None => Action::Quit,
        };

        match action {
            Action::Quit => return Ok(()),
            Action::Refresh => {
                let event =
                    execute(core.clone(), Operation::FetchCatalog, "Loading versions...".to_string())
                        .await;
                session.apply(event);
                continue;
            }
            Action::ShowInstalled => {
                print_installed(&session);
                continue;
            }
            _ => {}
        }

        let candidates = session.candidates(action);
        if candidates.is_empty() {
            let message = match action {
                Action::Install => "The catalog is empty. Try refreshing.",
                _ => "No versions installed yet.",
            };
            session.set_message(Status::Error, message.to_string());
            continue;
        }

        let items: Vec<String> = candidates.iter().map(|r| record_label(r)).collect();
        let picked = Select::with_theme(&theme)
            .with_prompt("Go version")
            .items(&items)
            .default(0)
            .max_length(15)
            .interact_opt()
            .map_err(prompt_error)?;

        let Some(index) = picked else {
            continue;
        };
        let record = candidates[index].clone();

        let operation = match session.request(action, &record) {
            Ok(operation) => operation,
            Err(message) => {
                session.set_message(Status::Error, message);
                continue;
            }
        };

        if action == Action::Delete
            && !crate::utils::confirm(&format!("Are you sure you want to delete Go {}?", record.version))
        {
            session.set_message(Status::Info, "Delete operation canceled.".to_string());
            continue;
        }

        let label = match action {
            Action::Install => format!("Installing Go {}...", record.version),
            Action::Use => format!("Switching to Go {}...", record.version),
            _ => format!("Deleting Go {}...", record.version),
        };
        let event = execute(core.clone(), operation, label).await;
        session.apply(event);
    }
}
