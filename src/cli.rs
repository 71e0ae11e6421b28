use crate::config::Config;
use crate::error::{GovmError, Result};
use crate::events::{Core, CoreEvent, Operation};
use crate::models::VersionRecord;
use crate::resolve::resolve_version;
use crate::shim::path_instructions;
use crate::utils::{confirm, format_size, print_error, print_info, print_success, print_warning};
use clap::{Parser, Subcommand};
use colored::*;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "govm")]
#[command(about = "Go Version Manager", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a Go version (e.g., 1.22, 1.21.5)
    Install {
        /// Version to install; a prefix picks the newest match
        version: String,

        /// Reinstall even if the version is already present
        #[arg(short, long)]
        force: bool,
    },

    /// Switch to an installed Go version
    Use {
        /// Version to activate
        version: String,
    },

    /// Delete an installed Go version
    #[command(aliases = ["uninstall", "rm"])]
    Delete {
        /// Version to delete
        version: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// List installed Go versions
    #[command(alias = "ls")]
    List,

    /// List Go versions available for download
    #[command(alias = "ls-remote")]
    ListRemote {
        /// Include betas and release candidates
        #[arg(long)]
        all: bool,
    },

    /// Show the active Go version
    Current,

    /// Show the govm version
    Version,

    /// Show govm configuration
    Config {
        /// Show a single config key
        key: Option<String>,
    },

    /// Remove leftover downloads
    Clean {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

impl Cli {
    /// Run the parsed command. "Not found"-style outcomes are printed and
    /// treated as success; everything else is returned to the caller.
    pub async fn run(self, config: Config) -> Result<()> {
        let Some(command) = self.command else {
            let core = Arc::new(Core::new(config, false)?);
            return crate::interactive::run(core).await;
        };

        let core = Core::new(config, true)?;
        let result = match command {
            Commands::Install { ref version, force } => install(&core, version, force).await,
            Commands::Use { ref version } => use_version(&core, version).await,
            Commands::Delete { ref version, yes } => delete(&core, version, yes).await,
            Commands::List => list(&core),
            Commands::ListRemote { all } => list_remote(&core, all).await,
            Commands::Current => current(&core),
            Commands::Version => {
                println!("govm {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
            Commands::Config { ref key } => show_config(core.config(), key.as_deref()),
            Commands::Clean { yes } => clean(&core, yes),
        };

        match result {
            Err(e) if e.is_informational() => {
                print_error(&e.to_string());
                Ok(())
            }
            other => other,
        }
    }
}

fn completed(event: CoreEvent) -> Result<CoreEvent> {
    match event {
        CoreEvent::CatalogFailed(e) | CoreEvent::OperationFailed(e) => Err(e),
        event => Ok(event),
    }
}

async fn catalog(core: &Core) -> Result<Vec<VersionRecord>> {
    match completed(core.run(Operation::FetchCatalog).await)? {
        CoreEvent::CatalogReady(records) => Ok(records),
        other => Err(GovmError::Config(format!("unexpected result {:?}", other))),
    }
}

async fn install(core: &Core, token: &str, force: bool) -> Result<()> {
    print_info(&format!("Looking for Go version matching '{}'...", token));

    let records = catalog(core).await?;
    let record = resolve_version(token, &records, false)?;

    if record.installed && !force {
        print_warning(&format!("Go {} is already installed", record.version));
        println!("  Use {} to reinstall", "--force".cyan());
        return Ok(());
    }

    if let Some(size) = record.size {
        print_info(&format!("Download size: {}", format_size(size)));
    }

    let version = record.version.clone();
    if let CoreEvent::InstallCompleted { version, path } =
        completed(core.run(Operation::Install(record)).await)?
    {
        print_success(&format!("Go {} installed successfully", version));
        println!("  Path: {}", path.display().to_string().dimmed());
    }

    println!("\n{}", "Next steps:".yellow());
    println!("  govm use {}    # Activate this version", version);

    Ok(())
}

async fn use_version(core: &Core, token: &str) -> Result<()> {
    let installed = core.manager.installed_records()?;
    let record = resolve_version(token, &installed, true).map_err(|e| match e {
        GovmError::VersionNotFound(token) => GovmError::NotInstalled(token),
        e => e,
    })?;

    if let CoreEvent::SwitchCompleted {
        version,
        shim_on_path,
    } = completed(core.run(Operation::Switch(record)).await)?
    {
        print_success(&format!("Now using Go {}", version));
        if !shim_on_path {
            print_warning("The govm shim directory is not in your PATH");
            println!("{}", path_instructions(&core.config().shim_dir));
        }
    }

    Ok(())
}

async fn delete(core: &Core, token: &str, yes: bool) -> Result<()> {
    let installed = core.manager.installed_records()?;
    let record = resolve_version(token, &installed, true).map_err(|e| match e {
        GovmError::VersionNotFound(token) => GovmError::NotInstalled(token),
        e => e,
    })?;

    if record.active {
        return Err(GovmError::ActiveVersion(record.version));
    }

    if !yes && !confirm(&format!("Delete Go {}?", record.version)) {
        print_info("Delete cancelled");
        return Ok(());
    }

    if let CoreEvent::DeleteCompleted { version } =
        completed(core.run(Operation::Delete(record)).await)?
    {
        print_success(&format!("Go {} deleted", version));
    }

    Ok(())
}

fn list(core: &Core) -> Result<()> {
    let installed = core.manager.list_installed()?;

    if installed.is_empty() {
        print_warning("No Go versions installed");
        println!("\n{}", "Install a version:".yellow());
        println!("  govm install 1.22");
        return Ok(());
    }

    let active = core.manager.active_version();

    println!("{}", "Installed Go Versions:".green().bold());
    for version in &installed {
        let is_active = active.as_deref() == Some(version.version.as_str());
        let prefix = if is_active {
            "→".green().bold()
        } else {
            " ".normal()
        };
        let marker = if is_active {
            format!(" ({})", "active".green())
        } else {
            String::new()
        };

        println!(
            "  {} {:<10}{}  {}",
            prefix,
            version.version.cyan(),
            marker,
            version.installed_at.format("%Y-%m-%d").to_string().dimmed()
        );
    }

    if active.is_none() {
        println!("\n{}", "Activate a version:".yellow());
        println!("  govm use <version>");
    }

    Ok(())
}

async fn list_remote(core: &Core, all: bool) -> Result<()> {
    print_info("Fetching available Go versions...");

    let records = catalog(core).await?;
    let show_unstable = all || core.config().show_unstable;

    println!("\n{}", "Available Go Versions:".green().bold());
    for record in records.iter().filter(|r| show_unstable || r.stable) {
        let mut markers = Vec::new();
        if record.active {
            markers.push("active".green().to_string());
        }
        if record.installed {
            markers.push("installed".cyan().to_string());
        }
        if !record.stable {
            markers.push("unstable".yellow().to_string());
        }

        let marker_str = if markers.is_empty() {
            String::new()
        } else {
            format!(" ({})", markers.join(", "))
        };
        println!("  {}{}", record.version.cyan(), marker_str);
    }

    println!("\n{}", "Usage:".yellow());
    println!("  govm install <version>");
    println!("  govm install 1.22");

    Ok(())
}

fn current(core: &Core) -> Result<()> {
    match core.manager.active_version() {
        Some(version) => println!("{}", version),
        None => {
            print_warning("No active Go version");
            println!("  govm use <version>");
        }
    }
    Ok(())
}

fn show_config(config: &Config, key: Option<&str>) -> Result<()> {
    match key {
        Some("dir" | "govm_dir") => println!("{}", config.govm_dir.display()),
        Some("versions_dir") => println!("{}", config.versions_dir.display()),
        Some("downloads_dir") => println!("{}", config.downloads_dir.display()),
        Some("shim_dir") => println!("{}", config.shim_dir.display()),
        Some("catalog_url") => println!("{}", config.catalog_url),
        Some("download_base_url") => println!("{}", config.download_base_url),
        Some("catalog_timeout_secs") => println!("{}", config.catalog_timeout_secs),
        Some("verify_checksums") => println!("{}", config.verify_checksums),
        Some("show_unstable") => println!("{}", config.show_unstable),
        Some(other) => print_warning(&format!("Unknown config key: {}", other)),
        None => {
            println!("{}", "GoVM Configuration:".green().bold());
            println!("  {} {}", "GoVM Directory:".cyan(), config.govm_dir.display());
            println!("  {} {}", "Versions Directory:".cyan(), config.versions_dir.display());
            println!("  {} {}", "Downloads Directory:".cyan(), config.downloads_dir.display());
            println!("  {} {}", "Shim Directory:".cyan(), config.shim_dir.display());
            println!("  {} {}", "Catalog URL:".cyan(), config.catalog_url);
            println!("  {} {}s", "Catalog Timeout:".cyan(), config.catalog_timeout_secs);
            println!("  {} {}", "Verify Checksums:".cyan(), config.verify_checksums);
            println!("  {} {}", "Show Unstable:".cyan(), config.show_unstable);
        }
    }

    Ok(())
}

fn clean(core: &Core, yes: bool) -> Result<()> {
    let files = core.installer.cached_downloads()?;

    if files.is_empty() {
        print_info("No leftover downloads");
        return Ok(());
    }

    let total: u64 = files.iter().map(|(_, size)| size).sum();
    println!(
        "{} {} in downloads ({} files)",
        "Found:".yellow(),
        format_size(total),
        files.len()
    );

    if yes || confirm("Remove all leftover downloads?") {
        let freed = core.installer.clean_downloads()?;
        print_success(&format!("Cleaned {}", format_size(freed)));
    } else {
        print_info("Clean cancelled");
    }

    Ok(())
}
