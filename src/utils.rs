use colored::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
    Warning,
    Info,
}

impl Status {
    fn symbol(&self) -> ColoredString {
        match self {
            Status::Success => "✓".green().bold(),
            Status::Error => "✗".red().bold(),
            Status::Warning => "⚠".yellow().bold(),
            Status::Info => "ℹ".blue().bold(),
        }
    }
}

/// Print a labeled status line; errors go to stderr.
pub fn report(status: Status, message: &str) {
    match status {
        Status::Error => eprintln!("{} {}", status.symbol(), message),
        _ => println!("{} {}", status.symbol(), message),
    }
}

pub fn print_success(message: &str) {
    report(Status::Success, message);
}

pub fn print_error(message: &str) {
    report(Status::Error, message);
}

pub fn print_warning(message: &str) {
    report(Status::Warning, message);
}

pub fn print_info(message: &str) {
    report(Status::Info, message);
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

pub fn confirm(prompt: &str) -> bool {
    use dialoguer::Confirm;

    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .unwrap_or(false)
}
