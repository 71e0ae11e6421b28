use crate::config::Config;
use crate::error::{GovmError, IoContext, Result};
use crate::models::VersionRecord;
use crate::version_manager::write_active_marker;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Every generated shim carries this marker so it can be told apart from
/// files the user placed in the shim directory.
pub const SHIM_MARKER: &str = "govm-shim";

const STAGING_DIR: &str = ".shim-staging";
const RETIRED_DIR: &str = ".shim-old";

/// Outcome of a successful switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub version: String,
    /// Whether the shim directory is on the PATH this process resolves with.
    pub shim_on_path: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShimStyle {
    /// `#!/bin/sh` wrapper, executable bit set
    Posix,
    /// `.bat` wrapper
    Batch,
}

impl ShimStyle {
    pub fn native() -> Self {
        if cfg!(windows) {
            ShimStyle::Batch
        } else {
            ShimStyle::Posix
        }
    }

    fn file_name(&self, command: &str) -> String {
        match self {
            ShimStyle::Posix => command.to_string(),
            ShimStyle::Batch => format!("{}.bat", command),
        }
    }

    /// Script forwarding all arguments, stdio and the exit code to `target`.
    pub fn render(&self, target: &Path) -> String {
        match self {
            ShimStyle::Posix => format!(
                "#!/bin/sh\n# {}\nexec {} \"$@\"\n",
                SHIM_MARKER,
                sh_quote(&target.display().to_string())
            ),
            ShimStyle::Batch => format!(
                "@echo off\r\nREM {}\r\n\"{}\" %*\r\n",
                SHIM_MARKER,
                target.display()
            ),
        }
    }
}

fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Command name exposed for a binary file name.
pub fn command_name(file_name: &str) -> &str {
    let stem_len = file_name.len().saturating_sub(4);
    match file_name.get(stem_len..) {
        Some(ext) if stem_len > 0 && ext.eq_ignore_ascii_case(".exe") => &file_name[..stem_len],
        _ => file_name,
    }
}

pub fn is_managed_shim(path: &Path) -> bool {
    std::fs::read_to_string(path)
        .map(|body| body.contains(SHIM_MARKER))
        .unwrap_or(false)
}

/// Whether `dir` appears verbatim among the entries of a PATH value.
pub fn dir_on_path(dir: &Path, path_var: &OsStr) -> bool {
    std::env::split_paths(path_var).any(|entry| entry == dir)
}

pub struct ShimManager {
    config: Config,
    style: ShimStyle,
}

impl ShimManager {
    pub fn new(config: Config) -> Self {
        Self::with_style(config, ShimStyle::native())
    }

    pub fn with_style(config: Config, style: ShimStyle) -> Self {
        Self { config, style }
    }

    pub fn shim_on_path(&self) -> bool {
        std::env::var_os("PATH")
            .map(|path| dir_on_path(&self.config.shim_dir, &path))
            .unwrap_or(false)
    }

    /// Point every shim at `record`'s binaries and store it as the active version.
    ///
    /// The new shim set is written to a staging directory and swapped in only
    /// after every write succeeded. The previous set is kept aside until the
    /// marker is written, so any failure leaves the previous shims and marker.
    pub fn activate(&self, record: &VersionRecord) -> Result<Activation> {
        let bin_dir = record
            .bin_dir()
            .unwrap_or_else(|| self.config.get_version_dir(&record.version).join("bin"));

        if !bin_dir.is_dir() {
            return Err(GovmError::BinDirMissing(bin_dir));
        }

        let commands = self.collect_commands(&bin_dir)?;
        let staging = self.config.govm_dir.join(STAGING_DIR);
        let retired = self.config.govm_dir.join(RETIRED_DIR);

        let staged = self
            .stage_shims(&staging, &commands)
            .and_then(|_| self.carry_over_unmanaged(&staging));
        if let Err(e) = staged {
            discard(&staging);
            return Err(e);
        }

        let had_previous = match self.swap_in(&staging, &retired) {
            Ok(had_previous) => had_previous,
            Err(e) => {
                discard(&staging);
                return Err(e);
            }
        };

        if let Err(e) = write_active_marker(&self.config, &record.version) {
            self.roll_back(&retired, had_previous);
            return Err(e);
        }

        if had_previous {
            discard(&retired);
        }

        debug!(
            "Activated Go {} with {} shims",
            record.version,
            commands.len()
        );

        Ok(Activation {
            version: record.version.clone(),
            shim_on_path: self.shim_on_path(),
        })
    }

    /// Command name to absolute binary path, for every file in `bin_dir`.
    fn collect_commands(&self, bin_dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
        let bin_dir = std::fs::canonicalize(bin_dir).at(bin_dir)?;
        let mut commands = BTreeMap::new();

        for entry in WalkDir::new(&bin_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| GovmError::Filesystem {
                path: bin_dir.clone(),
                source: e.into(),
            })?;

            if entry.file_type().is_dir() {
                continue;
            }

            let Some(file_name) = entry.file_name().to_str() else {
                warn!("Skipping non UTF-8 file name in {}", bin_dir.display());
                continue;
            };

            commands.insert(command_name(file_name).to_string(), entry.into_path());
        }

        Ok(commands)
    }

    fn stage_shims(&self, staging: &Path, commands: &BTreeMap<String, PathBuf>) -> Result<()> {
        if staging.exists() {
            std::fs::remove_dir_all(staging).at(staging)?;
        }
        std::fs::create_dir_all(staging).at(staging)?;

        for (command, target) in commands {
            let shim_path = staging.join(self.style.file_name(command));
            self.write_shim(&shim_path, target)
                .map_err(|source| GovmError::ShimWrite {
                    command: command.clone(),
                    source,
                })?;
        }

        Ok(())
    }

    fn write_shim(&self, shim_path: &Path, target: &Path) -> std::io::Result<()> {
        std::fs::write(shim_path, self.style.render(target))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(shim_path, std::fs::Permissions::from_mode(0o755))?;
        }

        Ok(())
    }

    /// Keep files in the shim directory that govm did not generate.
    fn carry_over_unmanaged(&self, staging: &Path) -> Result<()> {
        let shim_dir = &self.config.shim_dir;
        if !shim_dir.is_dir() {
            return Ok(());
        }

        for entry in std::fs::read_dir(shim_dir).at(shim_dir)? {
            let path = entry.at(shim_dir)?.path();
            let Some(name) = path.file_name() else {
                continue;
            };

            let dest = staging.join(name);
            if path.is_dir() || is_managed_shim(&path) || dest.exists() {
                continue;
            }

            std::fs::copy(&path, &dest).at(&dest)?;
        }

        Ok(())
    }

    /// Move the live shim dir to `retired` and `staging` into its place.
    /// Returns whether there was a live shim dir to retire.
    fn swap_in(&self, staging: &Path, retired: &Path) -> Result<bool> {
        let shim_dir = &self.config.shim_dir;

        if retired.exists() {
            std::fs::remove_dir_all(retired).at(retired)?;
        }

        let had_previous = shim_dir.exists();
        if had_previous {
            std::fs::rename(shim_dir, retired).at(shim_dir)?;
        }

        if let Err(e) = std::fs::rename(staging, shim_dir) {
            if had_previous {
                if let Err(restore) = std::fs::rename(retired, shim_dir) {
                    warn!("Failed to restore previous shims: {}", restore);
                }
            }
            return Err(GovmError::Filesystem {
                path: shim_dir.clone(),
                source: e,
            });
        }

        Ok(had_previous)
    }

    /// Put the retired shim set back after a late failure.
    fn roll_back(&self, retired: &Path, had_previous: bool) {
        let shim_dir = &self.config.shim_dir;
        discard(shim_dir);

        if had_previous {
            if let Err(e) = std::fs::rename(retired, shim_dir) {
                warn!("Failed to restore previous shims: {}", e);
            }
        }
    }
}

fn discard(dir: &Path) {
    if !dir.exists() {
        return;
    }
    if let Err(e) = std::fs::remove_dir_all(dir) {
        warn!("Failed to remove {}: {}", dir.display(), e);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

impl Shell {
    pub fn detect() -> Option<Self> {
        if let Ok(shell) = std::env::var("SHELL") {
            if shell.contains("zsh") {
                return Some(Shell::Zsh);
            } else if shell.contains("bash") {
                return Some(Shell::Bash);
            } else if shell.contains("fish") {
                return Some(Shell::Fish);
            }
        }

        if cfg!(windows) {
            return Some(Shell::PowerShell);
        }

        None
    }

    pub fn config_file_hint(&self) -> &'static str {
        match self {
            Shell::Bash => "~/.bashrc",
            Shell::Zsh => "~/.zshrc",
            Shell::Fish => "~/.config/fish/config.fish",
            Shell::PowerShell => "$PROFILE",
        }
    }

    pub fn path_line(&self, shim_dir: &Path) -> String {
        let dir = shim_dir.display();
        match self {
            Shell::Bash | Shell::Zsh => format!("export PATH=\"{}:$PATH\"", dir),
            Shell::Fish => format!("fish_add_path \"{}\"", dir),
            Shell::PowerShell => format!("$env:PATH = \"{};$env:PATH\"", dir),
        }
    }
}

/// How to put the shim directory on PATH for the detected shell.
pub fn path_instructions(shim_dir: &Path) -> String {
    let shell = Shell::detect().unwrap_or(Shell::Bash);

    if cfg!(windows) && shell == Shell::PowerShell {
        return format!(
            "Add to PATH: {}\n  setx PATH \"%PATH%;{}\"",
            shim_dir.display(),
            shim_dir.display()
        );
    }

    format!(
        "Add to your shell config ({}):\n  {}",
        shell.config_file_hint(),
        shell.path_line(shim_dir)
    )
}
