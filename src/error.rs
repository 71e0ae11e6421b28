use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GovmError {
    #[error("Failed to reach {url}: {source}")]
    Network {
        url: String,
        source: reqwest::Error,
    },

    #[error("Request to {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to parse release catalog: {0}")]
    Parse(String),

    #[error("Could not determine the home directory")]
    HomeDirNotFound,

    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported platform: {os} {arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Downloaded empty file from {0}")]
    EmptyDownload(String),

    #[error("Checksum verification failed for {file}")]
    ChecksumMismatch { file: String },

    #[error("Installation failed: Go binary not found at {}", .0.display())]
    Integrity(PathBuf),

    #[error("Go binary verification failed for {}: {output}", binary.display())]
    Verification { binary: PathBuf, output: String },

    #[error("No version matching '{0}' found")]
    VersionNotFound(String),

    #[error("Version {0} is not installed")]
    NotInstalled(String),

    #[error("Cannot delete active version {0} - switch to another version first")]
    ActiveVersion(String),

    #[error("Failed to delete version {version}: {source}")]
    Remove {
        version: String,
        source: std::io::Error,
    },

    #[error("Go version directory not found: {}", .0.display())]
    BinDirMissing(PathBuf),

    #[error("Failed to create shim for {command}: {source}")]
    ShimWrite {
        command: String,
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl GovmError {
    /// Outcomes the CLI reports as plain text while still exiting successfully.
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            GovmError::VersionNotFound(_) | GovmError::NotInstalled(_) | GovmError::ActiveVersion(_)
        )
    }
}

/// Attach the offending path to a raw IO error.
pub trait IoContext<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for std::result::Result<T, std::io::Error> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|source| GovmError::Filesystem {
            path: path.to_path_buf(),
            source,
        })
    }
}

pub type Result<T> = std::result::Result<T, GovmError>;
