use crate::error::{GovmError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

/// Name of the Go binary inside `bin/` of an installation.
pub const GO_BINARY: &str = if cfg!(windows) { "go.exe" } else { "go" };

/// Sort key for one dot-separated version component.
///
/// Leading digits are compared as integers. A component with trailing text
/// (`21rc2`) orders below the plain number (`21`), and the trailing text is
/// compared lexically between pre-releases.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Component<'a> {
    number: Option<u64>,
    is_release: bool,
    suffix: &'a str,
}

impl<'a> Component<'a> {
    fn parse(part: &'a str) -> Self {
        let digits = part
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(part.len());
        let number = part[..digits].parse::<u64>().ok();
        let suffix = if number.is_some() { &part[digits..] } else { part };

        Self {
            number,
            is_release: suffix.is_empty(),
            suffix,
        }
    }
}

/// Total order over version strings.
///
/// Components present in both strings are compared numerically, major first.
/// When every shared component ties, the string with more components is greater
/// (`1.21.3 > 1.21`). Identical keys fall back to plain string comparison so even
/// malformed input gets a deterministic order.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left: Vec<Component<'_>> = a.split('.').map(Component::parse).collect();
    let right: Vec<Component<'_>> = b.split('.').map(Component::parse).collect();

    left.cmp(&right).then_with(|| a.cmp(b))
}

/// Sort records newest first.
pub fn sort_descending(records: &mut [VersionRecord]) {
    records.sort_by(|a, b| compare_versions(&b.version, &a.version));
}

/// Operating system and architecture as spelled by the Go release catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPlatform {
    pub os: String,
    pub arch: String,
}

impl HostPlatform {
    pub fn new(os: &str, arch: &str) -> Self {
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }

    pub fn current() -> Result<Self> {
        Self::from_rust(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Map Rust target names onto GOOS/GOARCH.
    pub fn from_rust(os: &str, arch: &str) -> Result<Self> {
        let unsupported = || GovmError::UnsupportedPlatform {
            os: os.to_string(),
            arch: arch.to_string(),
        };

        let go_os = match os {
            "linux" => "linux",
            "macos" => "darwin",
            "windows" => "windows",
            "freebsd" => "freebsd",
            "openbsd" => "openbsd",
            "netbsd" => "netbsd",
            "illumos" => "illumos",
            "solaris" => "solaris",
            "aix" => "aix",
            "dragonfly" => "dragonfly",
            _ => return Err(unsupported()),
        };

        let go_arch = match arch {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "386",
            "arm" => "armv6l",
            "powerpc64" if cfg!(target_endian = "little") => "ppc64le",
            "powerpc64" => "ppc64",
            "s390x" => "s390x",
            "riscv64" => "riscv64",
            "loongarch64" => "loong64",
            "mips64" => "mips64",
            _ => return Err(unsupported()),
        };

        Ok(Self::new(go_os, go_arch))
    }

    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }

    /// Archive extension the Go project publishes for this OS family.
    pub fn archive_extension(&self) -> &'static str {
        if self.is_windows() {
            ".zip"
        } else {
            ".tar.gz"
        }
    }
}

impl fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

/// One publishable release, already narrowed to the host's archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEntry {
    pub version: String,
    pub filename: String,
    pub url: String,
    pub stable: bool,
    pub checksum: Option<String>,
    pub size: Option<u64>,
}

/// A catalog release merged with local install state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: String,
    pub filename: String,
    pub url: String,
    pub installed: bool,
    pub active: bool,
    pub path: Option<PathBuf>,
    pub stable: bool,
    pub checksum: Option<String>,
    pub size: Option<u64>,
}

impl VersionRecord {
    pub fn from_release(release: ReleaseEntry) -> Self {
        Self {
            version: release.version,
            filename: release.filename,
            url: release.url,
            installed: false,
            active: false,
            path: None,
            stable: release.stable,
            checksum: release.checksum,
            size: release.size,
        }
    }

    /// Record derived from an install directory; carries no filename or URL.
    pub fn from_installed(installed: &InstalledVersion, active: bool) -> Self {
        Self {
            version: installed.version.clone(),
            filename: String::new(),
            url: String::new(),
            installed: true,
            active,
            path: Some(installed.path.clone()),
            stable: true,
            checksum: None,
            size: None,
        }
    }

    pub fn bin_dir(&self) -> Option<PathBuf> {
        self.path.as_ref().map(|p| p.join("bin"))
    }
}

/// A version directory that passed the installed check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersion {
    pub version: String,
    pub path: PathBuf,
    pub installed_at: chrono::DateTime<chrono::Utc>,
}
