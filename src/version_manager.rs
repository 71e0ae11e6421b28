use crate::api::{GoDevApi, ReleaseSource};
use crate::config::{Config, VERSION_DIR_PREFIX};
use crate::error::{IoContext, Result};
use crate::models::{
    compare_versions, sort_descending, HostPlatform, InstalledVersion, VersionRecord, GO_BINARY,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// Cross-references the remote catalog with what is on disk.
pub struct VersionManager {
    config: Config,
    source: Box<dyn ReleaseSource>,
    platform: HostPlatform,
    probe_ambient: bool,
}

impl VersionManager {
    pub fn new(config: Config) -> Result<Self> {
        let source = GoDevApi::new(&config)?;
        let platform = HostPlatform::current()?;
        Ok(Self::with_source(config, Box::new(source), platform))
    }

    pub fn with_source(
        config: Config,
        source: Box<dyn ReleaseSource>,
        platform: HostPlatform,
    ) -> Self {
        Self {
            config,
            source,
            platform,
            probe_ambient: true,
        }
    }

    /// Disable the `go version` fallback used when no marker is stored.
    pub fn without_ambient_probe(mut self) -> Self {
        self.probe_ambient = false;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetch the catalog and label each record Installed/Active, newest first.
    pub async fn fetch_catalog(&self) -> Result<Vec<VersionRecord>> {
        let releases = self.source.fetch_releases(&self.platform).await?;

        Config::ensure_dir(&self.config.versions_dir)?;

        let installed: HashMap<String, PathBuf> = self
            .list_installed()?
            .into_iter()
            .map(|i| (i.version, i.path))
            .collect();
        let active = self.active_version();

        let mut records: Vec<VersionRecord> = releases
            .into_iter()
            .map(|release| {
                let mut record = VersionRecord::from_release(release);
                if let Some(path) = installed.get(&record.version) {
                    record.installed = true;
                    record.path = Some(path.clone());
                }
                record.active = active.as_deref() == Some(record.version.as_str());
                record
            })
            .collect();

        sort_descending(&mut records);
        Ok(records)
    }

    /// Scan the versions directory. A directory counts only if its Go binary exists.
    pub fn list_installed(&self) -> Result<Vec<InstalledVersion>> {
        let versions_dir = &self.config.versions_dir;
        let mut installed = Vec::new();

        if !versions_dir.exists() {
            return Ok(installed);
        }

        for entry in std::fs::read_dir(versions_dir).at(versions_dir)? {
            let entry = entry.at(versions_dir)?;
            let path = entry.path();

            if !path.is_dir() {
                continue;
            }

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(version) = name.strip_prefix(VERSION_DIR_PREFIX) else {
                continue;
            };
            if version.is_empty() {
                continue;
            }

            if !has_go_binary(&path) {
                debug!("Ignoring {} without {}", path.display(), GO_BINARY);
                continue;
            }

            let installed_at = std::fs::metadata(&path)
                .and_then(|m| m.created().or_else(|_| m.modified()))
                .map(chrono::DateTime::<chrono::Utc>::from)
                .unwrap_or_else(|_| chrono::Utc::now());

            installed.push(InstalledVersion {
                version: version.to_string(),
                path,
                installed_at,
            });
        }

        installed.sort_by(|a, b| compare_versions(&b.version, &a.version));
        Ok(installed)
    }

    /// Installed versions as records, carrying the Active flag.
    pub fn installed_records(&self) -> Result<Vec<VersionRecord>> {
        let active = self.active_version();
        Ok(self
            .list_installed()?
            .iter()
            .map(|i| VersionRecord::from_installed(i, active.as_deref() == Some(i.version.as_str())))
            .collect())
    }

    /// The stored active marker, else whatever `go` currently resolves to.
    pub fn active_version(&self) -> Option<String> {
        if let Some(version) = read_active_marker(&self.config) {
            return Some(version);
        }

        if self.probe_ambient {
            probe_ambient_version()
        } else {
            None
        }
    }
}

pub fn has_go_binary(version_dir: &Path) -> bool {
    version_dir.join("bin").join(GO_BINARY).is_file()
}

/// Read the persisted active version; unreadable or blank means absent.
pub fn read_active_marker(config: &Config) -> Option<String> {
    match std::fs::read_to_string(&config.active_version_file) {
        Ok(contents) => {
            let version = contents.trim();
            (!version.is_empty()).then(|| version.to_string())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(
                "Failed to read {}: {}",
                config.active_version_file.display(),
                e
            );
            None
        }
    }
}

/// Overwrite the active version marker.
pub fn write_active_marker(config: &Config, version: &str) -> Result<()> {
    std::fs::write(&config.active_version_file, version).at(&config.active_version_file)
}

/// Ask the `go` on PATH which version it is.
pub fn probe_ambient_version() -> Option<String> {
    let output = Command::new("go").arg("version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    parse_go_version_output(&String::from_utf8_lossy(&output.stdout))
}

/// Extract `1.21.5` from `go version go1.21.5 linux/amd64`.
pub fn parse_go_version_output(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .nth(2)
        .and_then(|token| token.strip_prefix("go"))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
