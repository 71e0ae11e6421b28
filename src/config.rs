use crate::error::{GovmError, IoContext, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CATALOG_URL: &str = "https://go.dev/dl/?mode=json&include=all";
pub const DEFAULT_DOWNLOAD_BASE_URL: &str = "https://go.dev/dl/";

/// Install directories are named `<prefix><version>`.
pub const VERSION_DIR_PREFIX: &str = "go";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    pub govm_dir: PathBuf,

    #[serde(skip)]
    pub versions_dir: PathBuf,

    #[serde(skip)]
    pub downloads_dir: PathBuf,

    #[serde(skip)]
    pub shim_dir: PathBuf,

    #[serde(skip)]
    pub active_version_file: PathBuf,

    #[serde(skip)]
    pub config_file: PathBuf,

    /// Release catalog endpoint (JSON array of releases)
    pub catalog_url: String,

    /// Base URL archives are downloaded from, joined with the archive filename
    pub download_base_url: String,

    /// Timeout for the catalog request
    pub catalog_timeout_secs: u64,

    /// Whether to verify SHA-256 checksums published in the catalog
    pub verify_checksums: bool,

    /// Include unstable releases (betas, release candidates) in remote listings
    pub show_unstable: bool,
}

impl Config {
    /// Build a configuration rooted at `govm_dir` with default tunables.
    pub fn with_root<P: Into<PathBuf>>(govm_dir: P) -> Self {
        let govm_dir = govm_dir.into();

        Self {
            versions_dir: govm_dir.join("versions"),
            downloads_dir: govm_dir.join("downloads"),
            shim_dir: govm_dir.join("shim"),
            active_version_file: govm_dir.join("active_version"),
            config_file: govm_dir.join("config.toml"),
            govm_dir,
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            download_base_url: DEFAULT_DOWNLOAD_BASE_URL.to_string(),
            catalog_timeout_secs: 10,
            verify_checksums: true,
            show_unstable: false,
        }
    }

    fn default_govm_dir() -> Result<PathBuf> {
        // First check GOVM_DIR environment variable
        if let Ok(dir) = std::env::var("GOVM_DIR") {
            if !dir.trim().is_empty() {
                return Ok(PathBuf::from(shellexpand::tilde(&dir).to_string()));
            }
        }

        dirs::home_dir()
            .map(|home| home.join(".govm"))
            .ok_or(GovmError::HomeDirNotFound)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_govm_dir()?)
    }

    pub fn load_from<P: Into<PathBuf>>(govm_dir: P) -> Result<Self> {
        let mut config = Self::with_root(govm_dir);

        std::fs::create_dir_all(&config.govm_dir).at(&config.govm_dir)?;

        // Load config file if it exists
        if config.config_file.exists() {
            let contents = std::fs::read_to_string(&config.config_file).at(&config.config_file)?;
            let file_config: FileConfig = toml::from_str(&contents)?;

            // Only tunables come from the file; paths always derive from the root
            config.catalog_url = file_config.catalog_url;
            config.download_base_url = file_config.download_base_url;
            config.catalog_timeout_secs = file_config.catalog_timeout_secs;
            config.verify_checksums = file_config.verify_checksums;
            config.show_unstable = file_config.show_unstable;
        } else {
            config.save()?;
        }

        if config.catalog_timeout_secs == 0 {
            return Err(GovmError::Config(
                "catalog_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| GovmError::Config(e.to_string()))?;

        std::fs::write(&self.config_file, contents).at(&self.config_file)?;
        Ok(())
    }

    pub fn version_dir_name(version: &str) -> String {
        format!("{}{}", VERSION_DIR_PREFIX, version)
    }

    pub fn get_version_dir(&self, version: &str) -> PathBuf {
        self.versions_dir.join(Self::version_dir_name(version))
    }

    pub fn get_download_path(&self, filename: &str) -> PathBuf {
        self.downloads_dir.join(filename)
    }

    pub fn download_url(&self, filename: &str) -> String {
        let base = self.download_base_url.trim_end_matches('/');
        format!("{}/{}", base, filename)
    }

    pub fn shim_path(&self, command: &str) -> PathBuf {
        self.shim_dir.join(command)
    }

    pub fn ensure_dir(path: &Path) -> Result<()> {
        std::fs::create_dir_all(path).at(path)
    }
}

/// On-disk shape of `config.toml`; missing keys fall back to defaults.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct FileConfig {
    catalog_url: String,
    download_base_url: String,
    catalog_timeout_secs: u64,
    verify_checksums: bool,
    show_unstable: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            download_base_url: DEFAULT_DOWNLOAD_BASE_URL.to_string(),
            catalog_timeout_secs: 10,
            verify_checksums: true,
            show_unstable: false,
        }
    }
}
