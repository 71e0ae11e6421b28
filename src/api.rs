use crate::config::Config;
use crate::error::{GovmError, Result};
use crate::models::{HostPlatform, ReleaseEntry};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct GoRelease {
    version: String,
    #[serde(default)]
    stable: bool,
    #[serde(default)]
    files: Vec<GoFile>,
}

#[derive(Debug, Deserialize)]
struct GoFile {
    filename: String,
    #[serde(default)]
    os: String,
    #[serde(default)]
    arch: String,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    sha256: String,
    #[serde(default)]
    size: Option<u64>,
}

impl GoFile {
    fn is_archive(&self) -> bool {
        self.kind.is_empty() || self.kind == "archive"
    }
}

/// Anything that can list releases for a platform.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn fetch_releases(&self, platform: &HostPlatform) -> Result<Vec<ReleaseEntry>>;
}

/// Client for the go.dev download catalog.
pub struct GoDevApi {
    client: Client,
    catalog_url: String,
    download_base_url: String,
}

impl GoDevApi {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(config.catalog_timeout_secs))
            .build()
            .map_err(|e| GovmError::Network {
                url: config.catalog_url.clone(),
                source: e,
            })?;

        Ok(Self {
            client,
            catalog_url: config.catalog_url.clone(),
            download_base_url: config.download_base_url.clone(),
        })
    }

    async fn fetch_raw(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.catalog_url)
            .send()
            .await
            .map_err(|e| GovmError::Network {
                url: self.catalog_url.clone(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GovmError::HttpStatus {
                url: self.catalog_url.clone(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| GovmError::Network {
            url: self.catalog_url.clone(),
            source: e,
        })
    }
}

#[async_trait]
impl ReleaseSource for GoDevApi {
    async fn fetch_releases(&self, platform: &HostPlatform) -> Result<Vec<ReleaseEntry>> {
        debug!("Fetching release catalog from {}", self.catalog_url);
        let body = self.fetch_raw().await?;
        let releases = parse_catalog(&body)?;
        let base = self.download_base_url.trim_end_matches('/');

        let entries = select_for_platform(releases, platform, |filename| {
            format!("{}/{}", base, filename)
        });
        debug!("{} releases available for {}", entries.len(), platform);
        Ok(entries)
    }
}

fn parse_catalog(body: &str) -> Result<Vec<GoRelease>> {
    serde_json::from_str(body).map_err(|e| GovmError::Parse(e.to_string()))
}

/// Keep one archive per release for the given platform, dropping releases
/// without one. The first occurrence of a version wins.
fn select_for_platform<F>(
    releases: Vec<GoRelease>,
    platform: &HostPlatform,
    url_for: F,
) -> Vec<ReleaseEntry>
where
    F: Fn(&str) -> String,
{
    let mut seen = HashSet::new();

    releases
        .into_iter()
        .filter_map(|release| {
            let version = release.version.trim_start_matches("go").to_string();
            let file = release.files.into_iter().find(|f| {
                f.os == platform.os && f.arch == platform.arch && f.is_archive()
            })?;

            if !seen.insert(version.clone()) {
                return None;
            }

            Some(ReleaseEntry {
                version,
                url: url_for(&file.filename),
                filename: file.filename,
                stable: release.stable,
                checksum: (!file.sha256.is_empty()).then_some(file.sha256),
                size: file.size,
            })
        })
        .collect()
}
