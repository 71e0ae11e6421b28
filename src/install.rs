use crate::config::{Config, VERSION_DIR_PREFIX};
use crate::download::Downloader;
use crate::error::{GovmError, IoContext, Result};
use crate::models::{HostPlatform, VersionRecord, GO_BINARY};
use crate::version_manager::{has_go_binary, read_active_marker};
use colored::*;
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;
use tar::Archive;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Result of a completed install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub version: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
    TarGz,
    Zip,
}

pub struct Installer {
    config: Config,
    downloader: Downloader,
    platform: HostPlatform,
    show_progress: bool,
}

impl Installer {
    pub fn new(config: Config, show_progress: bool) -> Result<Self> {
        Self::with_platform(config, HostPlatform::current()?, show_progress)
    }

    pub fn with_platform(config: Config, platform: HostPlatform, show_progress: bool) -> Result<Self> {
        Ok(Self {
            config,
            downloader: Downloader::new(show_progress)?,
            platform,
            show_progress,
        })
    }

    /// Download, extract and verify one release. Nothing of a failed attempt is
    /// relied upon by the next one: leftovers are cleared before starting.
    pub async fn install(&self, record: &VersionRecord) -> Result<InstallOutcome> {
        validate_filename(&record.filename)?;
        let kind = archive_kind(&record.filename, &self.platform)?;

        Config::ensure_dir(&self.config.versions_dir)?;
        Config::ensure_dir(&self.config.downloads_dir)?;

        let version_dir = self.config.get_version_dir(&record.version);
        let archive_path = self.config.get_download_path(&record.filename);
        let partial_path = self
            .config
            .get_download_path(&format!("{}.part", record.filename));

        self.clean_previous_attempt(&version_dir, &archive_path, &partial_path)?;

        if self.show_progress {
            println!(
                "{} Go {} for {}",
                "Installing".green().bold(),
                record.version.cyan(),
                self.platform.to_string().yellow()
            );
        }

        let url = if record.url.is_empty() {
            self.config.download_url(&record.filename)
        } else {
            record.url.clone()
        };

        let written = self
            .downloader
            .download_with_progress(&url, &partial_path)
            .await?;
        std::fs::rename(&partial_path, &archive_path).at(&archive_path)?;
        debug!("Downloaded {} bytes to {}", written, archive_path.display());

        if let Some(checksum) = &record.checksum {
            if self.config.verify_checksums {
                if !Downloader::verify_checksum(&archive_path, checksum).await? {
                    std::fs::remove_file(&archive_path).at(&archive_path)?;
                    return Err(GovmError::ChecksumMismatch {
                        file: archive_path.display().to_string(),
                    });
                }
                debug!("Checksum verified for {}", record.filename);
            }
        }

        let existing = self.version_prefixed_dirs()?;
        self.extract_archive(kind, &archive_path, &self.config.versions_dir)?;
        self.normalize_layout(&version_dir, &existing)?;

        let go_bin = version_dir.join("bin").join(GO_BINARY);
        make_executable(&go_bin)?;
        let verify_target = go_bin.clone();
        tokio::task::spawn_blocking(move || verify_binary(&verify_target))
            .await
            .map_err(|e| GovmError::Verification {
                binary: go_bin.clone(),
                output: e.to_string(),
            })??;

        if let Err(e) = std::fs::remove_file(&archive_path) {
            warn!(
                "Failed to clean up download file {}: {}",
                archive_path.display(),
                e
            );
        }

        info!("Installed Go {} to {}", record.version, version_dir.display());

        Ok(InstallOutcome {
            version: record.version.clone(),
            path: version_dir,
        })
    }

    /// Remove a previous install of this version, its download artifacts and
    /// any unversioned extraction leftover.
    fn clean_previous_attempt(
        &self,
        version_dir: &Path,
        archive_path: &Path,
        partial_path: &Path,
    ) -> Result<()> {
        let leftover = self.config.versions_dir.join(VERSION_DIR_PREFIX);

        for dir in [version_dir, leftover.as_path()] {
            if dir.exists() {
                debug!("Removing existing directory {}", dir.display());
                std::fs::remove_dir_all(dir).at(dir)?;
            }
        }

        for file in [archive_path, partial_path] {
            if file.exists() {
                debug!("Removing existing download {}", file.display());
                std::fs::remove_file(file).at(file)?;
            }
        }

        Ok(())
    }

    fn version_prefixed_dirs(&self) -> Result<HashSet<PathBuf>> {
        let versions_dir = &self.config.versions_dir;
        let mut dirs = HashSet::new();

        for entry in std::fs::read_dir(versions_dir).at(versions_dir)? {
            let path = entry.at(versions_dir)?.path();
            let prefixed = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(VERSION_DIR_PREFIX))
                .unwrap_or(false);

            if prefixed && path.is_dir() {
                dirs.insert(path);
            }
        }

        Ok(dirs)
    }

    /// Archives unpack to a directory such as `go/`; move a freshly created
    /// directory holding the Go binary to the canonical version path.
    fn normalize_layout(&self, version_dir: &Path, existing: &HashSet<PathBuf>) -> Result<()> {
        let go_bin = version_dir.join("bin").join(GO_BINARY);
        if go_bin.is_file() {
            return Ok(());
        }

        let mut fresh: Vec<PathBuf> = self
            .version_prefixed_dirs()?
            .into_iter()
            .filter(|dir| !existing.contains(dir) && dir != version_dir && has_go_binary(dir))
            .collect();
        fresh.sort();

        let Some(source) = fresh.into_iter().next() else {
            return Err(GovmError::Integrity(go_bin));
        };

        if version_dir.exists() {
            std::fs::remove_dir_all(version_dir).at(version_dir)?;
        }

        debug!("Renaming {} to {}", source.display(), version_dir.display());
        std::fs::rename(&source, version_dir).at(version_dir)?;

        if !go_bin.is_file() {
            return Err(GovmError::Integrity(go_bin));
        }

        Ok(())
    }

    fn extract_archive(&self, kind: ArchiveKind, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        let pb = if self.show_progress {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
                pb.set_style(style);
            }
            pb.set_message("Extracting...");
            pb
        } else {
            ProgressBar::hidden()
        };

        match kind {
            ArchiveKind::TarGz => extract_tar_gz(archive_path, dest_dir)?,
            ArchiveKind::Zip => extract_zip(archive_path, dest_dir)?,
        }

        pb.finish_with_message("Extraction complete");
        Ok(())
    }

    /// Delete an installed version. The active version is never removed.
    pub fn uninstall(&self, record: &VersionRecord) -> Result<String> {
        if !record.installed {
            return Err(GovmError::NotInstalled(record.version.clone()));
        }

        // Re-check the marker on disk: the record may be an older snapshot.
        if record.active || read_active_marker(&self.config).as_deref() == Some(record.version.as_str())
        {
            return Err(GovmError::ActiveVersion(record.version.clone()));
        }

        let path = record
            .path
            .clone()
            .unwrap_or_else(|| self.config.get_version_dir(&record.version));

        if !path.exists() {
            return Err(GovmError::NotInstalled(record.version.clone()));
        }

        std::fs::remove_dir_all(&path).map_err(|source| GovmError::Remove {
            version: record.version.clone(),
            source,
        })?;

        info!("Deleted Go {} from {}", record.version, path.display());
        Ok(record.version.clone())
    }

    /// Spent or abandoned archives in the downloads directory.
    pub fn cached_downloads(&self) -> Result<Vec<(PathBuf, u64)>> {
        let downloads_dir = &self.config.downloads_dir;
        if !downloads_dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(downloads_dir).min_depth(1) {
            let entry = entry.map_err(|e| GovmError::Filesystem {
                path: downloads_dir.clone(),
                source: e.into(),
            })?;
            if entry.file_type().is_file() {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                files.push((entry.into_path(), size));
            }
        }

        Ok(files)
    }

    pub fn clean_downloads(&self) -> Result<u64> {
        let mut freed = 0;
        for (path, size) in self.cached_downloads()? {
            std::fs::remove_file(&path).at(&path)?;
            freed += size;
        }
        Ok(freed)
    }
}

fn validate_filename(filename: &str) -> Result<()> {
    if filename.is_empty() || filename.contains('/') || filename.contains('\\') || filename == ".." {
        return Err(GovmError::Parse(format!(
            "invalid archive filename '{}'",
            filename
        )));
    }
    Ok(())
}

fn archive_kind(filename: &str, platform: &HostPlatform) -> Result<ArchiveKind> {
    let expected = platform.archive_extension();
    if !filename.ends_with(expected) {
        return Err(GovmError::UnsupportedFormat(format!(
            "{} (expected {} on {})",
            filename, expected, platform.os
        )));
    }

    if platform.is_windows() {
        Ok(ArchiveKind::Zip)
    } else {
        Ok(ArchiveKind::TarGz)
    }
}

fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let tar_gz = File::open(archive_path).at(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(tar_gz));
    archive.unpack(dest_dir).at(archive_path)
}

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let zip_error = |e: zip::result::ZipError| GovmError::Filesystem {
        path: archive_path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    };

    let file = File::open(archive_path).at(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(zip_error)?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(zip_error)?;

        let outpath = match file.enclosed_name() {
            Some(path) => dest_dir.join(path),
            None => continue,
        };

        if file.is_dir() {
            std::fs::create_dir_all(&outpath).at(&outpath)?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent).at(parent)?;
        }
        let mut outfile = File::create(&outpath).at(&outpath)?;
        std::io::copy(&mut file, &mut outfile).at(&outpath)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))
                    .at(&outpath)?;
            }
        }
    }

    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).at(path)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// "Text file busy": the binary is still open for writing somewhere.
const ETXTBSY: i32 = 26;
const ETXTBSY_RETRIES: u32 = 5;

/// Run `go version`; the install stays on disk when this fails. Blocking.
fn verify_binary(go_bin: &Path) -> Result<()> {
    let mut attempts = 0;
    let output = loop {
        match Command::new(go_bin).arg("version").output() {
            Ok(output) => break output,
            // A process forked concurrently may still hold the write handle
            Err(e) if cfg!(unix) && e.raw_os_error() == Some(ETXTBSY) && attempts < ETXTBSY_RETRIES => {
                attempts += 1;
                std::thread::sleep(std::time::Duration::from_millis(50));
            }
            Err(e) => {
                return Err(GovmError::Verification {
                    binary: go_bin.to_path_buf(),
                    output: e.to_string(),
                })
            }
        }
    };

    if !output.status.success() {
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(GovmError::Verification {
            binary: go_bin.to_path_buf(),
            output: format!("{}: {}", output.status, combined.trim()),
        });
    }

    debug!(
        "Verified {}: {}",
        go_bin.display(),
        String::from_utf8_lossy(&output.stdout).trim()
    );
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::ReleaseEntry;
    use crate::version_manager::write_active_marker;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    pub(crate) const GOOD_GO: &str = "#!/bin/sh\necho \"go version go1.21.5 linux/amd64\"\n";

    /// A gzipped tarball laid out like the official Go archives.
    pub(crate) fn go_archive(top: &str, go_script: Option<&str>) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let mut files = vec![(format!("{}/VERSION", top), "go1.21.5\n".to_string(), 0o644)];
        if let Some(script) = go_script {
            files.push((format!("{}/bin/go", top), script.to_string(), 0o755));
            files.push((format!("{}/bin/gofmt", top), "#!/bin/sh\n".to_string(), 0o755));
        }

        for (path, body, mode) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(mode);
            builder
                .append_data(&mut header, path, body.as_bytes())
                .unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap()
    }

    pub(crate) fn record_for(server_url: &str, version: &str) -> VersionRecord {
        let filename = format!("go{}.linux-amd64.tar.gz", version);
        VersionRecord::from_release(ReleaseEntry {
            version: version.to_string(),
            url: format!("{}/dl/{}", server_url, filename),
            filename,
            stable: true,
            checksum: None,
            size: None,
        })
    }

    fn installer(config: &Config) -> Installer {
        Installer::with_platform(config.clone(), HostPlatform::new("linux", "amd64"), false)
            .unwrap()
    }

    #[test]
    fn test_archive_kind_dispatch() {
        let linux = HostPlatform::new("linux", "amd64");
        let windows = HostPlatform::new("windows", "amd64");

        assert_eq!(
            archive_kind("go1.21.5.linux-amd64.tar.gz", &linux).unwrap(),
            ArchiveKind::TarGz
        );
        assert_eq!(
            archive_kind("go1.21.5.windows-amd64.zip", &windows).unwrap(),
            ArchiveKind::Zip
        );
        assert!(matches!(
            archive_kind("go1.21.5.windows-amd64.zip", &linux),
            Err(GovmError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            archive_kind("go1.21.5.windows-amd64.msi", &windows),
            Err(GovmError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_verify_binary_reports_missing_binary() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("bin").join(GO_BINARY);

        match verify_binary(&missing) {
            Err(GovmError::Verification { binary, .. }) => assert_eq!(binary, missing),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("go1.21.5.linux-amd64.tar.gz").is_ok());
        assert!(validate_filename("").is_err());
        assert!(validate_filename("../evil.tar.gz").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_normalizes_layout_and_cleans_download() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/dl/go1.21.5.linux-amd64.tar.gz")
            .with_status(200)
            .with_body(go_archive("go", Some(GOOD_GO)))
            .create_async()
            .await;

        let temp = TempDir::new().unwrap();
        let config = Config::with_root(temp.path());
        let outcome = installer(&config)
            .install(&record_for(&server.url(), "1.21.5"))
            .await
            .unwrap();

        assert_eq!(outcome.version, "1.21.5");
        assert_eq!(outcome.path, config.get_version_dir("1.21.5"));
        assert!(has_go_binary(&outcome.path));
        assert!(!config.versions_dir.join("go").exists());
        assert!(!config
            .get_download_path("go1.21.5.linux-amd64.tar.gz")
            .exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_retry_after_partial_attempt() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/dl/go1.21.5.linux-amd64.tar.gz")
            .with_status(200)
            .with_body(go_archive("go", Some(GOOD_GO)))
            .expect(2)
            .create_async()
            .await;

        let temp = TempDir::new().unwrap();
        let config = Config::with_root(temp.path());
        let record = record_for(&server.url(), "1.21.5");

        // Leftovers of an interrupted attempt
        std::fs::create_dir_all(config.versions_dir.join("go").join("src")).unwrap();
        std::fs::create_dir_all(config.get_version_dir("1.21.5").join("pkg")).unwrap();
        std::fs::create_dir_all(&config.downloads_dir).unwrap();
        std::fs::write(
            config.get_download_path("go1.21.5.linux-amd64.tar.gz.part"),
            b"trunc",
        )
        .unwrap();

        let first = installer(&config).install(&record).await.unwrap();
        let second = installer(&config).install(&record).await.unwrap();

        assert_eq!(first, second);
        assert!(has_go_binary(&second.path));
        assert!(!second.path.join("pkg").exists());
        assert!(std::fs::read_dir(&config.downloads_dir).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_zero_byte_download_fails() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/dl/go1.21.5.linux-amd64.tar.gz")
            .with_status(200)
            .with_body("")
            .create_async()
            .await;

        let temp = TempDir::new().unwrap();
        let config = Config::with_root(temp.path());
        let err = installer(&config)
            .install(&record_for(&server.url(), "1.21.5"))
            .await
            .unwrap_err();

        assert!(matches!(err, GovmError::EmptyDownload(_)));
        assert!(!config.get_version_dir("1.21.5").exists());
    }

    #[tokio::test]
    async fn test_missing_binary_is_integrity_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/dl/go1.21.5.linux-amd64.tar.gz")
            .with_status(200)
            .with_body(go_archive("go", None))
            .create_async()
            .await;

        let temp = TempDir::new().unwrap();
        let config = Config::with_root(temp.path());
        let err = installer(&config)
            .install(&record_for(&server.url(), "1.21.5"))
            .await
            .unwrap_err();

        match err {
            GovmError::Integrity(path) => {
                assert_eq!(path, config.get_version_dir("1.21.5").join("bin").join(GO_BINARY))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_existing_install_is_not_mistaken_for_fresh_extraction() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/dl/go1.22.0.linux-amd64.tar.gz")
            .with_status(200)
            .with_body(go_archive("go", None))
            .create_async()
            .await;

        let temp = TempDir::new().unwrap();
        let config = Config::with_root(temp.path());
        let other = crate::version_manager::tests::fake_install(&config, "1.21.5");

        let err = installer(&config)
            .install(&record_for(&server.url(), "1.22.0"))
            .await
            .unwrap_err();

        assert!(matches!(err, GovmError::Integrity(_)));
        assert!(has_go_binary(&other));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_binary_is_verification_error_and_kept() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/dl/go1.21.5.linux-amd64.tar.gz")
            .with_status(200)
            .with_body(go_archive("go", Some("#!/bin/sh\necho broken >&2\nexit 3\n")))
            .create_async()
            .await;

        let temp = TempDir::new().unwrap();
        let config = Config::with_root(temp.path());
        let err = installer(&config)
            .install(&record_for(&server.url(), "1.21.5"))
            .await
            .unwrap_err();

        match err {
            GovmError::Verification { output, .. } => assert!(output.contains("broken")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(has_go_binary(&config.get_version_dir("1.21.5")));
    }

    #[tokio::test]
    async fn test_checksum_mismatch_removes_archive() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/dl/go1.21.5.linux-amd64.tar.gz")
            .with_status(200)
            .with_body(go_archive("go", Some(GOOD_GO)))
            .create_async()
            .await;

        let temp = TempDir::new().unwrap();
        let config = Config::with_root(temp.path());
        let mut record = record_for(&server.url(), "1.21.5");
        record.checksum = Some("0".repeat(64));

        let err = installer(&config).install(&record).await.unwrap_err();
        assert!(matches!(err, GovmError::ChecksumMismatch { .. }));
        assert!(!config
            .get_download_path("go1.21.5.linux-amd64.tar.gz")
            .exists());
    }

    #[test]
    fn test_uninstall_preconditions() {
        let temp = TempDir::new().unwrap();
        let config = Config::with_root(temp.path());
        let installer = installer(&config);

        let path = crate::version_manager::tests::fake_install(&config, "1.21.5");
        let installed = crate::models::InstalledVersion {
            version: "1.21.5".to_string(),
            path: path.clone(),
            installed_at: chrono::Utc::now(),
        };

        let mut not_installed = VersionRecord::from_installed(&installed, false);
        not_installed.installed = false;
        assert!(matches!(
            installer.uninstall(&not_installed),
            Err(GovmError::NotInstalled(_))
        ));

        let active = VersionRecord::from_installed(&installed, true);
        assert!(matches!(
            installer.uninstall(&active),
            Err(GovmError::ActiveVersion(_))
        ));
        assert!(path.exists());

        // A stale record is caught by the marker on disk
        write_active_marker(&config, "1.21.5").unwrap();
        let stale = VersionRecord::from_installed(&installed, false);
        assert!(matches!(
            installer.uninstall(&stale),
            Err(GovmError::ActiveVersion(_))
        ));
        assert!(path.exists());

        write_active_marker(&config, "1.22.0").unwrap();
        assert_eq!(installer.uninstall(&stale).unwrap(), "1.21.5");
        assert!(!path.exists());
    }

    #[test]
    fn test_clean_downloads() {
        let temp = TempDir::new().unwrap();
        let config = Config::with_root(temp.path());
        std::fs::create_dir_all(&config.downloads_dir).unwrap();
        std::fs::write(config.get_download_path("a.tar.gz"), vec![0u8; 10]).unwrap();
        std::fs::write(config.get_download_path("b.tar.gz.part"), vec![0u8; 5]).unwrap();

        let installer = installer(&config);
        assert_eq!(installer.cached_downloads().unwrap().len(), 2);
        assert_eq!(installer.clean_downloads().unwrap(), 15);
        assert!(installer.cached_downloads().unwrap().is_empty());
    }
}
