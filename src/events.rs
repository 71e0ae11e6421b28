//! Operations the front-ends request and the single message each one produces.

use crate::config::Config;
use crate::error::{GovmError, Result};
use crate::install::Installer;
use crate::models::VersionRecord;
use crate::shim::ShimManager;
use crate::version_manager::VersionManager;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    FetchCatalog,
    Install(VersionRecord),
    Switch(VersionRecord),
    Delete(VersionRecord),
}

/// Terminal outcome of one operation.
#[derive(Debug)]
pub enum CoreEvent {
    CatalogReady(Vec<VersionRecord>),
    CatalogFailed(GovmError),
    InstallCompleted { version: String, path: PathBuf },
    SwitchCompleted { version: String, shim_on_path: bool },
    DeleteCompleted { version: String },
    OperationFailed(GovmError),
}

/// The core components, wired to one configuration.
pub struct Core {
    pub manager: VersionManager,
    pub installer: Installer,
    pub shims: ShimManager,
}

impl Core {
    pub fn new(config: Config, show_progress: bool) -> Result<Self> {
        Ok(Self {
            installer: Installer::new(config.clone(), show_progress)?,
            shims: ShimManager::new(config.clone()),
            manager: VersionManager::new(config)?,
        })
    }

    pub fn config(&self) -> &Config {
        self.manager.config()
    }

    /// Look `version` up in a fresh scan of the versions directory.
    fn revalidate(&self, version: &str) -> Result<VersionRecord> {
        self.manager
            .installed_records()?
            .into_iter()
            .find(|r| r.version == version)
            .ok_or_else(|| GovmError::NotInstalled(version.to_string()))
    }

    pub async fn run(&self, operation: Operation) -> CoreEvent {
        debug!("Running {:?}", operation);

        match operation {
            Operation::FetchCatalog => match self.manager.fetch_catalog().await {
                Ok(records) => CoreEvent::CatalogReady(records),
                Err(e) => CoreEvent::CatalogFailed(e),
            },
            Operation::Install(record) => match self.installer.install(&record).await {
                Ok(outcome) => CoreEvent::InstallCompleted {
                    version: outcome.version,
                    path: outcome.path,
                },
                Err(e) => CoreEvent::OperationFailed(e),
            },
            Operation::Switch(record) => {
                match self
                    .revalidate(&record.version)
                    .and_then(|fresh| self.shims.activate(&fresh))
                {
                    Ok(activation) => CoreEvent::SwitchCompleted {
                        version: activation.version,
                        shim_on_path: activation.shim_on_path,
                    },
                    Err(e) => CoreEvent::OperationFailed(e),
                }
            }
            Operation::Delete(record) => {
                match self
                    .revalidate(&record.version)
                    .and_then(|fresh| self.installer.uninstall(&fresh))
                {
                    Ok(version) => CoreEvent::DeleteCompleted { version },
                    Err(e) => CoreEvent::OperationFailed(e),
                }
            }
        }
    }
}

/// Run `operation` as its own task; exactly one event is sent when it ends.
pub fn spawn_operation(
    core: Arc<Core>,
    operation: Operation,
    tx: UnboundedSender<CoreEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let event = core.run(operation).await;
        // The receiver only disappears when the front-end is shutting down.
        let _ = tx.send(event);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::tests::{go_archive, record_for, GOOD_GO};
    use crate::models::HostPlatform;
    use crate::version_manager::read_active_marker;
    use crate::version_manager::tests::{fake_install, StaticSource};
    use tempfile::TempDir;

    fn core(config: &Config, catalog: Vec<VersionRecord>) -> Core {
        let platform = HostPlatform::new("linux", "amd64");
        let releases = catalog
            .into_iter()
            .map(|r| crate::models::ReleaseEntry {
                version: r.version,
                filename: r.filename,
                url: r.url,
                stable: r.stable,
                checksum: r.checksum,
                size: r.size,
            })
            .collect();

        Core {
            manager: VersionManager::with_source(
                config.clone(),
                Box::new(StaticSource(releases)),
                platform.clone(),
            )
            .without_ambient_probe(),
            installer: Installer::with_platform(config.clone(), platform, false).unwrap(),
            shims: ShimManager::new(config.clone()),
        }
    }

    #[tokio::test]
    async fn test_spawned_operation_sends_one_event() {
        let temp = TempDir::new().unwrap();
        let config = Config::with_root(temp.path());
        let core = Arc::new(core(&config, vec![record_for("http://localhost", "1.22.0")]));

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        spawn_operation(core, Operation::FetchCatalog, tx)
            .await
            .unwrap();

        match rx.recv().await {
            Some(CoreEvent::CatalogReady(records)) => assert_eq!(records.len(), 1),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_switch_rejects_version_removed_since_snapshot() {
        let temp = TempDir::new().unwrap();
        let config = Config::with_root(temp.path());
        let core = core(&config, vec![]);

        let path = fake_install(&config, "1.21.5");
        let snapshot = core.manager.installed_records().unwrap().remove(0);
        std::fs::remove_dir_all(path).unwrap();

        match core.run(Operation::Switch(snapshot)).await {
            CoreEvent::OperationFailed(GovmError::NotInstalled(v)) => assert_eq!(v, "1.21.5"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(read_active_marker(&config), None);
    }

    /// install 1.21 -> use 1.21 -> list -> delete while active fails -> switch away -> delete.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_use_list_delete_scenario() {
        let mut server = mockito::Server::new_async().await;
        let mut mocks = Vec::new();
        for version in ["1.22.0", "1.21.5", "1.21.0"] {
            let mock = server
                .mock("GET", format!("/dl/go{}.linux-amd64.tar.gz", version).as_str())
                .with_status(200)
                .with_body(go_archive("go", Some(GOOD_GO)))
                .create_async()
                .await;
            mocks.push(mock);
        }

        let temp = TempDir::new().unwrap();
        let config = Config::with_root(temp.path());
        let catalog = ["1.22.0", "1.21.5", "1.21.0"]
            .iter()
            .map(|v| record_for(&server.url(), v))
            .collect();
        let core = core(&config, catalog);

        let records = match core.run(Operation::FetchCatalog).await {
            CoreEvent::CatalogReady(records) => records,
            other => panic!("unexpected event: {other:?}"),
        };

        // install 1.21
        let target = crate::resolve::resolve_version("1.21", &records, false).unwrap();
        assert_eq!(target.version, "1.21.5");
        match core.run(Operation::Install(target)).await {
            CoreEvent::InstallCompleted { version, path } => {
                assert_eq!(version, "1.21.5");
                assert_eq!(path, config.get_version_dir("1.21.5"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // use 1.21
        let installed = core.manager.installed_records().unwrap();
        let target = crate::resolve::resolve_version("1.21", &installed, true).unwrap();
        match core.run(Operation::Switch(target)).await {
            CoreEvent::SwitchCompleted { version, .. } => assert_eq!(version, "1.21.5"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(std::fs::read_to_string(config.shim_path("go"))
            .unwrap()
            .contains("go1.21.5"));

        // list
        let records = match core.run(Operation::FetchCatalog).await {
            CoreEvent::CatalogReady(records) => records,
            other => panic!("unexpected event: {other:?}"),
        };
        let listed = records.iter().find(|r| r.version == "1.21.5").unwrap();
        assert!(listed.installed && listed.active);

        // delete while active
        let doomed = listed.clone();
        match core.run(Operation::Delete(doomed.clone())).await {
            CoreEvent::OperationFailed(GovmError::ActiveVersion(v)) => assert_eq!(v, "1.21.5"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(config.get_version_dir("1.21.5").exists());

        // switch away, then delete
        let other = records.iter().find(|r| r.version == "1.22.0").unwrap().clone();
        assert!(matches!(
            core.run(Operation::Install(other.clone())).await,
            CoreEvent::InstallCompleted { .. }
        ));
        assert!(matches!(
            core.run(Operation::Switch(other)).await,
            CoreEvent::SwitchCompleted { .. }
        ));

        match core.run(Operation::Delete(doomed)).await {
            CoreEvent::DeleteCompleted { version } => assert_eq!(version, "1.21.5"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(!config.get_version_dir("1.21.5").exists());
    }
}
