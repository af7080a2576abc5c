//! Services built from the effective configuration

use crate::error::{CliError, CliResult};
use crate::output::{print_info, OutputFormat};
use buildnet_control::ControlPlaneClient;
use buildnet_orchestrator::{CoordinatorError, CoordinatorManager, WorkerProvisioner};
use buildnet_runtime::{ContainerRuntime, DockerCli, KeyStore, TrustMaterial};
use buildnet_types::{truncate_diagnostic, ClusterConfig, ClusterOverrides};
use std::path::PathBuf;
use std::sync::Arc;

/// Effective configuration plus global flags for one invocation
pub struct Context {
    pub config: ClusterConfig,
    pub config_path: PathBuf,
    pub output: OutputFormat,
    runtime: Arc<dyn ContainerRuntime>,
}

impl Context {
    pub fn new(config: ClusterConfig, config_path: PathBuf, output: OutputFormat) -> Self {
        Self {
            config,
            config_path,
            output,
            runtime: Arc::new(DockerCli::new()),
        }
    }

    /// Apply command-line overrides, producing a new context
    pub fn with_overrides(self, overrides: &ClusterOverrides) -> Self {
        Self {
            config: self.config.with_overrides(overrides),
            ..self
        }
    }

    pub fn runtime(&self) -> Arc<dyn ContainerRuntime> {
        self.runtime.clone()
    }

    pub fn key_store(&self) -> KeyStore {
        KeyStore::new(&self.config.directories.ssh)
    }

    pub fn control_plane(&self) -> CliResult<ControlPlaneClient> {
        Ok(
            ControlPlaneClient::new(&self.config.coordinator.url(), &self.config.admin)?
                .with_probe_timeout(self.config.timings.probe_timeout())
                .with_remote_fs(&self.config.workers.remote_fs),
        )
    }

    pub fn coordinator(&self) -> CoordinatorManager {
        CoordinatorManager::new(self.config.clone(), self.runtime())
    }

    pub fn provisioner(&self) -> CliResult<WorkerProvisioner> {
        Ok(WorkerProvisioner::new(
            self.config.clone(),
            self.runtime(),
            Arc::new(self.key_store()),
            Arc::new(self.control_plane()?),
        ))
    }

    /// Fail early when the container engine does not answer
    pub async fn require_runtime(&self) -> CliResult<()> {
        let info = self.runtime.info().await;
        if info.success {
            Ok(())
        } else {
            Err(CoordinatorError::RuntimeUnavailable(truncate_diagnostic(&info.output)).into())
        }
    }

    /// Create the shared network and coordinator volume if absent
    pub async fn ensure_shared_resources(&self) -> CliResult<()> {
        self.runtime
            .ensure_network(&self.config.network.name)
            .await
            .into_result("network create")?;
        self.runtime
            .ensure_volume(&self.config.volume.name)
            .await
            .into_result("volume create")?;
        Ok(())
    }

    /// Generate the worker key pair unless one exists
    pub async fn ensure_keys(&self) -> CliResult<()> {
        let store = self.key_store();
        if store.exists() {
            return Ok(());
        }
        print_info(&format!(
            "No SSH key pair found, generating one in {}",
            store.dir().display()
        ));
        store.generate(false).await.map_err(CliError::from)
    }
}
