//! Set-up-everything pipeline
//!
//! Runs the cluster bring-up as sequential gates. A failed gate stops the run
//! and is named in the error; worker failures are per worker and never fail
//! the pipeline.

use buildnet_control::ControlPlane;
use buildnet_runtime::{ContainerRuntime, TrustError, TrustMaterial};
use buildnet_types::{BatchReport, ClusterConfig, CoordinatorPhase, ExtensionReport};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::coordinator::CoordinatorManager;
use crate::error::{CoordinatorError, Gate, PipelineError};
use crate::workers::WorkerProvisioner;

/// Everything an operator needs after a successful run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub url: String,
    pub admin_username: String,
    pub admin_password: String,
    pub phase: CoordinatorPhase,
    pub extensions: ExtensionReport,
    pub workers: BatchReport,
}

/// Bring-up of the whole cluster from one [`ClusterConfig`]
pub struct Pipeline {
    config: ClusterConfig,
    runtime: Arc<dyn ContainerRuntime>,
    trust: Arc<dyn TrustMaterial>,
    plane: Arc<dyn ControlPlane>,
    docker_group: Option<String>,
}

impl Pipeline {
    pub fn new(
        config: ClusterConfig,
        runtime: Arc<dyn ContainerRuntime>,
        trust: Arc<dyn TrustMaterial>,
        plane: Arc<dyn ControlPlane>,
    ) -> Self {
        Self {
            config,
            runtime,
            trust,
            plane,
            docker_group: None,
        }
    }

    /// Override the detected docker group passed to workers
    pub fn with_docker_group(mut self, group: impl Into<String>) -> Self {
        self.docker_group = Some(group.into());
        self
    }

    fn coordinator(&self) -> CoordinatorManager {
        CoordinatorManager::new(self.config.clone(), self.runtime.clone())
    }

    fn provisioner(&self) -> WorkerProvisioner {
        let provisioner = WorkerProvisioner::new(
            self.config.clone(),
            self.runtime.clone(),
            self.trust.clone(),
            self.plane.clone(),
        );
        match &self.docker_group {
            Some(group) => provisioner.with_docker_group(group),
            None => provisioner,
        }
    }

    #[instrument(skip(self), fields(workers = self.config.workers.count))]
    pub async fn run(&self) -> Result<PipelineReport, PipelineError> {
        let mut phase = CoordinatorPhase::Absent;
        let plane = self.plane.as_ref();
        let coordinator = self.coordinator();
        let readiness_timeout = self.config.timings.readiness_timeout();

        info!(gate = %Gate::RuntimeCheck, "Starting gate");
        self.config
            .validate()
            .map_err(|e| PipelineError::new(Gate::RuntimeCheck, e))?;
        let info = self.runtime.info().await;
        if !info.success {
            return Err(PipelineError::new(
                Gate::RuntimeCheck,
                CoordinatorError::RuntimeUnavailable(buildnet_types::truncate_diagnostic(
                    &info.output,
                )),
            ));
        }

        info!(gate = %Gate::SharedResources, "Starting gate");
        self.ensure_shared_resources()
            .await
            .map_err(|e| PipelineError::new(Gate::SharedResources, e))?;

        info!(gate = %Gate::TrustMaterial, "Starting gate");
        if !self.trust.exists() {
            return Err(PipelineError::new(
                Gate::TrustMaterial,
                TrustError::Missing(self.trust.private_key_path().to_path_buf()),
            ));
        }

        info!(gate = %Gate::CoordinatorDeploy, "Starting gate");
        coordinator
            .deploy()
            .await
            .map_err(|e| PipelineError::new(Gate::CoordinatorDeploy, e))?;
        advance(&mut phase, CoordinatorPhase::Deploying);

        info!(gate = %Gate::Readiness, "Starting gate");
        if !coordinator.wait_for_ready(plane, readiness_timeout).await {
            return Err(PipelineError::new(
                Gate::Readiness,
                CoordinatorError::ReadinessTimeout(readiness_timeout),
            ));
        }
        advance(&mut phase, CoordinatorPhase::Running);

        info!(gate = %Gate::InitialSetup, "Starting gate");
        coordinator
            .configure_initial_setup(plane, &self.config.admin)
            .await
            .map_err(|e| PipelineError::new(Gate::InitialSetup, e))?;
        advance(&mut phase, CoordinatorPhase::Configuring);
        if !coordinator.wait_for_ready(plane, readiness_timeout).await {
            return Err(PipelineError::new(
                Gate::InitialSetup,
                CoordinatorError::ReadinessTimeout(readiness_timeout),
            ));
        }

        info!(gate = %Gate::Extensions, "Starting gate");
        let extensions = coordinator
            .install_extensions(plane, &self.config.extensions.required)
            .await
            .map_err(|e| PipelineError::new(Gate::Extensions, e))?;
        if !extensions.is_success() {
            return Err(PipelineError::new(
                Gate::Extensions,
                CoordinatorError::ExtensionInstall(extensions),
            ));
        }
        advance(&mut phase, CoordinatorPhase::Configured);

        info!(gate = %Gate::Workers, "Starting gate");
        let workers = self
            .provisioner()
            .provision(self.config.workers.count)
            .await
            .map_err(|e| PipelineError::new(Gate::Workers, e))?;

        info!(
            url = %coordinator.url(),
            workers = workers.success_count(),
            "Cluster ready"
        );
        Ok(PipelineReport {
            url: coordinator.url(),
            admin_username: self.config.admin.username.clone(),
            admin_password: self.config.admin.password.clone(),
            phase,
            extensions,
            workers,
        })
    }

    async fn ensure_shared_resources(&self) -> Result<(), CoordinatorError> {
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
}

fn advance(phase: &mut CoordinatorPhase, next: CoordinatorPhase) {
    if phase.can_advance_to(next) {
        *phase = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildnet_control::testing::FakeControlPlane;
    use buildnet_runtime::testing::{FakeRuntime, RuntimeCall, StaticTrust};
    use buildnet_types::{Directories, Timings};
    use tempfile::TempDir;

    fn config(tmp: &TempDir, workers: u32) -> ClusterConfig {
        let mut config = ClusterConfig {
            directories: Directories::rooted_at(tmp.path()),
            timings: Timings::immediate(),
            ..Default::default()
        };
        config.workers.count = workers;
        config.extensions.required = vec!["ssh-slaves".into(), "credentials".into()];
        config
    }

    fn pipeline(
        tmp: &TempDir,
        workers: u32,
        runtime: Arc<FakeRuntime>,
        plane: Arc<FakeControlPlane>,
        trust: StaticTrust,
    ) -> Pipeline {
        Pipeline::new(config(tmp, workers), runtime, Arc::new(trust), plane).with_docker_group("999")
    }

    fn trust() -> StaticTrust {
        StaticTrust::new("/keys/jenkins_agent", "ssh-rsa AAAA")
    }

    #[tokio::test]
    async fn test_full_run() {
        let tmp = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::new());
        let plane = Arc::new(FakeControlPlane::new());

        let report = pipeline(&tmp, 2, runtime.clone(), plane.clone(), trust())
            .run()
            .await
            .unwrap();

        assert_eq!(report.url, "http://localhost:8080");
        assert_eq!(report.admin_username, "admin");
        assert_eq!(report.phase, CoordinatorPhase::Configured);
        assert_eq!(report.extensions.installed, vec!["ssh-slaves", "credentials"]);
        assert!(report.workers.is_complete_success());

        let calls = runtime.calls();
        assert_eq!(calls[0], RuntimeCall::Info);
        assert!(calls.contains(&RuntimeCall::EnsureNetwork("jenkins-local-net".into())));
        assert!(calls.contains(&RuntimeCall::EnsureVolume("jenkins-local-data".into())));
        assert_eq!(runtime.run_count("jenkins-local-master"), 1);
        assert_eq!(plane.credential_creations(), 1);
    }

    #[tokio::test]
    async fn test_runtime_unavailable_changes_nothing() {
        let tmp = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::new().unavailable());
        let plane = Arc::new(FakeControlPlane::new());

        let err = pipeline(&tmp, 1, runtime.clone(), plane, trust())
            .run()
            .await
            .unwrap_err();

        assert_eq!(err.gate, Gate::RuntimeCheck);
        assert_eq!(runtime.calls(), vec![RuntimeCall::Info]);
    }

    #[tokio::test]
    async fn test_missing_keys_stop_before_deploy() {
        let tmp = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::new());
        let plane = Arc::new(FakeControlPlane::new());

        let err = pipeline(
            &tmp,
            1,
            runtime.clone(),
            plane,
            StaticTrust::missing("/keys/jenkins_agent"),
        )
        .run()
        .await
        .unwrap_err();

        assert_eq!(err.gate, Gate::TrustMaterial);
        assert_eq!(runtime.run_count("jenkins-local-master"), 0);
    }

    #[tokio::test]
    async fn test_unready_coordinator_blocks_registration() {
        let tmp = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::new());
        let plane = Arc::new(FakeControlPlane::new().unreachable());

        let err = pipeline(&tmp, 2, runtime.clone(), plane.clone(), trust())
            .run()
            .await
            .unwrap_err();

        assert_eq!(err.gate, Gate::Readiness);
        assert_eq!(plane.credential_attempts(), 0);
        assert!(plane.node_attempts().is_empty());
        assert_eq!(runtime.run_count("jenkins-local-agent-1"), 0);
    }

    #[tokio::test]
    async fn test_extension_failure_is_fatal_and_reported() {
        let tmp = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::new());
        let plane = Arc::new(FakeControlPlane::new().fail_install("credentials", "HTTP 500"));

        let err = pipeline(&tmp, 1, runtime.clone(), plane, trust())
            .run()
            .await
            .unwrap_err();

        assert_eq!(err.gate, Gate::Extensions);
        assert!(err.to_string().contains("credentials ("));
        assert_eq!(runtime.run_count("jenkins-local-agent-1"), 0);
    }

    #[tokio::test]
    async fn test_worker_failures_do_not_fail_pipeline() {
        let tmp = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::new().fail_run("jenkins-local-agent-1"));
        let plane = Arc::new(FakeControlPlane::new());

        let report = pipeline(&tmp, 2, runtime, plane, trust())
            .run()
            .await
            .unwrap();

        assert_eq!(report.workers.results.len(), 2);
        assert_eq!(report.workers.success_count(), 1);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let runtime = Arc::new(FakeRuntime::new());
        let plane = Arc::new(FakeControlPlane::new());

        let first = pipeline(&tmp, 1, runtime.clone(), plane.clone(), trust());
        first.run().await.unwrap();
        first.run().await.unwrap();

        assert_eq!(runtime.run_count("jenkins-local-master"), 1);
        assert_eq!(runtime.run_count("jenkins-local-agent-1"), 1);
        assert_eq!(plane.credential_creations(), 1);
        assert_eq!(plane.nodes().len(), 1);
    }
}
