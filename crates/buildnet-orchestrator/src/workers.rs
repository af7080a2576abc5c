//! Worker provisioning loop
//!
//! Workers are provisioned one index at a time. Each index yields exactly one
//! [`ProvisioningResult`]; a failure at one index never stops the batch.

use buildnet_control::ControlPlane;
use buildnet_runtime::{ContainerRuntime, ContainerSpec, ContainerSummary, TrustMaterial};
use buildnet_types::{
    BatchReport, ClusterConfig, Failure, FailureKind, ProvisioningResult, RegistrationOutcome,
    WorkerSlot,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::readiness::{wait_for_ready, ReadinessPolicy};

/// Environment variable carrying the authorized public key into a worker
pub const PUBKEY_ENV: &str = "JENKINS_AGENT_SSH_PUBKEY";

/// Log directory inside worker containers
pub const WORKER_LOG_DIR: &str = "/var/log/jenkins";

/// State of the shared credential within one batch
#[derive(Debug, Clone)]
enum CredentialGate {
    Pending,
    Ready,
    Failed(Failure),
    /// Coordinator never answered; no registration is attempted
    Unavailable(String),
}

/// Outcome of removing one container in a bulk removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalOutcome {
    pub name: String,
    pub id: String,
    pub removed: bool,
    pub message: String,
}

/// Service deploying, registering and removing workers
pub struct WorkerProvisioner {
    config: ClusterConfig,
    runtime: Arc<dyn ContainerRuntime>,
    trust: Arc<dyn TrustMaterial>,
    plane: Arc<dyn ControlPlane>,
    docker_group: String,
}

impl WorkerProvisioner {
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
            docker_group: buildnet_runtime::docker_group_id(),
        }
    }

    /// Group granted to workers for access to the mounted runtime socket
    pub fn with_docker_group(mut self, group: impl Into<String>) -> Self {
        self.docker_group = group.into();
        self
    }

    fn slot(&self, index: u32) -> WorkerResult<WorkerSlot> {
        Ok(WorkerSlot::new(&self.config.workers, index)?)
    }

    fn container_spec(&self, slot: &WorkerSlot, public_key: &str) -> ContainerSpec {
        let workers = &self.config.workers;
        let key_target = format!("{}/.ssh/id_rsa", workers.remote_fs.trim_end_matches('/'));
        ContainerSpec::new(&slot.name, &workers.image)
            .network(&self.config.network.name)
            .limits(&workers.cpus, &workers.memory)
            .mount(&workers.docker_socket, &workers.docker_socket)
            .group_add(&self.docker_group)
            .mount_read_only(
                self.trust.private_key_path().display().to_string(),
                key_target,
            )
            .mount(
                self.config.directories.logs.display().to_string(),
                WORKER_LOG_DIR,
            )
            .env(PUBKEY_ENV, public_key)
            .port(slot.port, workers.internal_ssh_port)
            .restart("unless-stopped")
    }

    /// Provision workers `1..=count`, in order
    ///
    /// Fails up front only when the batch cannot be planned or the public
    /// key cannot be read; everything after that is recorded per worker.
    /// Containers are still deployed when the coordinator is not ready, but
    /// their registration is skipped.
    #[instrument(skip(self))]
    pub async fn provision(&self, count: u32) -> WorkerResult<BatchReport> {
        self.config.validate_batch(count)?;
        let slots = WorkerSlot::plan(&self.config.workers, count)?;
        let public_key = self.trust.public_key_content().await?;

        tokio::fs::create_dir_all(&self.config.directories.logs).await?;

        let policy = ReadinessPolicy::from_timings(&self.config.timings);
        let mut gate = if wait_for_ready(self.plane.as_ref(), policy).await {
            CredentialGate::Pending
        } else {
            warn!(deadline = ?policy.deadline, "Coordinator not ready, skipping registration");
            CredentialGate::Unavailable(format!(
                "coordinator not ready after {:?}",
                policy.deadline
            ))
        };
        let mut results = Vec::with_capacity(slots.len());
        for slot in &slots {
            info!(worker = %slot.name, index = slot.index, count, "Provisioning worker");
            let result = self.provision_slot(slot, &public_key, &mut gate).await;
            match result.error() {
                Some(error) => warn!(worker = %slot.name, %error, "Worker not fully provisioned"),
                None => info!(worker = %slot.name, port = slot.port, "Worker provisioned"),
            }
            results.push(result);
        }

        let report = BatchReport::new(count, results);
        info!(
            succeeded = report.success_count(),
            requested = count,
            "Worker batch finished"
        );
        Ok(report)
    }

    async fn provision_slot(
        &self,
        slot: &WorkerSlot,
        public_key: &str,
        gate: &mut CredentialGate,
    ) -> ProvisioningResult {
        let container_output = match self.deploy_container(slot, public_key).await {
            Ok(output) => output,
            Err(failure) => return ProvisioningResult::container_failed(&slot.name, slot.port, failure),
        };

        let registration = self.register(slot, gate).await;
        ProvisioningResult::deployed(&slot.name, slot.port, container_output, registration)
    }

    async fn deploy_container(&self, slot: &WorkerSlot, public_key: &str) -> Result<String, Failure> {
        let status = self
            .runtime
            .status(&slot.name)
            .await
            .map_err(|e| Failure::new(FailureKind::DeploymentFailed, e.to_string()))?;
        let output = match status {
            Some(status) if buildnet_runtime::status_is_running(&status) => {
                return Ok(format!("Container {} already running", slot.name));
            }
            Some(_) => self.runtime.start(&slot.name).await,
            None => self.runtime.run(&self.container_spec(slot, public_key)).await,
        };

        if !output.success {
            return Err(Failure::new(FailureKind::DeploymentFailed, &output.output));
        }

        tokio::time::sleep(self.config.timings.container_settle()).await;
        let logs = self.runtime.logs(&slot.name).await;
        Ok(format!(
            "{}\nContainer Logs:\n{}",
            output.output.trim(),
            logs.output.trim()
        ))
    }

    async fn register(&self, slot: &WorkerSlot, gate: &mut CredentialGate) -> RegistrationOutcome {
        if matches!(gate, CredentialGate::Pending) {
            match self
                .plane
                .register_trust_credential(self.trust.private_key_path())
                .await
            {
                Ok(registration) => {
                    info!(?registration, "Trust credential ready");
                    *gate = CredentialGate::Ready;
                }
                Err(e) => {
                    warn!(error = %e, "Trust credential unavailable for this batch");
                    let failure = Failure::new(FailureKind::CredentialRegistration, e.to_string());
                    *gate = CredentialGate::Failed(failure.clone());
                    return RegistrationOutcome::Failed(failure);
                }
            }
        }

        match gate {
            CredentialGate::Failed(failure) => {
                return RegistrationOutcome::Skipped {
                    reason: format!("trust credential unavailable ({})", failure.message),
                }
            }
            CredentialGate::Unavailable(reason) => {
                return RegistrationOutcome::Skipped {
                    reason: reason.clone(),
                }
            }
            CredentialGate::Pending | CredentialGate::Ready => {}
        }

        match self
            .plane
            .register_worker_node(&slot.name, &slot.name, self.config.workers.internal_ssh_port)
            .await
        {
            Ok(registration) => RegistrationOutcome::Registered {
                already_present: registration.already_present(),
            },
            Err(e) => RegistrationOutcome::Failed(Failure::new(
                FailureKind::NodeRegistration,
                e.to_string(),
            )),
        }
    }

    /// Stop and remove worker `index`
    ///
    /// A stopped worker skips the stop. A failed stop leaves the container.
    #[instrument(skip(self))]
    pub async fn remove_worker(&self, index: u32) -> WorkerResult<String> {
        let slot = self.slot(index)?;
        let status = self
            .runtime
            .status(&slot.name)
            .await?
            .ok_or_else(|| WorkerError::NotFound(slot.name.clone()))?;

        if buildnet_runtime::status_is_running(&status) {
            let stopped = self.runtime.stop(&slot.name).await;
            if !stopped.success {
                return Err(WorkerError::StopFailed {
                    name: slot.name,
                    message: buildnet_types::truncate_diagnostic(&stopped.output),
                });
            }
        }

        let removed = self.runtime.remove(&slot.name, false).await;
        if !removed.success {
            return Err(WorkerError::RemoveFailed {
                name: slot.name,
                message: buildnet_types::truncate_diagnostic(&removed.output),
            });
        }
        info!(worker = %slot.name, "Worker removed");
        Ok(slot.name)
    }

    /// Force-remove every worker container, one outcome per container
    #[instrument(skip(self))]
    pub async fn remove_all_workers(&self) -> WorkerResult<Vec<RemovalOutcome>> {
        let workers = self.list_workers().await?;
        let mut outcomes = Vec::with_capacity(workers.len());
        for worker in workers {
            let output = self.runtime.remove(&worker.id, true).await;
            if !output.success {
                warn!(worker = %worker.name, output = %output.output.trim(), "Removal failed");
            }
            outcomes.push(RemovalOutcome {
                name: worker.name,
                id: worker.id,
                removed: output.success,
                message: buildnet_types::truncate_diagnostic(&output.output),
            });
        }
        Ok(outcomes)
    }

    /// Worker containers, running or not
    pub async fn list_workers(&self) -> WorkerResult<Vec<ContainerSummary>> {
        let prefix = format!("{}-", self.config.workers.container_name_prefix);
        let containers = self.runtime.list(&prefix).await?;
        Ok(containers
            .into_iter()
            .filter(|c| c.name.starts_with(&prefix))
            .collect())
    }

    /// Logs of worker `index`: its log file if present, else runtime logs
    pub async fn worker_logs(&self, index: u32) -> WorkerResult<String> {
        let slot = self.slot(index)?;
        let log_file = self
            .config
            .directories
            .logs
            .join(format!("{}.log", slot.name));
        if log_file.is_file() {
            return Ok(tokio::fs::read_to_string(&log_file).await?);
        }
        Ok(self.runtime.logs(&slot.name).await.into_result("logs")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildnet_control::testing::FakeControlPlane;
    use buildnet_runtime::testing::{FakeRuntime, RuntimeCall, StaticTrust};
    use buildnet_types::{Directories, StepStatus, Timings};
    use tempfile::TempDir;

    struct Harness {
        _tmp: TempDir,
        runtime: Arc<FakeRuntime>,
        plane: Arc<FakeControlPlane>,
        provisioner: WorkerProvisioner,
    }

    fn harness(runtime: FakeRuntime, plane: FakeControlPlane) -> Harness {
        harness_with_trust(
            runtime,
            plane,
            StaticTrust::new("/keys/jenkins_agent", "ssh-rsa AAAA jenkins-agent@local"),
        )
    }

    fn harness_with_trust(
        runtime: FakeRuntime,
        plane: FakeControlPlane,
        trust: StaticTrust,
    ) -> Harness {
        let tmp = TempDir::new().unwrap();
        let config = ClusterConfig {
            directories: Directories::rooted_at(tmp.path()),
            timings: Timings::immediate(),
            ..Default::default()
        };
        let runtime = Arc::new(runtime);
        let plane = Arc::new(plane);
        let provisioner =
            WorkerProvisioner::new(config, runtime.clone(), Arc::new(trust), plane.clone())
                .with_docker_group("999");
        Harness {
            _tmp: tmp,
            runtime,
            plane,
            provisioner,
        }
    }

    #[tokio::test]
    async fn test_three_workers_one_container_failure() {
        let h = harness(
            FakeRuntime::new().fail_run("jenkins-local-agent-2"),
            FakeControlPlane::new(),
        );

        let report = h.provisioner.provision(3).await.unwrap();

        assert_eq!(report.results.len(), 3);
        let ports: Vec<u16> = report.results.iter().map(|r| r.assigned_port).collect();
        assert_eq!(ports, vec![2222, 2223, 2224]);

        let failed = &report.results[1];
        assert_eq!(failed.container_status(), StepStatus::Failed);
        assert_eq!(failed.registration_status(), StepStatus::NotAttempted);
        assert!(failed.error().is_some());

        assert!(report.results[0].is_registered());
        assert!(report.results[2].is_registered());
        assert_eq!(
            h.plane.node_attempts(),
            vec!["jenkins-local-agent-1", "jenkins-local-agent-3"]
        );
        assert_eq!(report.success_count(), 2);
    }

    #[tokio::test]
    async fn test_worker_container_spec() {
        let h = harness(FakeRuntime::new(), FakeControlPlane::new());
        h.provisioner.provision(1).await.unwrap();

        let spec = h.runtime.spec_of("jenkins-local-agent-1").unwrap();
        let args = spec.to_run_args();
        assert!(args.contains(&"/keys/jenkins_agent:/home/jenkins/.ssh/id_rsa:ro".to_string()));
        assert!(args.contains(&"/var/run/docker.sock:/var/run/docker.sock".to_string()));
        assert!(args.contains(&"JENKINS_AGENT_SSH_PUBKEY=ssh-rsa AAAA jenkins-agent@local".to_string()));
        assert!(args.contains(&"2222:22".to_string()));
        assert_eq!(spec.group_add.as_deref(), Some("999"));
        assert_eq!(spec.restart.as_deref(), Some("unless-stopped"));

        let nodes = h.plane.nodes();
        assert_eq!(
            nodes.get("jenkins-local-agent-1"),
            Some(&("jenkins-local-agent-1".to_string(), 22))
        );
    }

    #[tokio::test]
    async fn test_credential_is_registered_once_per_batch() {
        let h = harness(FakeRuntime::new(), FakeControlPlane::new());
        h.provisioner.provision(3).await.unwrap();

        assert_eq!(h.plane.credential_attempts(), 1);
        assert_eq!(h.plane.credential_creations(), 1);
    }

    #[tokio::test]
    async fn test_credential_gate_follows_first_deployed_worker() {
        let h = harness(
            FakeRuntime::new().fail_run("jenkins-local-agent-1"),
            FakeControlPlane::new(),
        );
        let report = h.provisioner.provision(2).await.unwrap();

        assert_eq!(report.results[0].container_status(), StepStatus::Failed);
        assert!(report.results[1].is_registered());
        assert_eq!(h.plane.credential_attempts(), 1);
    }

    #[tokio::test]
    async fn test_credential_failure_skips_later_registrations() {
        let h = harness(
            FakeRuntime::new(),
            FakeControlPlane::new().fail_credential("crumb unavailable"),
        );
        let report = h.provisioner.provision(3).await.unwrap();

        assert_eq!(h.plane.credential_attempts(), 1);
        assert!(h.plane.node_attempts().is_empty());

        match &report.results[0].outcome {
            buildnet_types::WorkerOutcome::Deployed { registration, .. } => {
                assert!(matches!(registration, RegistrationOutcome::Failed(f)
                    if f.kind == FailureKind::CredentialRegistration));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        for result in &report.results[1..] {
            assert_eq!(result.container_status(), StepStatus::Success);
            assert_eq!(result.registration_status(), StepStatus::Skipped);
        }
    }

    #[tokio::test]
    async fn test_unready_coordinator_skips_registration() {
        let h = harness(FakeRuntime::new(), FakeControlPlane::new().unreachable());
        let report = h.provisioner.provision(2).await.unwrap();

        assert!(h.plane.probes() >= 1);
        assert_eq!(h.plane.credential_attempts(), 0);
        assert!(h.plane.node_attempts().is_empty());
        assert_eq!(h.runtime.run_count("jenkins-local-agent-1"), 1);
        assert_eq!(h.runtime.run_count("jenkins-local-agent-2"), 1);
        for result in &report.results {
            assert_eq!(result.container_status(), StepStatus::Success);
            assert_eq!(result.registration_status(), StepStatus::Skipped);
            assert!(result.error().unwrap().contains("coordinator not ready"));
        }
        assert_eq!(report.success_count(), 0);
    }

    #[tokio::test]
    async fn test_node_failure_is_per_worker() {
        let h = harness(
            FakeRuntime::new(),
            FakeControlPlane::new().fail_node("jenkins-local-agent-1", "HTTP 500: boom"),
        );
        let report = h.provisioner.provision(2).await.unwrap();

        assert_eq!(report.results[0].registration_status(), StepStatus::Failed);
        assert!(report.results[0].error().unwrap().contains("HTTP 500"));
        assert!(report.results[1].is_registered());
    }

    #[tokio::test]
    async fn test_rerun_reuses_running_workers() {
        let h = harness(
            FakeRuntime::new().with_container("jenkins-local-agent-1", "Up 3 minutes"),
            FakeControlPlane::new()
                .with_credential()
                .with_node("jenkins-local-agent-1"),
        );
        let report = h.provisioner.provision(1).await.unwrap();

        assert_eq!(h.runtime.run_count("jenkins-local-agent-1"), 0);
        assert!(matches!(
            &report.results[0].outcome,
            buildnet_types::WorkerOutcome::Deployed {
                registration: RegistrationOutcome::Registered { already_present: true },
                ..
            }
        ));
        assert_eq!(h.plane.credential_creations(), 0);
    }

    #[tokio::test]
    async fn test_missing_public_key_fails_before_any_container() {
        let h = harness_with_trust(
            FakeRuntime::new(),
            FakeControlPlane::new(),
            StaticTrust::missing("/keys/jenkins_agent"),
        );
        assert!(matches!(
            h.provisioner.provision(2).await,
            Err(WorkerError::Trust(_))
        ));
        assert!(h.runtime.container_names().is_empty());
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        let h = harness(FakeRuntime::new(), FakeControlPlane::new());
        assert!(matches!(
            h.provisioner.provision(0).await,
            Err(WorkerError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_stopped_worker_skips_stop() {
        let h = harness(
            FakeRuntime::new().with_container("jenkins-local-agent-1", "Exited (137) 5 minutes ago"),
            FakeControlPlane::new(),
        );

        let name = h.provisioner.remove_worker(1).await.unwrap();
        assert_eq!(name, "jenkins-local-agent-1");
        assert!(h.runtime.container_names().is_empty());
        assert!(!h
            .runtime
            .calls()
            .contains(&RuntimeCall::Stop("jenkins-local-agent-1".into())));
    }

    #[tokio::test]
    async fn test_remove_fails_fast_when_stop_fails() {
        let h = harness(
            FakeRuntime::new()
                .with_container("jenkins-local-agent-1", "Up 1 hour")
                .fail_stop("jenkins-local-agent-1"),
            FakeControlPlane::new(),
        );

        assert!(matches!(
            h.provisioner.remove_worker(1).await,
            Err(WorkerError::StopFailed { .. })
        ));
        assert_eq!(h.runtime.container_names(), vec!["jenkins-local-agent-1"]);
    }

    #[tokio::test]
    async fn test_remove_missing_worker() {
        let h = harness(FakeRuntime::new(), FakeControlPlane::new());
        assert!(matches!(
            h.provisioner.remove_worker(4).await,
            Err(WorkerError::NotFound(name)) if name == "jenkins-local-agent-4"
        ));
    }

    #[tokio::test]
    async fn test_remove_with_unreachable_runtime_is_not_not_found() {
        let h = harness(FakeRuntime::new().unavailable(), FakeControlPlane::new());
        assert!(matches!(
            h.provisioner.remove_worker(1).await,
            Err(WorkerError::Runtime(_))
        ));
    }

    #[tokio::test]
    async fn test_unreadable_status_fails_container_without_run() {
        let h = harness(FakeRuntime::new().unavailable(), FakeControlPlane::new());
        let report = h.provisioner.provision(1).await.unwrap();

        assert_eq!(report.results[0].container_status(), StepStatus::Failed);
        assert!(report.results[0].error().unwrap().contains("ps failed"));
        assert_eq!(h.runtime.run_count("jenkins-local-agent-1"), 0);
    }

    #[tokio::test]
    async fn test_remove_all_workers() {
        let h = harness(
            FakeRuntime::new()
                .with_container("jenkins-local-agent-1", "Up 1 hour")
                .with_container("jenkins-local-agent-2", "Exited (0) 1 hour ago")
                .with_container("jenkins-local-master", "Up 1 hour"),
            FakeControlPlane::new(),
        );

        let outcomes = h.provisioner.remove_all_workers().await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.removed));
        assert_eq!(h.runtime.container_names(), vec!["jenkins-local-master"]);
    }

    #[tokio::test]
    async fn test_worker_logs_prefers_log_file() {
        let h = harness(
            FakeRuntime::new().with_container("jenkins-local-agent-1", "Up 1 hour"),
            FakeControlPlane::new(),
        );
        assert_eq!(
            h.provisioner.worker_logs(1).await.unwrap(),
            "jenkins-local-agent-1 started"
        );

        let logs_dir = h._tmp.path().join("logs");
        std::fs::create_dir_all(&logs_dir).unwrap();
        std::fs::write(logs_dir.join("jenkins-local-agent-1.log"), "sshd listening").unwrap();
        assert_eq!(h.provisioner.worker_logs(1).await.unwrap(), "sshd listening");
    }
}
