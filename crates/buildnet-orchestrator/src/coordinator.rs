//! Coordinator lifecycle manager
//!
//! Owns the single coordinator container: deployment, start/stop/restart,
//! readiness polling and the scripted first-run configuration.

use buildnet_control::ControlPlane;
use buildnet_runtime::{ContainerRuntime, ContainerSpec};
use buildnet_types::{truncate_diagnostic, AdminCredentials, ClusterConfig, ExtensionReport};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::error::{CoordinatorError, CoordinatorResult, RestartError};
use crate::readiness::{wait_for_ready, ReadinessPolicy};
use crate::setup_script::{self, CONTAINER_INIT_DIR, SETUP_SCRIPT_NAME};

/// Home directory of the coordinator inside its container
pub const COORDINATOR_HOME: &str = "/var/jenkins_home";

/// Web interface port inside the coordinator container
pub const COORDINATOR_WEB_PORT: u16 = 8080;

/// Agent transport port inside the coordinator container
pub const COORDINATOR_AGENT_PORT: u16 = 50000;

const INITIAL_PASSWORD_PATH: &str = "/var/jenkins_home/secrets/initialAdminPassword";

/// How a deploy request was satisfied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Container was already up; nothing was issued
    AlreadyRunning,
    /// Existing stopped container was started
    Started,
    /// A new container was run; carries the runtime output
    Created(String),
}

/// Service managing the coordinator container
pub struct CoordinatorManager {
    config: ClusterConfig,
    runtime: Arc<dyn ContainerRuntime>,
}

impl CoordinatorManager {
    pub fn new(config: ClusterConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { config, runtime }
    }

    pub fn container_name(&self) -> &str {
        &self.config.coordinator.container_name
    }

    pub fn url(&self) -> String {
        self.config.coordinator.url()
    }

    pub async fn is_running(&self) -> CoordinatorResult<bool> {
        Ok(self.runtime.is_running(self.container_name()).await?)
    }

    /// Runtime status text, `None` when the container does not exist
    pub async fn status(&self) -> CoordinatorResult<Option<String>> {
        Ok(self.runtime.status(self.container_name()).await?)
    }

    fn container_spec(&self) -> ContainerSpec {
        let coordinator = &self.config.coordinator;
        ContainerSpec::new(&coordinator.container_name, &coordinator.image)
            .network(&self.config.network.name)
            .mount(&self.config.volume.name, COORDINATOR_HOME)
            .port(coordinator.port, COORDINATOR_WEB_PORT)
            .port(coordinator.agent_port, COORDINATOR_AGENT_PORT)
            .restart("unless-stopped")
    }

    /// Bring the coordinator up; a running coordinator is left untouched
    #[instrument(skip(self), fields(container = %self.config.coordinator.container_name))]
    pub async fn deploy(&self) -> CoordinatorResult<DeployOutcome> {
        match self.status().await? {
            Some(status) if buildnet_runtime::status_is_running(&status) => {
                info!("Coordinator already running");
                Ok(DeployOutcome::AlreadyRunning)
            }
            Some(_) => {
                self.runtime
                    .start(self.container_name())
                    .await
                    .into_result("start")
                    .map_err(|e| CoordinatorError::DeploymentFailed(e.to_string()))?;
                info!("Started existing coordinator container");
                Ok(DeployOutcome::Started)
            }
            None => {
                let output = self.runtime.run(&self.container_spec()).await;
                if !output.success {
                    warn!(output = %output.output.trim(), "Coordinator run failed");
                    return Err(CoordinatorError::DeploymentFailed(truncate_diagnostic(
                        &output.output,
                    )));
                }
                info!("Coordinator container created");
                Ok(DeployOutcome::Created(output.output.trim().to_string()))
            }
        }
    }

    pub async fn start(&self) -> CoordinatorResult<String> {
        Ok(self
            .runtime
            .start(self.container_name())
            .await
            .into_result("start")?)
    }

    pub async fn stop(&self) -> CoordinatorResult<String> {
        Ok(self
            .runtime
            .stop(self.container_name())
            .await
            .into_result("stop")?)
    }

    /// Stop then start, reporting which half failed
    #[instrument(skip(self), fields(container = %self.config.coordinator.container_name))]
    pub async fn restart(&self) -> CoordinatorResult<()> {
        let stopped = self.runtime.stop(self.container_name()).await;
        if !stopped.success {
            return Err(RestartError::StopFailed(truncate_diagnostic(&stopped.output)).into());
        }
        let started = self.runtime.start(self.container_name()).await;
        if !started.success {
            return Err(RestartError::StartFailed(truncate_diagnostic(&started.output)).into());
        }
        info!("Coordinator restarted");
        Ok(())
    }

    /// Stop (best effort) and remove the container; the home volume is kept
    pub async fn remove(&self) -> CoordinatorResult<String> {
        if self.is_running().await? {
            let stopped = self.runtime.stop(self.container_name()).await;
            if !stopped.success {
                warn!(output = %stopped.output.trim(), "Stop before removal failed");
            }
        }
        Ok(self
            .runtime
            .remove(self.container_name(), false)
            .await
            .into_result("rm")?)
    }

    pub async fn logs(&self) -> CoordinatorResult<String> {
        Ok(self
            .runtime
            .logs(self.container_name())
            .await
            .into_result("logs")?)
    }

    /// Poll the control plane until it answers or `deadline` passes
    pub async fn wait_for_ready(&self, plane: &dyn ControlPlane, deadline: Duration) -> bool {
        let policy = ReadinessPolicy::from_timings(&self.config.timings).with_deadline(deadline);
        wait_for_ready(plane, policy).await
    }

    /// Install the admin account script and restart so it runs
    ///
    /// The coordinator must answer first. The host copy of the script lives
    /// in the init directory and is overwritten on every call.
    #[instrument(skip(self, plane, admin), fields(user = %admin.username))]
    pub async fn configure_initial_setup(
        &self,
        plane: &dyn ControlPlane,
        admin: &AdminCredentials,
    ) -> CoordinatorResult<()> {
        let deadline = self.config.timings.readiness_timeout();
        if !self.wait_for_ready(plane, deadline).await {
            return Err(CoordinatorError::SetupTimeout(deadline));
        }

        let init_dir = &self.config.directories.init;
        tokio::fs::create_dir_all(init_dir).await?;
        let script_path = init_dir.join(SETUP_SCRIPT_NAME);
        tokio::fs::write(&script_path, setup_script::render(admin)).await?;

        let prepared = self
            .runtime
            .exec(self.container_name(), &["mkdir", "-p", CONTAINER_INIT_DIR])
            .await;
        if !prepared.success {
            return Err(CoordinatorError::ScriptDelivery(truncate_diagnostic(
                &prepared.output,
            )));
        }

        let destination = format!("{}/{}", CONTAINER_INIT_DIR, SETUP_SCRIPT_NAME);
        let copied = self
            .runtime
            .copy_into(&script_path, self.container_name(), &destination)
            .await;
        if !copied.success {
            return Err(CoordinatorError::ScriptDelivery(truncate_diagnostic(
                &copied.output,
            )));
        }
        info!(script = %destination, "Setup script delivered");

        self.restart().await
    }

    /// Install missing extensions, restart once and verify the result
    ///
    /// Only a failed stop/start is an `Err`; install failures and a
    /// coordinator that does not come back are reported in the returned
    /// [`ExtensionReport`]. When every name is already present no restart
    /// happens. When the installed list cannot be read nothing is submitted
    /// and every name is reported as failed.
    #[instrument(skip(self, plane, names), fields(count = names.len()))]
    pub async fn install_extensions(
        &self,
        plane: &dyn ControlPlane,
        names: &[String],
    ) -> CoordinatorResult<ExtensionReport> {
        let mut report = ExtensionReport::default();
        let present = match plane.installed_extensions().await {
            Ok(present) => present,
            Err(e) => {
                warn!(error = %e, "Could not list installed extensions, nothing submitted");
                let reason = truncate_diagnostic(&e.to_string());
                report.failed.extend(names.iter().map(|name| {
                    format!("{} (installed extensions could not be listed: {})", name, reason)
                }));
                return Ok(report);
            }
        };

        let mut submitted = Vec::new();
        for name in names {
            if present.contains(name) {
                info!(extension = %name, "Already installed");
                report.installed.push(name.clone());
                continue;
            }
            match plane.install_extension(name).await {
                Ok(()) => submitted.push(name.clone()),
                Err(e) => {
                    warn!(extension = %name, error = %e, "Install request failed");
                    report
                        .failed
                        .push(format!("{} ({})", name, truncate_diagnostic(&e.to_string())));
                }
            }
        }

        if submitted.is_empty() && report.failed.is_empty() {
            report.ready_after_restart = true;
            return Ok(report);
        }

        tokio::time::sleep(self.config.timings.extension_settle()).await;
        self.restart().await?;
        report.restarted = true;
        report.ready_after_restart = self
            .wait_for_ready(plane, self.config.timings.readiness_timeout())
            .await;

        if submitted.is_empty() {
            return Ok(report);
        }
        if !report.ready_after_restart {
            report.failed.extend(
                submitted
                    .into_iter()
                    .map(|name| format!("{} (coordinator not ready after restart)", name)),
            );
            return Ok(report);
        }

        match plane.installed_extensions().await {
            Ok(active) => {
                for name in submitted {
                    if active.contains(&name) {
                        report.installed.push(name);
                    } else {
                        report
                            .failed
                            .push(format!("{} (not present after restart)", name));
                    }
                }
            }
            Err(e) => {
                let reason = truncate_diagnostic(&e.to_string());
                report.failed.extend(
                    submitted
                        .into_iter()
                        .map(|name| format!("{} (not verified: {})", name, reason)),
                );
            }
        }

        info!(
            installed = report.installed.len(),
            failed = report.failed.len(),
            "Extension pass finished"
        );
        Ok(report)
    }

    /// Read the generated first-run password, retrying while it is written
    pub async fn initial_admin_password(
        &self,
        attempts: u32,
        interval: Duration,
    ) -> CoordinatorResult<Option<String>> {
        if !self.is_running().await? {
            return Err(CoordinatorError::NotRunning(self.container_name().to_string()));
        }
        for attempt in 1..=attempts {
            let output = self
                .runtime
                .exec(self.container_name(), &["cat", INITIAL_PASSWORD_PATH])
                .await;
            if output.success {
                return Ok(Some(output.output.trim().to_string()));
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildnet_control::testing::FakeControlPlane;
    use buildnet_runtime::testing::{FakeRuntime, RuntimeCall};
    use buildnet_types::{Directories, Timings};
    use tempfile::TempDir;

    fn config(tmp: &TempDir) -> ClusterConfig {
        ClusterConfig {
            directories: Directories::rooted_at(tmp.path()),
            timings: Timings::immediate(),
            ..Default::default()
        }
    }

    fn manager(tmp: &TempDir, runtime: FakeRuntime) -> (CoordinatorManager, Arc<FakeRuntime>) {
        let runtime = Arc::new(runtime);
        (CoordinatorManager::new(config(tmp), runtime.clone()), runtime)
    }

    fn restarts(runtime: &FakeRuntime) -> usize {
        runtime
            .calls()
            .iter()
            .filter(|c| matches!(c, RuntimeCall::Stop(_)))
            .count()
    }

    #[tokio::test]
    async fn test_deploy_creates_container_with_bindings() {
        let tmp = TempDir::new().unwrap();
        let (coordinator, runtime) = manager(&tmp, FakeRuntime::new());

        let outcome = coordinator.deploy().await.unwrap();
        assert!(matches!(outcome, DeployOutcome::Created(_)));

        let spec = runtime.spec_of("jenkins-local-master").unwrap();
        assert_eq!(spec.ports, vec![(8080, 8080), (50000, 50000)]);
        assert_eq!(spec.network.as_deref(), Some("jenkins-local-net"));
        assert_eq!(spec.mounts[0].source, "jenkins-local-data");
        assert_eq!(spec.mounts[0].target, COORDINATOR_HOME);
    }

    #[tokio::test]
    async fn test_deploy_on_running_coordinator_issues_no_run() {
        let tmp = TempDir::new().unwrap();
        let (coordinator, runtime) = manager(
            &tmp,
            FakeRuntime::new().with_container("jenkins-local-master", "Up 2 hours"),
        );

        assert_eq!(coordinator.deploy().await.unwrap(), DeployOutcome::AlreadyRunning);
        assert_eq!(runtime.run_count("jenkins-local-master"), 0);
    }

    #[tokio::test]
    async fn test_deploy_reports_unreadable_status() {
        let tmp = TempDir::new().unwrap();
        let (coordinator, runtime) = manager(&tmp, FakeRuntime::new().unavailable());

        assert!(matches!(
            coordinator.deploy().await,
            Err(CoordinatorError::Runtime(_))
        ));
        assert_eq!(runtime.run_count("jenkins-local-master"), 0);
    }

    #[tokio::test]
    async fn test_deploy_starts_stopped_container() {
        let tmp = TempDir::new().unwrap();
        let (coordinator, runtime) = manager(
            &tmp,
            FakeRuntime::new().with_container("jenkins-local-master", "Exited (0) 1 hour ago"),
        );

        assert_eq!(coordinator.deploy().await.unwrap(), DeployOutcome::Started);
        assert_eq!(runtime.run_count("jenkins-local-master"), 0);
        assert!(coordinator.is_running().await.unwrap());
    }

    #[tokio::test]
    async fn test_deploy_failure_is_reported() {
        let tmp = TempDir::new().unwrap();
        let (coordinator, _) = manager(&tmp, FakeRuntime::new().fail_run("jenkins-local-master"));

        let err = coordinator.deploy().await.unwrap_err();
        assert!(matches!(err, CoordinatorError::DeploymentFailed(_)));
        assert!(err.to_string().contains("port is already allocated"));
    }

    #[tokio::test]
    async fn test_restart_reports_failed_half() {
        let tmp = TempDir::new().unwrap();
        let (coordinator, _) = manager(
            &tmp,
            FakeRuntime::new()
                .with_container("jenkins-local-master", "Up 1 minute")
                .fail_stop("jenkins-local-master"),
        );
        let err = coordinator.restart().await.unwrap_err();
        assert!(err.to_string().starts_with("failed to stop"));

        let (coordinator, _) = manager(
            &tmp,
            FakeRuntime::new()
                .with_container("jenkins-local-master", "Up 1 minute")
                .fail_start("jenkins-local-master"),
        );
        let err = coordinator.restart().await.unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Restart(RestartError::StartFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_initial_setup_delivers_script_and_restarts() {
        let tmp = TempDir::new().unwrap();
        let (coordinator, runtime) = manager(
            &tmp,
            FakeRuntime::new().with_container("jenkins-local-master", "Up 1 minute"),
        );
        let plane = FakeControlPlane::new();
        let admin = AdminCredentials::default();

        coordinator
            .configure_initial_setup(&plane, &admin)
            .await
            .unwrap();

        let host_copy = tmp.path().join("init").join(SETUP_SCRIPT_NAME);
        assert!(std::fs::read_to_string(host_copy)
            .unwrap()
            .contains("createAccount('admin', 'admin')"));

        let calls = runtime.calls();
        assert!(calls.contains(&RuntimeCall::CopyInto(
            "jenkins-local-master".into(),
            "/var/jenkins_home/init.groovy.d/basic-security.groovy".into(),
        )));
        assert_eq!(restarts(&runtime), 1);
    }

    #[tokio::test]
    async fn test_initial_setup_requires_readiness() {
        let tmp = TempDir::new().unwrap();
        let (coordinator, runtime) = manager(
            &tmp,
            FakeRuntime::new().with_container("jenkins-local-master", "Up 1 minute"),
        );
        let plane = FakeControlPlane::new().unreachable();

        let err = coordinator
            .configure_initial_setup(&plane, &AdminCredentials::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::SetupTimeout(_)));
        assert_eq!(restarts(&runtime), 0);
    }

    #[tokio::test]
    async fn test_initial_setup_copy_failure() {
        let tmp = TempDir::new().unwrap();
        let (coordinator, runtime) = manager(
            &tmp,
            FakeRuntime::new()
                .with_container("jenkins-local-master", "Up 1 minute")
                .fail_copies(),
        );
        let plane = FakeControlPlane::new();

        let err = coordinator
            .configure_initial_setup(&plane, &AdminCredentials::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::ScriptDelivery(_)));
        assert_eq!(restarts(&runtime), 0);
    }

    #[tokio::test]
    async fn test_extension_pass_with_one_failure_restarts_once() {
        let tmp = TempDir::new().unwrap();
        let (coordinator, runtime) = manager(
            &tmp,
            FakeRuntime::new().with_container("jenkins-local-master", "Up 1 minute"),
        );
        let plane = FakeControlPlane::new()
            .with_extension("a")
            .fail_install("b", "HTTP 500");

        let report = coordinator
            .install_extensions(&plane, &["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert_eq!(report.installed, vec!["a"]);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].starts_with("b ("));
        assert!(report.restarted);
        assert!(report.ready_after_restart);
        assert!(!report.is_success());
        assert_eq!(restarts(&runtime), 1);
        assert_eq!(plane.install_requests(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_extension_pass_verifies_after_restart() {
        let tmp = TempDir::new().unwrap();
        let (coordinator, _) = manager(
            &tmp,
            FakeRuntime::new().with_container("jenkins-local-master", "Up 1 minute"),
        );
        let plane = FakeControlPlane::new();

        let report = coordinator
            .install_extensions(&plane, &["git".to_string(), "ssh-slaves".to_string()])
            .await
            .unwrap();

        assert_eq!(report.installed, vec!["git", "ssh-slaves"]);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_extension_pass_without_changes_skips_restart() {
        let tmp = TempDir::new().unwrap();
        let (coordinator, runtime) = manager(
            &tmp,
            FakeRuntime::new().with_container("jenkins-local-master", "Up 1 minute"),
        );
        let plane = FakeControlPlane::new().with_extension("git");

        let report = coordinator
            .install_extensions(&plane, &["git".to_string()])
            .await
            .unwrap();
        assert!(report.is_success());
        assert!(!report.restarted);
        assert_eq!(restarts(&runtime), 0);
    }

    #[tokio::test]
    async fn test_unlistable_extensions_submit_nothing() {
        let tmp = TempDir::new().unwrap();
        let (coordinator, runtime) = manager(
            &tmp,
            FakeRuntime::new().with_container("jenkins-local-master", "Up 1 minute"),
        );
        let plane = FakeControlPlane::new().fail_listing("script console returned 500");

        let report = coordinator
            .install_extensions(&plane, &["git".to_string(), "ssh-slaves".to_string()])
            .await
            .unwrap();

        assert!(plane.install_requests().is_empty());
        assert!(report.installed.is_empty());
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed[0].starts_with("git (installed extensions could not be listed"));
        assert!(report.failed[1].contains("script console returned 500"));
        assert!(!report.restarted);
        assert!(!report.is_success());
        assert_eq!(restarts(&runtime), 0);
    }

    #[tokio::test]
    async fn test_initial_password_requires_running_coordinator() {
        let tmp = TempDir::new().unwrap();
        let (coordinator, _) = manager(&tmp, FakeRuntime::new());
        assert!(matches!(
            coordinator
                .initial_admin_password(3, Duration::from_millis(1))
                .await,
            Err(CoordinatorError::NotRunning(_))
        ));
    }
}
