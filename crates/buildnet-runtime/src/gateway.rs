//! Runtime gateway contract
//!
//! The orchestrator only needs presence or absence of success plus the raw
//! text a verb produced. Runtime-specific error codes are never parsed.

use async_trait::async_trait;
use buildnet_types::truncate_diagnostic;
use std::path::Path;

use crate::error::{Result, RuntimeError};

/// Success flag and raw output of one runtime verb
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// Standard output on success, error output on failure
    pub output: String,
}

impl CommandOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }

    /// Convert into a `Result`, labelling a failure with `verb`
    pub fn into_result(self, verb: &str) -> Result<String> {
        if self.success {
            Ok(self.output)
        } else {
            Err(RuntimeError::CommandFailed {
                verb: verb.to_string(),
                message: truncate_diagnostic(&self.output),
            })
        }
    }
}

/// Bind mount of a host path or named volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

/// Everything needed to start one detached container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub network: Option<String>,
    /// `(host, container)` port pairs
    pub ports: Vec<(u16, u16)>,
    pub mounts: Vec<Mount>,
    pub env: Vec<(String, String)>,
    pub cpus: Option<String>,
    pub memory: Option<String>,
    pub group_add: Option<String>,
    pub restart: Option<String>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn port(mut self, host: u16, container: u16) -> Self {
        self.ports.push((host, container));
        self
    }

    pub fn mount(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.mounts.push(Mount {
            source: source.into(),
            target: target.into(),
            read_only: false,
        });
        self
    }

    pub fn mount_read_only(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.mounts.push(Mount {
            source: source.into(),
            target: target.into(),
            read_only: true,
        });
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn limits(mut self, cpus: impl Into<String>, memory: impl Into<String>) -> Self {
        self.cpus = Some(cpus.into());
        self.memory = Some(memory.into());
        self
    }

    pub fn group_add(mut self, group: impl Into<String>) -> Self {
        self.group_add = Some(group.into());
        self
    }

    pub fn restart(mut self, policy: impl Into<String>) -> Self {
        self.restart = Some(policy.into());
        self
    }

    /// Arguments of a detached `run`
    pub fn to_run_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.name.clone(),
        ];
        if let Some(network) = &self.network {
            args.extend(["--network".to_string(), network.clone()]);
        }
        if let Some(cpus) = &self.cpus {
            args.extend(["--cpus".to_string(), cpus.clone()]);
        }
        if let Some(memory) = &self.memory {
            args.extend(["-m".to_string(), memory.clone()]);
        }
        if let Some(group) = &self.group_add {
            args.extend(["--group-add".to_string(), group.clone()]);
        }
        for mount in &self.mounts {
            let mut volume = format!("{}:{}", mount.source, mount.target);
            if mount.read_only {
                volume.push_str(":ro");
            }
            args.extend(["-v".to_string(), volume]);
        }
        for (key, value) in &self.env {
            args.extend(["-e".to_string(), format!("{}={}", key, value)]);
        }
        for (host, container) in &self.ports {
            args.extend(["-p".to_string(), format!("{}:{}", host, container)]);
        }
        if let Some(policy) = &self.restart {
            args.extend(["--restart".to_string(), policy.clone()]);
        }
        args.push(self.image.clone());
        args
    }
}

/// One container row from a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub name: String,
    /// Runtime status text, e.g. `Up 3 minutes` or `Exited (0) 2 hours ago`
    pub status: String,
    pub id: String,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        status_is_running(&self.status)
    }

    /// Parse one `name<TAB>status<TAB>id` listing line
    pub fn parse_line(line: &str) -> Result<Self> {
        let mut parts = line.trim_end_matches(|c: char| c == '\r' || c == '\n').split('\t');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(status), Some(id)) if !name.is_empty() => Ok(Self {
                name: name.to_string(),
                status: status.to_string(),
                id: id.to_string(),
            }),
            _ => Err(RuntimeError::Parse(line.to_string())),
        }
    }
}

/// Whether a runtime status string describes a running container
pub fn status_is_running(status: &str) -> bool {
    status.trim_start().starts_with("Up")
}

/// Container lifecycle verbs consumed by the orchestrator
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check that the container engine answers
    async fn info(&self) -> CommandOutput;

    /// Status text of the container named exactly `name`, `None` if absent
    async fn status(&self, name: &str) -> Result<Option<String>>;

    /// Whether a container named exactly `name` exists
    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.status(name).await?.is_some())
    }

    /// Whether the container named `name` is up
    async fn is_running(&self, name: &str) -> Result<bool> {
        Ok(self
            .status(name)
            .await?
            .map_or(false, |status| status_is_running(&status)))
    }

    /// Start a detached container
    async fn run(&self, spec: &ContainerSpec) -> CommandOutput;

    async fn start(&self, name: &str) -> CommandOutput;

    async fn stop(&self, name: &str) -> CommandOutput;

    /// Remove a container by name or id
    async fn remove(&self, name_or_id: &str, force: bool) -> CommandOutput;

    async fn logs(&self, name: &str) -> CommandOutput;

    /// Run a command inside a running container
    async fn exec(&self, name: &str, command: &[&str]) -> CommandOutput;

    /// Copy a host file into a container
    async fn copy_into(&self, source: &Path, name: &str, destination: &str) -> CommandOutput;

    /// All containers whose name contains `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<ContainerSummary>>;

    async fn build_image(&self, dockerfile: &Path, tag: &str) -> CommandOutput;

    /// Create the network unless one with exactly this name exists
    async fn ensure_network(&self, name: &str) -> CommandOutput;

    /// Create the volume unless one with exactly this name exists
    async fn ensure_volume(&self, name: &str) -> CommandOutput;

    /// Archive a volume's contents into `archive`
    async fn backup_volume(&self, volume: &str, archive: &Path) -> CommandOutput;

    /// Extract `archive` into a volume
    async fn restore_volume(&self, volume: &str, archive: &Path) -> CommandOutput;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_order() {
        let spec = ContainerSpec::new("jenkins-local-agent-1", "jenkins-local-agent:latest")
            .network("jenkins-local-net")
            .limits("2", "4g")
            .group_add("999")
            .mount_read_only("/home/me/.jenkins-local/ssh/jenkins_agent", "/home/jenkins/.ssh/id_rsa")
            .env("JENKINS_AGENT_SSH_PUBKEY", "ssh-rsa AAAA")
            .port(2222, 22)
            .restart("unless-stopped");

        let args = spec.to_run_args();
        assert_eq!(&args[..4], &["run", "-d", "--name", "jenkins-local-agent-1"]);
        assert!(args
            .windows(2)
            .any(|w| w[0] == "-v" && w[1] == "/home/me/.jenkins-local/ssh/jenkins_agent:/home/jenkins/.ssh/id_rsa:ro"));
        assert!(args.windows(2).any(|w| w[0] == "-p" && w[1] == "2222:22"));
        assert!(args.windows(2).any(|w| w[0] == "-m" && w[1] == "4g"));
        assert_eq!(args.last().unwrap(), "jenkins-local-agent:latest");
    }

    #[test]
    fn test_parse_listing_line() {
        let summary =
            ContainerSummary::parse_line("jenkins-local-agent-1\tUp 5 minutes\t3f2a9c\n").unwrap();
        assert_eq!(summary.name, "jenkins-local-agent-1");
        assert_eq!(summary.id, "3f2a9c");
        assert!(summary.is_running());

        let stopped =
            ContainerSummary::parse_line("jenkins-local-agent-2\tExited (0) 1 hour ago\tab12").unwrap();
        assert!(!stopped.is_running());

        assert!(ContainerSummary::parse_line("garbage").is_err());
    }

    #[test]
    fn test_failed_output_truncates_message() {
        let err = CommandOutput::failed("e".repeat(400))
            .into_result("run")
            .unwrap_err();
        match err {
            RuntimeError::CommandFailed { verb, message } => {
                assert_eq!(verb, "run");
                assert!(message.len() < 250);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
