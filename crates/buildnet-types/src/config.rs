//! Cluster configuration
//!
//! `ClusterConfig` is the desired state of the whole cluster. It is created
//! once (defaults, then a config file, then CLI overrides) and passed by value
//! into every service afterwards; nothing mutates it in place.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of the directory under `$HOME` holding all local state
pub const STATE_DIR_NAME: &str = ".jenkins-local";

/// Configuration validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Worker count must be at least one for a batch
    #[error("worker count must be at least 1")]
    ZeroWorkers,

    /// Worker ports would run past 65535
    #[error("base port {base_port} with {count} workers exceeds the port range")]
    PortRangeOverflow { base_port: u16, count: u32 },

    /// Worker index outside 1..=65535 range
    #[error("invalid worker index {0} (indices start at 1)")]
    InvalidIndex(u32),

    /// Admin username or password is empty
    #[error("admin credentials must not be empty")]
    EmptyCredentials,

    /// Coordinator ports collide
    #[error("coordinator port and agent port must differ (both {0})")]
    PortCollision(u16),
}

/// Desired state of the build cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClusterConfig {
    /// Coordinator container settings
    pub coordinator: CoordinatorConfig,

    /// Worker container settings
    pub workers: WorkerConfig,

    /// Admin account created on first run
    pub admin: AdminCredentials,

    /// Shared container network
    pub network: NetworkConfig,

    /// Coordinator home volume
    pub volume: VolumeConfig,

    /// Extensions installed into the coordinator
    pub extensions: ExtensionConfig,

    /// Local state directories
    pub directories: Directories,

    /// Polling and settle timings
    pub timings: Timings,
}

/// Coordinator container settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub container_name: String,
    pub image: String,
    /// Host the control plane is reached on
    pub host: String,
    /// Host port mapped to the web interface
    pub port: u16,
    /// Host port mapped to the agent transport
    pub agent_port: u16,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            container_name: "jenkins-local-master".into(),
            image: "jenkins/jenkins:lts".into(),
            host: "localhost".into(),
            port: 8080,
            agent_port: 50000,
        }
    }
}

impl CoordinatorConfig {
    /// Base URL of the coordinator's HTTP control plane
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Worker container settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Container names are `<prefix>-<index>`
    pub container_name_prefix: String,
    pub image: String,
    /// Number of workers provisioned by a batch
    pub count: u32,
    /// CPU limit passed to the runtime (e.g. "2")
    pub cpus: String,
    /// Memory limit passed to the runtime (e.g. "2g")
    pub memory: String,
    /// External SSH port of worker #1
    pub base_ssh_port: u16,
    /// SSH port inside every worker container
    pub internal_ssh_port: u16,
    /// Working directory of the build executor inside the worker
    pub remote_fs: String,
    /// Host runtime socket mounted into workers
    pub docker_socket: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            container_name_prefix: "jenkins-local-agent".into(),
            image: "jenkins-local-agent:latest".into(),
            count: 1,
            cpus: "2".into(),
            memory: "2g".into(),
            base_ssh_port: 2222,
            internal_ssh_port: 22,
            remote_fs: "/home/jenkins".into(),
            docker_socket: "/var/run/docker.sock".into(),
        }
    }
}

/// Admin account credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl Default for AdminCredentials {
    fn default() -> Self {
        Self {
            username: "admin".into(),
            password: "admin".into(),
        }
    }
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Shared container network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub name: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "jenkins-local-net".into(),
        }
    }
}

/// Coordinator home volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    pub name: String,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            name: "jenkins-local-data".into(),
        }
    }
}

/// Extensions required on the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionConfig {
    pub required: Vec<String>,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            required: [
                "ssh-slaves",
                "credentials",
                "ssh-credentials",
                "git",
                "workflow-aggregator",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Local state directories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Directories {
    pub base: PathBuf,
    pub config: PathBuf,
    pub ssh: PathBuf,
    pub volumes: PathBuf,
    pub logs: PathBuf,
    /// Host copy of the coordinator's init scripts
    pub init: PathBuf,
}

impl Default for Directories {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::rooted_at(home.join(STATE_DIR_NAME))
    }
}

impl Directories {
    /// Lay out every directory under `base`
    pub fn rooted_at(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref().to_path_buf();
        Self {
            config: base.join("config"),
            ssh: base.join("ssh"),
            volumes: base.join("volumes"),
            logs: base.join("logs"),
            init: base.join("init"),
            base,
        }
    }

    /// All directories, for creation and status display
    pub fn all(&self) -> Vec<(&'static str, &Path)> {
        vec![
            ("base", self.base.as_path()),
            ("config", self.config.as_path()),
            ("ssh", self.ssh.as_path()),
            ("volumes", self.volumes.as_path()),
            ("logs", self.logs.as_path()),
            ("init", self.init.as_path()),
        ]
    }

    /// Default location of the config file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Location of the coordinator volume backup archive
    pub fn volume_backup(&self) -> PathBuf {
        self.volumes.join("jenkins-backup.tar.gz")
    }
}

/// Polling and settle timings, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Sleep between two readiness probes
    pub readiness_poll_interval_ms: u64,
    /// Timeout of a single readiness probe
    pub probe_timeout_ms: u64,
    /// Overall readiness deadline
    pub readiness_timeout_ms: u64,
    /// Wait after submitting extension installs, before the restart
    pub extension_settle_ms: u64,
    /// Wait after starting a worker, before reading its logs
    pub container_settle_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            readiness_poll_interval_ms: 5_000,
            probe_timeout_ms: 5_000,
            readiness_timeout_ms: 300_000,
            extension_settle_ms: 10_000,
            container_settle_ms: 2_000,
        }
    }
}

impl Timings {
    /// Zero settle delays and short polling, for tests and dry runs
    pub fn immediate() -> Self {
        Self {
            readiness_poll_interval_ms: 10,
            probe_timeout_ms: 200,
            readiness_timeout_ms: 200,
            extension_settle_ms: 0,
            container_settle_ms: 0,
        }
    }

    pub fn readiness_poll_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn extension_settle(&self) -> Duration {
        Duration::from_millis(self.extension_settle_ms)
    }

    pub fn container_settle(&self) -> Duration {
        Duration::from_millis(self.container_settle_ms)
    }
}

/// Operator overrides applied on top of a loaded config
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterOverrides {
    pub coordinator_port: Option<u16>,
    pub agent_port: Option<u16>,
    pub worker_count: Option<u32>,
    pub cpus: Option<String>,
    pub memory: Option<String>,
    pub base_ssh_port: Option<u16>,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

impl ClusterConfig {
    /// Produce a new config with the given overrides applied
    pub fn with_overrides(self, overrides: &ClusterOverrides) -> Self {
        let mut next = self;
        if let Some(port) = overrides.coordinator_port {
            next.coordinator.port = port;
        }
        if let Some(port) = overrides.agent_port {
            next.coordinator.agent_port = port;
        }
        if let Some(count) = overrides.worker_count {
            next.workers.count = count;
        }
        if let Some(cpus) = &overrides.cpus {
            next.workers.cpus = cpus.clone();
        }
        if let Some(memory) = &overrides.memory {
            next.workers.memory = memory.clone();
        }
        if let Some(port) = overrides.base_ssh_port {
            next.workers.base_ssh_port = port;
        }
        if let Some(username) = &overrides.admin_username {
            next.admin.username = username.clone();
        }
        if let Some(password) = &overrides.admin_password {
            next.admin.password = password.clone();
        }
        next
    }

    /// Check the invariants a provisioning run relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.admin.username.trim().is_empty() || self.admin.password.is_empty() {
            return Err(ConfigError::EmptyCredentials);
        }
        if self.coordinator.port == self.coordinator.agent_port {
            return Err(ConfigError::PortCollision(self.coordinator.port));
        }
        self.validate_batch(self.workers.count)
    }

    /// Check that a batch of `count` workers fits the port range
    pub fn validate_batch(&self, count: u32) -> Result<(), ConfigError> {
        if count == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        let last = u32::from(self.workers.base_ssh_port).checked_add(count - 1);
        if last.map_or(true, |last| last > u32::from(u16::MAX)) {
            return Err(ConfigError::PortRangeOverflow {
                base_port: self.workers.base_ssh_port,
                count,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_local_layout() {
        let config = ClusterConfig::default();
        assert_eq!(config.coordinator.port, 8080);
        assert_eq!(config.coordinator.agent_port, 50000);
        assert_eq!(config.workers.base_ssh_port, 2222);
        assert_eq!(config.workers.container_name_prefix, "jenkins-local-agent");
        assert_eq!(config.coordinator.url(), "http://localhost:8080");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_produce_new_value() {
        let base = ClusterConfig::default();
        let overrides = ClusterOverrides {
            worker_count: Some(3),
            memory: Some("4g".into()),
            admin_password: Some("s3cret".into()),
            ..Default::default()
        };

        let config = base.clone().with_overrides(&overrides);
        assert_eq!(config.workers.count, 3);
        assert_eq!(config.workers.memory, "4g");
        assert_eq!(config.admin.password, "s3cret");
        assert_eq!(config.workers.cpus, base.workers.cpus);
        assert_eq!(base.workers.count, 1);
    }

    #[test]
    fn test_validate_rejects_port_overflow() {
        let mut config = ClusterConfig::default();
        config.workers.base_ssh_port = 65534;
        assert!(config.validate_batch(2).is_ok());
        assert_eq!(
            config.validate_batch(3),
            Err(ConfigError::PortRangeOverflow {
                base_port: 65534,
                count: 3
            })
        );
        assert_eq!(config.validate_batch(0), Err(ConfigError::ZeroWorkers));
    }

    #[test]
    fn test_validate_rejects_empty_credentials() {
        let mut config = ClusterConfig::default();
        config.admin.password.clear();
        assert_eq!(config.validate(), Err(ConfigError::EmptyCredentials));
    }

    #[test]
    fn test_partial_file_merges_over_defaults() {
        let config: ClusterConfig = toml::from_str(
            r#"
            [workers]
            count = 4

            [coordinator]
            port = 9090
            "#,
        )
        .unwrap();

        assert_eq!(config.workers.count, 4);
        assert_eq!(config.workers.image, "jenkins-local-agent:latest");
        assert_eq!(config.coordinator.port, 9090);
        assert_eq!(config.coordinator.agent_port, 50000);
    }

    #[test]
    fn test_admin_debug_redacts_password() {
        let admin = AdminCredentials {
            username: "ops".into(),
            password: "hunter2".into(),
        };
        let rendered = format!("{:?}", admin);
        assert!(rendered.contains("ops"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_directories_layout() {
        let dirs = Directories::rooted_at("/tmp/bn");
        assert_eq!(dirs.ssh, PathBuf::from("/tmp/bn/ssh"));
        assert_eq!(dirs.config_file(), PathBuf::from("/tmp/bn/config/config.toml"));
        assert_eq!(
            dirs.volume_backup(),
            PathBuf::from("/tmp/bn/volumes/jenkins-backup.tar.gz")
        );
        assert_eq!(dirs.all().len(), 6);
    }
}
