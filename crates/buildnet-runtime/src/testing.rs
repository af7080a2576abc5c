//! In-memory runtime and trust material for tests

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, RuntimeError, TrustError, TrustResult};
use crate::gateway::{CommandOutput, ContainerRuntime, ContainerSpec, ContainerSummary};
use crate::trust::TrustMaterial;

/// One recorded call against [`FakeRuntime`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Info,
    Run(String),
    Start(String),
    Stop(String),
    Remove(String),
    Exec(String, Vec<String>),
    CopyInto(String, String),
    BuildImage(String),
    EnsureNetwork(String),
    EnsureVolume(String),
    BackupVolume(String),
    RestoreVolume(String),
}

#[derive(Debug, Default)]
struct FakeState {
    /// name -> (status, id)
    containers: BTreeMap<String, (String, String)>,
    specs: BTreeMap<String, ContainerSpec>,
    calls: Vec<RuntimeCall>,
    failing_runs: HashSet<String>,
    failing_stops: HashSet<String>,
    failing_starts: HashSet<String>,
    failing_copies: bool,
    unavailable: bool,
    next_id: u32,
}

/// Container runtime keeping containers in memory
///
/// Containers created by `run` are up until stopped. Failures are configured
/// per container name.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// `info`, `status` and `list` fail
    pub fn unavailable(self) -> Self {
        self.with(|s| s.unavailable = true)
    }

    /// `run` fails for this container
    pub fn fail_run(self, name: &str) -> Self {
        self.with(|s| {
            s.failing_runs.insert(name.to_string());
        })
    }

    pub fn fail_stop(self, name: &str) -> Self {
        self.with(|s| {
            s.failing_stops.insert(name.to_string());
        })
    }

    pub fn fail_start(self, name: &str) -> Self {
        self.with(|s| {
            s.failing_starts.insert(name.to_string());
        })
    }

    pub fn fail_copies(self) -> Self {
        self.with(|s| s.failing_copies = true)
    }

    /// Seed an existing container with a status string
    pub fn with_container(self, name: &str, status: &str) -> Self {
        self.with(|s| {
            s.next_id += 1;
            let id = format!("fake{:04}", s.next_id);
            s.containers
                .insert(name.to_string(), (status.to_string(), id));
        })
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.lock().calls.clone()
    }

    /// Number of `run` requests issued for `name`
    pub fn run_count(&self, name: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, RuntimeCall::Run(n) if n == name))
            .count()
    }

    pub fn spec_of(&self, name: &str) -> Option<ContainerSpec> {
        self.lock().specs.get(name).cloned()
    }

    pub fn container_names(&self) -> Vec<String> {
        self.lock().containers.keys().cloned().collect()
    }

    fn with(self, f: impl FnOnce(&mut FakeState)) -> Self {
        f(&mut self.lock());
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn info(&self) -> CommandOutput {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Info);
        if state.unavailable {
            CommandOutput::failed("Cannot connect to the Docker daemon")
        } else {
            CommandOutput::ok("Server Version: fake")
        }
    }

    async fn status(&self, name: &str) -> Result<Option<String>> {
        let state = self.lock();
        if state.unavailable {
            return Err(RuntimeError::CommandFailed {
                verb: "ps".into(),
                message: "Cannot connect to the Docker daemon".into(),
            });
        }
        Ok(state.containers.get(name).map(|(status, _)| status.clone()))
    }

    async fn run(&self, spec: &ContainerSpec) -> CommandOutput {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Run(spec.name.clone()));
        if state.failing_runs.contains(&spec.name) {
            return CommandOutput::failed("Bind for 0.0.0.0 failed: port is already allocated");
        }
        if state.containers.contains_key(&spec.name) {
            return CommandOutput::failed(format!(
                "Conflict. The container name \"/{}\" is already in use",
                spec.name
            ));
        }
        state.next_id += 1;
        let id = format!("fake{:04}", state.next_id);
        state
            .containers
            .insert(spec.name.clone(), ("Up 1 second".to_string(), id.clone()));
        state.specs.insert(spec.name.clone(), spec.clone());
        CommandOutput::ok(id)
    }

    async fn start(&self, name: &str) -> CommandOutput {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Start(name.to_string()));
        if state.failing_starts.contains(name) {
            return CommandOutput::failed("start refused");
        }
        match state.containers.get_mut(name) {
            Some(entry) => {
                entry.0 = "Up 1 second".to_string();
                CommandOutput::ok(name)
            }
            None => CommandOutput::failed(format!("No such container: {}", name)),
        }
    }

    async fn stop(&self, name: &str) -> CommandOutput {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Stop(name.to_string()));
        if state.failing_stops.contains(name) {
            return CommandOutput::failed("stop refused");
        }
        match state.containers.get_mut(name) {
            Some(entry) => {
                entry.0 = "Exited (0) 1 second ago".to_string();
                CommandOutput::ok(name)
            }
            None => CommandOutput::failed(format!("No such container: {}", name)),
        }
    }

    async fn remove(&self, name_or_id: &str, force: bool) -> CommandOutput {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Remove(name_or_id.to_string()));
        let key = state
            .containers
            .iter()
            .find(|(name, (_, id))| name.as_str() == name_or_id || id.as_str() == name_or_id)
            .map(|(name, (status, _))| (name.clone(), status.clone()));
        match key {
            Some((_, status)) if !force && crate::gateway::status_is_running(&status) => {
                CommandOutput::failed("cannot remove a running container")
            }
            Some((name, _)) => {
                state.containers.remove(&name);
                CommandOutput::ok(name_or_id)
            }
            None => CommandOutput::failed(format!("No such container: {}", name_or_id)),
        }
    }

    async fn logs(&self, name: &str) -> CommandOutput {
        if self.lock().containers.contains_key(name) {
            CommandOutput::ok(format!("{} started", name))
        } else {
            CommandOutput::failed(format!("No such container: {}", name))
        }
    }

    async fn exec(&self, name: &str, command: &[&str]) -> CommandOutput {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Exec(
            name.to_string(),
            command.iter().map(|s| s.to_string()).collect(),
        ));
        if state.containers.contains_key(name) {
            CommandOutput::ok("")
        } else {
            CommandOutput::failed(format!("No such container: {}", name))
        }
    }

    async fn copy_into(&self, source: &Path, name: &str, destination: &str) -> CommandOutput {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::CopyInto(
            name.to_string(),
            destination.to_string(),
        ));
        if state.failing_copies {
            return CommandOutput::failed("copy failed");
        }
        if !source.exists() {
            return CommandOutput::failed(format!("no such file: {}", source.display()));
        }
        CommandOutput::ok("")
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ContainerSummary>> {
        let state = self.lock();
        if state.unavailable {
            return Err(RuntimeError::CommandFailed {
                verb: "ps".into(),
                message: "Cannot connect to the Docker daemon".into(),
            });
        }
        Ok(state
            .containers
            .iter()
            .filter(|(name, _)| name.contains(prefix))
            .map(|(name, (status, id))| ContainerSummary {
                name: name.clone(),
                status: status.clone(),
                id: id.clone(),
            })
            .collect())
    }

    async fn build_image(&self, dockerfile: &Path, tag: &str) -> CommandOutput {
        self.lock()
            .calls
            .push(RuntimeCall::BuildImage(tag.to_string()));
        if dockerfile.is_file() {
            CommandOutput::ok(format!("Successfully tagged {}", tag))
        } else {
            CommandOutput::failed(format!("Dockerfile {} not found", dockerfile.display()))
        }
    }

    async fn ensure_network(&self, name: &str) -> CommandOutput {
        self.lock()
            .calls
            .push(RuntimeCall::EnsureNetwork(name.to_string()));
        CommandOutput::ok(name)
    }

    async fn ensure_volume(&self, name: &str) -> CommandOutput {
        self.lock()
            .calls
            .push(RuntimeCall::EnsureVolume(name.to_string()));
        CommandOutput::ok(name)
    }

    async fn backup_volume(&self, volume: &str, _archive: &Path) -> CommandOutput {
        self.lock()
            .calls
            .push(RuntimeCall::BackupVolume(volume.to_string()));
        CommandOutput::ok("")
    }

    async fn restore_volume(&self, volume: &str, _archive: &Path) -> CommandOutput {
        self.lock()
            .calls
            .push(RuntimeCall::RestoreVolume(volume.to_string()));
        CommandOutput::ok("")
    }
}

/// Fixed trust material that never touches the filesystem
#[derive(Debug, Clone)]
pub struct StaticTrust {
    private_key: PathBuf,
    public_key: Option<String>,
}

impl StaticTrust {
    pub fn new(private_key: impl Into<PathBuf>, public_key: impl Into<String>) -> Self {
        Self {
            private_key: private_key.into(),
            public_key: Some(public_key.into()),
        }
    }

    /// Material whose key pair has not been generated
    pub fn missing(private_key: impl Into<PathBuf>) -> Self {
        Self {
            private_key: private_key.into(),
            public_key: None,
        }
    }
}

#[async_trait]
impl TrustMaterial for StaticTrust {
    fn exists(&self) -> bool {
        self.public_key.is_some()
    }

    async fn public_key_content(&self) -> TrustResult<String> {
        self.public_key
            .clone()
            .ok_or_else(|| TrustError::Missing(self.private_key.clone()))
    }

    fn private_key_path(&self) -> &Path {
        &self.private_key
    }
}
