//! In-memory control plane for tests

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;

use crate::error::{ControlPlaneError, Result};
use crate::plane::{ControlPlane, CredentialRegistration, NodeRegistration};

#[derive(Debug, Default)]
struct FakeState {
    ready: bool,
    credential_present: bool,
    credential_failure: Option<String>,
    credential_attempts: usize,
    credential_creations: usize,
    nodes: BTreeMap<String, (String, u16)>,
    node_failures: BTreeMap<String, String>,
    node_attempts: Vec<String>,
    installed: BTreeSet<String>,
    install_failures: BTreeMap<String, String>,
    install_requests: Vec<String>,
    listing_failure: Option<String>,
    probes: usize,
}

/// Control plane keeping credentials, nodes and extensions in memory
#[derive(Debug)]
pub struct FakeControlPlane {
    state: Mutex<FakeState>,
}

impl Default for FakeControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeControlPlane {
    /// A ready coordinator with nothing registered
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                ready: true,
                ..Default::default()
            }),
        }
    }

    /// Readiness probes never succeed
    pub fn unreachable(self) -> Self {
        self.with(|s| s.ready = false)
    }

    pub fn with_credential(self) -> Self {
        self.with(|s| s.credential_present = true)
    }

    pub fn fail_credential(self, reason: &str) -> Self {
        self.with(|s| s.credential_failure = Some(reason.to_string()))
    }

    pub fn with_node(self, name: &str) -> Self {
        self.with(|s| {
            s.nodes.insert(name.to_string(), (name.to_string(), 22));
        })
    }

    pub fn fail_node(self, name: &str, reason: &str) -> Self {
        self.with(|s| {
            s.node_failures.insert(name.to_string(), reason.to_string());
        })
    }

    pub fn with_extension(self, name: &str) -> Self {
        self.with(|s| {
            s.installed.insert(name.to_string());
        })
    }

    pub fn fail_install(self, name: &str, reason: &str) -> Self {
        self.with(|s| {
            s.install_failures
                .insert(name.to_string(), reason.to_string());
        })
    }

    /// `installed_extensions` answers with an API error
    pub fn fail_listing(self, message: &str) -> Self {
        self.with(|s| s.listing_failure = Some(message.to_string()))
    }

    pub fn set_ready(&self, ready: bool) {
        self.lock().ready = ready;
    }

    pub fn credential_attempts(&self) -> usize {
        self.lock().credential_attempts
    }

    /// Number of creation requests actually submitted
    pub fn credential_creations(&self) -> usize {
        self.lock().credential_creations
    }

    /// Names passed to `register_worker_node`, in call order
    pub fn node_attempts(&self) -> Vec<String> {
        self.lock().node_attempts.clone()
    }

    /// Registered nodes with the host and port they point at
    pub fn nodes(&self) -> BTreeMap<String, (String, u16)> {
        self.lock().nodes.clone()
    }

    pub fn install_requests(&self) -> Vec<String> {
        self.lock().install_requests.clone()
    }

    pub fn probes(&self) -> usize {
        self.lock().probes
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
impl ControlPlane for FakeControlPlane {
    async fn is_ready(&self) -> bool {
        let mut state = self.lock();
        state.probes += 1;
        state.ready
    }

    async fn register_trust_credential(
        &self,
        private_key_path: &Path,
    ) -> Result<CredentialRegistration> {
        let mut state = self.lock();
        state.credential_attempts += 1;
        if state.credential_present {
            return Ok(CredentialRegistration::AlreadyPresent);
        }
        if let Some(reason) = &state.credential_failure {
            return Err(ControlPlaneError::CredentialRegistration(reason.clone()));
        }
        if private_key_path.as_os_str().is_empty() {
            return Err(ControlPlaneError::CredentialRegistration(
                "cannot read private key".into(),
            ));
        }
        state.credential_creations += 1;
        state.credential_present = true;
        Ok(CredentialRegistration::Created)
    }

    async fn register_worker_node(
        &self,
        name: &str,
        host: &str,
        port: u16,
    ) -> Result<NodeRegistration> {
        let mut state = self.lock();
        state.node_attempts.push(name.to_string());
        if state.nodes.contains_key(name) {
            return Ok(NodeRegistration::AlreadyPresent);
        }
        if let Some(reason) = state.node_failures.get(name) {
            return Err(ControlPlaneError::NodeRegistration(reason.clone()));
        }
        state
            .nodes
            .insert(name.to_string(), (host.to_string(), port));
        Ok(NodeRegistration::Created)
    }

    async fn installed_extensions(&self) -> Result<Vec<String>> {
        let state = self.lock();
        if let Some(message) = &state.listing_failure {
            return Err(ControlPlaneError::Api {
                status: 500,
                message: message.clone(),
            });
        }
        Ok(state.installed.iter().cloned().collect())
    }

    async fn install_extension(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.install_requests.push(name.to_string());
        if let Some(reason) = state.install_failures.get(name) {
            return Err(ControlPlaneError::Extension(reason.clone()));
        }
        state.installed.insert(name.to_string());
        Ok(())
    }
}
