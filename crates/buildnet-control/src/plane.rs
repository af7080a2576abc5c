//! Control-plane contract consumed by the orchestrator

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// How the shared trust credential came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialRegistration {
    /// Found in the listing; nothing was submitted
    AlreadyPresent,
    /// Submitted and confirmed by a second listing
    Created,
}

/// How a worker node came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRegistration {
    AlreadyPresent,
    Created,
}

impl NodeRegistration {
    pub fn already_present(self) -> bool {
        matches!(self, NodeRegistration::AlreadyPresent)
    }
}

/// Authenticated operations against the coordinator's HTTP API
///
/// Mutating calls are idempotent and confirmed by reading back the result.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// One readiness probe: the login page answers 200
    async fn is_ready(&self) -> bool;

    /// Register the shared SSH credential from a private key file
    async fn register_trust_credential(
        &self,
        private_key_path: &Path,
    ) -> Result<CredentialRegistration>;

    /// Register an SSH-launched node reaching the worker at `host:port`
    async fn register_worker_node(
        &self,
        name: &str,
        host: &str,
        port: u16,
    ) -> Result<NodeRegistration>;

    /// Short names of installed extensions
    async fn installed_extensions(&self) -> Result<Vec<String>>;

    /// Submit one extension install; success means accepted, not active
    async fn install_extension(&self, name: &str) -> Result<()>;
}
