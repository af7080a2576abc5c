//! Per-entity outcome types
//!
//! A worker's container step and registration step are tracked separately.
//! `WorkerOutcome::ContainerFailed` carries no registration at all, so a
//! worker whose container never started cannot be reported as registered.

use serde::{Deserialize, Serialize};

/// Maximum length of diagnostic text kept from runtime or HTTP output
pub const DIAGNOSTIC_LIMIT: usize = 200;

/// Truncate diagnostic text to [`DIAGNOSTIC_LIMIT`] characters
pub fn truncate_diagnostic(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(DIAGNOSTIC_LIMIT) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

/// Kind of a recorded failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Container engine not reachable
    RuntimeUnavailable,
    /// Container did not start
    DeploymentFailed,
    /// Control plane never became reachable
    ReadinessTimeout,
    /// Trust credential could not be registered
    CredentialRegistration,
    /// Worker node could not be registered
    NodeRegistration,
    /// Setup script could not be copied into the coordinator
    ScriptDelivery,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::RuntimeUnavailable => "runtime unavailable",
            FailureKind::DeploymentFailed => "deployment failed",
            FailureKind::ReadinessTimeout => "readiness timeout",
            FailureKind::CredentialRegistration => "credential registration failed",
            FailureKind::NodeRegistration => "node registration failed",
            FailureKind::ScriptDelivery => "script delivery failed",
        };
        f.write_str(name)
    }
}

/// A failure with its kind and bounded diagnostic text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl AsRef<str>) -> Self {
        Self {
            kind,
            message: truncate_diagnostic(message.as_ref()),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Flat status of one step, for tables and summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
    NotAttempted,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StepStatus::Success => "success",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
            StepStatus::NotAttempted => "not attempted",
        };
        f.write_str(name)
    }
}

/// Registration state of a worker whose container started
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RegistrationOutcome {
    /// Node exists in the coordinator
    Registered {
        /// The node was already present before this run
        already_present: bool,
    },
    /// Registration was not attempted because a prerequisite failed
    Skipped { reason: String },
    /// Registration was attempted and failed
    Failed(Failure),
}

impl RegistrationOutcome {
    pub fn status(&self) -> StepStatus {
        match self {
            RegistrationOutcome::Registered { .. } => StepStatus::Success,
            RegistrationOutcome::Skipped { .. } => StepStatus::Skipped,
            RegistrationOutcome::Failed(_) => StepStatus::Failed,
        }
    }
}

/// Combined outcome of one worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "container", rename_all = "snake_case")]
pub enum WorkerOutcome {
    /// Container did not start; registration was never attempted
    ContainerFailed(Failure),
    /// Container started
    Deployed {
        /// Runtime output followed by the first container logs
        container_output: String,
        registration: RegistrationOutcome,
    },
}

/// Result of provisioning one worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningResult {
    pub name: String,
    pub assigned_port: u16,
    pub outcome: WorkerOutcome,
}

impl ProvisioningResult {
    pub fn container_failed(name: impl Into<String>, port: u16, failure: Failure) -> Self {
        Self {
            name: name.into(),
            assigned_port: port,
            outcome: WorkerOutcome::ContainerFailed(failure),
        }
    }

    pub fn deployed(
        name: impl Into<String>,
        port: u16,
        container_output: impl Into<String>,
        registration: RegistrationOutcome,
    ) -> Self {
        Self {
            name: name.into(),
            assigned_port: port,
            outcome: WorkerOutcome::Deployed {
                container_output: container_output.into(),
                registration,
            },
        }
    }

    pub fn container_status(&self) -> StepStatus {
        match self.outcome {
            WorkerOutcome::ContainerFailed(_) => StepStatus::Failed,
            WorkerOutcome::Deployed { .. } => StepStatus::Success,
        }
    }

    pub fn registration_status(&self) -> StepStatus {
        match &self.outcome {
            WorkerOutcome::ContainerFailed(_) => StepStatus::NotAttempted,
            WorkerOutcome::Deployed { registration, .. } => registration.status(),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registration_status() == StepStatus::Success
    }

    /// Container started and the node is registered
    pub fn is_success(&self) -> bool {
        self.is_registered()
    }

    /// Human-readable error, `None` when fully provisioned
    pub fn error(&self) -> Option<String> {
        match &self.outcome {
            WorkerOutcome::ContainerFailed(failure) => Some(failure.to_string()),
            WorkerOutcome::Deployed { registration, .. } => match registration {
                RegistrationOutcome::Registered { .. } => None,
                RegistrationOutcome::Skipped { reason } => {
                    Some(format!("registration skipped: {}", reason))
                }
                RegistrationOutcome::Failed(failure) => Some(failure.to_string()),
            },
        }
    }
}

/// Ordered results of one provisioning batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub requested: u32,
    pub results: Vec<ProvisioningResult>,
}

impl BatchReport {
    pub fn new(requested: u32, results: Vec<ProvisioningResult>) -> Self {
        Self { requested, results }
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn is_complete_success(&self) -> bool {
        self.success_count() == self.requested as usize
    }
}

/// Outcome of one extension install pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionReport {
    /// Names present after the pass (already installed or newly installed)
    pub installed: Vec<String>,
    /// `"<name> (<reason>)"` entries
    pub failed: Vec<String>,
    /// The coordinator was restarted by this pass
    pub restarted: bool,
    /// The coordinator answered again after the restart
    pub ready_after_restart: bool,
}

impl ExtensionReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.ready_after_restart
    }
}
