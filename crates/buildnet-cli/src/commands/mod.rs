//! CLI commands

pub mod config;
pub mod coordinator;
pub mod keys;
pub mod setup;
pub mod status;
pub mod volume;
pub mod worker;

use crate::error::{CliError, CliResult};
use crate::output::{self, print_success, print_warning, OutputFormat};
use buildnet_runtime::ContainerSummary;
use buildnet_types::{BatchReport, ProvisioningResult};
use serde::Serialize;
use tabled::Tabled;

/// Table row for one provisioned worker
#[derive(Debug, Serialize, Tabled)]
pub(crate) struct ProvisioningRow {
    name: String,
    port: u16,
    container: String,
    registration: String,
    error: String,
}

impl From<&ProvisioningResult> for ProvisioningRow {
    fn from(result: &ProvisioningResult) -> Self {
        Self {
            name: result.name.clone(),
            port: result.assigned_port,
            container: result.container_status().to_string(),
            registration: result.registration_status().to_string(),
            error: result.error().unwrap_or_default(),
        }
    }
}

/// Table row for a listed worker container
#[derive(Debug, Serialize, Tabled)]
pub(crate) struct ContainerRow {
    name: String,
    status: String,
    id: String,
}

impl From<ContainerSummary> for ContainerRow {
    fn from(c: ContainerSummary) -> Self {
        Self {
            name: c.name,
            status: c.status,
            id: short_id(&c.id),
        }
    }
}

pub(crate) fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}

/// Print a batch and turn any failed worker into a non-zero exit
pub(crate) fn report_batch(report: &BatchReport, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Table => {
            let rows: Vec<ProvisioningRow> = report.results.iter().map(Into::into).collect();
            output::print_output(rows, format)?;
        }
        _ => {
            output::print_single(report, format)?;
            return batch_outcome(report);
        }
    }

    if report.is_complete_success() {
        print_success(&format!(
            "{} of {} workers provisioned",
            report.success_count(),
            report.requested
        ));
    } else {
        print_warning("Some workers were not fully provisioned; see the error column");
    }
    batch_outcome(report)
}

/// Non-zero exit when any worker of the batch failed
pub(crate) fn batch_outcome(report: &BatchReport) -> CliResult<()> {
    if report.is_complete_success() {
        Ok(())
    } else {
        Err(CliError::PartialBatch {
            succeeded: report.success_count(),
            requested: report.requested,
        })
    }
}
