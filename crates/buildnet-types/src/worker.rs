//! Worker identity
//!
//! A worker's name and externally exposed port are pure functions of its
//! index, so a batch never needs shared allocation state.

use crate::config::{ConfigError, WorkerConfig};
use serde::{Deserialize, Serialize};

/// Container name of worker `index`
pub fn worker_name(prefix: &str, index: u32) -> String {
    format!("{}-{}", prefix, index)
}

/// External port of worker `index`: `base_port + index - 1`
///
/// Returns `None` for index 0 or when the port would exceed 65535.
pub fn assigned_port(base_port: u16, index: u32) -> Option<u16> {
    let offset = index.checked_sub(1)?;
    let port = u32::from(base_port).checked_add(offset)?;
    u16::try_from(port).ok()
}

/// Name and port of one requested worker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerSlot {
    /// 1-based index within the batch
    pub index: u32,
    /// Container name, also the host name on the cluster network
    pub name: String,
    /// Host port mapped to the worker's SSH port
    pub port: u16,
}

impl WorkerSlot {
    /// Slot for worker `index`
    pub fn new(config: &WorkerConfig, index: u32) -> Result<Self, ConfigError> {
        let port = assigned_port(config.base_ssh_port, index).ok_or(if index == 0 {
            ConfigError::InvalidIndex(index)
        } else {
            ConfigError::PortRangeOverflow {
                base_port: config.base_ssh_port,
                count: index,
            }
        })?;

        Ok(Self {
            index,
            name: worker_name(&config.container_name_prefix, index),
            port,
        })
    }

    /// Slots for indices `1..=count`, in order
    pub fn plan(config: &WorkerConfig, count: u32) -> Result<Vec<Self>, ConfigError> {
        if count == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        (1..=count).map(|index| Self::new(config, index)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_three_workers_from_2222() {
        let config = WorkerConfig::default();
        let slots = WorkerSlot::plan(&config, 3).unwrap();

        let ports: Vec<u16> = slots.iter().map(|s| s.port).collect();
        assert_eq!(ports, vec![2222, 2223, 2224]);
        assert_eq!(slots[1].name, "jenkins-local-agent-2");
        assert_eq!(slots[2].index, 3);
    }

    #[test]
    fn test_index_zero_is_rejected() {
        assert_eq!(assigned_port(2222, 0), None);
        let config = WorkerConfig::default();
        assert_eq!(
            WorkerSlot::new(&config, 0),
            Err(ConfigError::InvalidIndex(0))
        );
    }

    #[test]
    fn test_port_overflow_is_rejected() {
        assert_eq!(assigned_port(65535, 1), Some(65535));
        assert_eq!(assigned_port(65535, 2), None);
    }

    #[test]
    fn test_plan_requires_workers() {
        let config = WorkerConfig::default();
        assert_eq!(WorkerSlot::plan(&config, 0), Err(ConfigError::ZeroWorkers));
    }

    proptest! {
        #[test]
        fn prop_ports_are_offset_and_distinct(base in 1u16..60000, count in 1u32..256) {
            let mut seen = HashSet::new();
            for index in 1..=count {
                let port = assigned_port(base, index).unwrap();
                prop_assert_eq!(u32::from(port), u32::from(base) + index - 1);
                prop_assert!(seen.insert(port));
            }
        }
    }
}
