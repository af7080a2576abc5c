//! buildnet Control - Coordinator HTTP control-plane client
//!
//! Drives the coordinator's CSRF-protected HTTP API:
//!
//! - readiness probing against the login page
//! - registration of the shared SSH credential (listing first, read-verify after)
//! - registration of SSH-launched worker nodes on a fresh cookie session
//! - extension listing and install requests
//!
//! The orchestrator depends only on the [`ControlPlane`] trait.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod client;
pub mod error;
pub mod plane;
pub mod wire;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use client::ControlPlaneClient;
pub use error::{ControlPlaneError, Result};
pub use plane::{ControlPlane, CredentialRegistration, NodeRegistration};
pub use wire::{Crumb, CREDENTIAL_ID};
