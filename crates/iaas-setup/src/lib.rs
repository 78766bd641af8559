//! Retryable setup of IaaS resources
//!
//! This crate creates cloud resources and drives them through their
//! asynchronous provisioning states with bounded retries.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              resource builders                   │
//! │        (VPC router / NFS / SIM ...)              │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 iaas-setup                       │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │            RetryableSetup                 │   │
//! │  │  create → copy wait → provision → up wait │   │
//! │  └──────────────────┬───────────────────────┘   │
//! │  ┌──────────────────▼───────────────────────┐   │
//! │  │             StatePoller                   │   │
//! │  └──────────────────────────────────────────┘   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │         wrapped API client (caller supplied)     │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use iaas_setup::{RetryableSetup, SetupOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! let setup = RetryableSetup::new()
//!     .create(move |zone| create_disk(zone))
//!     .read(move |zone, id| read_disk(zone, id))
//!     .delete(move |zone, id| delete_disk(zone, id))
//!     .wait_for_copy(true)
//!     .options(SetupOptions::from_env()?);
//!
//! let disk = setup.setup(&CancellationToken::new(), "is1a").await?;
//! ```

pub mod error;
pub mod options;
pub mod poller;
pub mod setup;
pub mod state;

// Re-exports
pub use error::{IaasError, Result, SetupFailure};
pub use options::SetupOptions;
pub use poller::{PollHandle, PollReadFn, StatePoller};
pub use setup::{CreateFn, DeleteFn, ProvisionBeforeUpFn, ReadFn, RetryableSetup};
pub use state::{Availability, InstanceStatus, Resource, ResourceId, StateSet};

// Callers need the same token type the engine observes.
pub use tokio_util::sync::CancellationToken;
