//! Resource builders for the IaaS service layer
//!
//! Each builder validates a desired configuration and then either creates
//! the resource through `iaas_setup::RetryableSetup` or reconciles an
//! existing one.
//!
//! # Builders
//!
//! - [`VpcRouterBuilder`]: router creation, NIC wiring and settings, with a
//!   power cycle when the NIC topology changes
//! - [`NfsBuilder`]: NFS appliance creation waiting for copy and boot
//! - [`SimBuilder`]: SIM registration, carrier and activation state
//! - [`LocalRouterBuilder`]: local router creation with network settings
//!   and peers applied in separate hash-guarded steps
//!
//! # Example
//!
//! ```ignore
//! use iaas_builder::{NicSetting, VpcRouterBuilder};
//! use iaas_setup::{CancellationToken, SetupOptions};
//!
//! let mut builder = VpcRouterBuilder::new(client, "is1a");
//! builder.name = "router".into();
//! builder.setup_options = SetupOptions::from_env()?.with_boot_after_build(true);
//!
//! let router = builder.build(&CancellationToken::new()).await?;
//! ```

pub mod api;
pub mod error;
pub mod localrouter;
pub mod nfs;
pub mod power;
pub mod sim;
pub mod vpcrouter;

#[cfg(test)]
mod fake;

pub use api::{
    Bootable, ConnectedSwitch, LocalRouter, LocalRouterApi, LocalRouterInterface,
    LocalRouterPeer, LocalRouterStaticRoute, LocalRouterSwitch, Nfs, NfsApi, NfsPlan, Sim,
    SimApi, SimNetworkOperatorConfig, VpcRouter, VpcRouterApi, VpcRouterPlan, VpcRouterSettings,
};
pub use error::{BuilderError, Result};
pub use localrouter::LocalRouterBuilder;
pub use nfs::NfsBuilder;
pub use power::{boot_and_wait, shutdown_and_wait};
pub use sim::SimBuilder;
pub use vpcrouter::{
    AdditionalNicSetting, AdditionalPremiumNic, AdditionalStandardNic, NicSetting,
    PremiumNicSetting, RouterSetting, VpcRouterBuilder,
};
