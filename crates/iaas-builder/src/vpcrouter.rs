//! VPC router builder
//!
//! Creation runs through `RetryableSetup`: the router is created with its
//! primary NIC only, then the provisioning hook wires additional NICs,
//! applies the full settings, commits them and optionally boots the router.
//!
//! Updating an existing router reconciles its NICs. Changing, removing or
//! adding a private NIC requires the router to be powered off, so a running
//! router is shut down and booted again around the change. Settings-only
//! changes are applied live.

use crate::api::{
    ConnectedSwitch, DhcpServer, PortForwarding, StaticNat, StaticRoute, VpcRouter,
    VpcRouterApi, VpcRouterCreateRequest, VpcRouterInterfaceSetting, VpcRouterPlan,
    VpcRouterSettings, VpcRouterUpdateRequest, VpcRouterUpdateSettingsRequest,
};
use crate::error::{BuilderError, Result};
use crate::power;
use iaas_setup::{CancellationToken, IaasError, ResourceId, RetryableSetup, SetupOptions};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Highest NIC index a VPC router offers for private switches
pub const MAX_NIC_INDEX: u32 = 7;

/// Primary (index 0) NIC
#[derive(Debug, Clone, Default, PartialEq)]
pub enum NicSetting {
    /// Shared internet segment, addressed by the platform
    #[default]
    Standard,
    /// Router+switch with a redundant address pair and a virtual IP
    Premium(PremiumNicSetting),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PremiumNicSetting {
    pub switch_id: ResourceId,
    pub ip_address1: String,
    pub ip_address2: String,
    pub virtual_ip_address: String,
    pub ip_aliases: Vec<String>,
}

impl NicSetting {
    fn connected_switch(&self) -> ConnectedSwitch {
        match self {
            NicSetting::Standard => ConnectedSwitch::Shared,
            NicSetting::Premium(nic) => ConnectedSwitch::Switch(nic.switch_id),
        }
    }

    fn ip_addresses(&self) -> Vec<String> {
        match self {
            NicSetting::Standard => Vec::new(),
            NicSetting::Premium(nic) => vec![nic.ip_address1.clone(), nic.ip_address2.clone()],
        }
    }

    fn interface_setting(&self) -> Option<VpcRouterInterfaceSetting> {
        match self {
            NicSetting::Standard => None,
            NicSetting::Premium(nic) => Some(VpcRouterInterfaceSetting {
                index: 0,
                ip_addresses: vec![nic.ip_address1.clone(), nic.ip_address2.clone()],
                virtual_ip_address: Some(nic.virtual_ip_address.clone()),
                ip_aliases: nic.ip_aliases.clone(),
                network_mask_len: None,
            }),
        }
    }
}

/// NIC connected to a private switch (index 1..=7)
#[derive(Debug, Clone, PartialEq)]
pub enum AdditionalNicSetting {
    Standard(AdditionalStandardNic),
    Premium(AdditionalPremiumNic),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdditionalStandardNic {
    pub switch_id: ResourceId,
    pub ip_address: String,
    pub network_mask_len: u8,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdditionalPremiumNic {
    pub switch_id: ResourceId,
    pub ip_address1: String,
    pub ip_address2: String,
    pub virtual_ip_address: String,
    pub ip_aliases: Vec<String>,
    pub network_mask_len: u8,
    pub index: u32,
}

impl AdditionalNicSetting {
    pub fn switch_id(&self) -> ResourceId {
        match self {
            AdditionalNicSetting::Standard(nic) => nic.switch_id,
            AdditionalNicSetting::Premium(nic) => nic.switch_id,
        }
    }

    pub fn index(&self) -> u32 {
        match self {
            AdditionalNicSetting::Standard(nic) => nic.index,
            AdditionalNicSetting::Premium(nic) => nic.index,
        }
    }

    fn is_premium(&self) -> bool {
        matches!(self, AdditionalNicSetting::Premium(_))
    }

    fn interface_setting(&self) -> VpcRouterInterfaceSetting {
        match self {
            AdditionalNicSetting::Standard(nic) => VpcRouterInterfaceSetting {
                index: nic.index,
                ip_addresses: vec![nic.ip_address.clone()],
                virtual_ip_address: None,
                ip_aliases: Vec::new(),
                network_mask_len: Some(nic.network_mask_len),
            },
            AdditionalNicSetting::Premium(nic) => VpcRouterInterfaceSetting {
                index: nic.index,
                ip_addresses: vec![nic.ip_address1.clone(), nic.ip_address2.clone()],
                virtual_ip_address: Some(nic.virtual_ip_address.clone()),
                ip_aliases: nic.ip_aliases.clone(),
                network_mask_len: Some(nic.network_mask_len),
            },
        }
    }
}

/// Router functions applied on top of the NIC layout
#[derive(Debug, Clone, PartialEq)]
pub struct RouterSetting {
    pub vrid: u32,
    pub internet_connection_enabled: bool,
    /// Premium plans only
    pub static_nat: Vec<StaticNat>,
    pub port_forwarding: Vec<PortForwarding>,
    pub dhcp_server: Vec<DhcpServer>,
    pub static_route: Vec<StaticRoute>,
    pub syslog_host: String,
}

impl Default for RouterSetting {
    fn default() -> Self {
        Self {
            vrid: 0,
            internet_connection_enabled: true,
            static_nat: Vec::new(),
            port_forwarding: Vec::new(),
            dhcp_server: Vec::new(),
            static_route: Vec::new(),
            syslog_host: String::new(),
        }
    }
}

impl RouterSetting {
    fn into_settings(self, interfaces: Vec<VpcRouterInterfaceSetting>) -> VpcRouterSettings {
        VpcRouterSettings {
            vrid: self.vrid,
            internet_connection_enabled: self.internet_connection_enabled,
            interfaces,
            static_nat: self.static_nat,
            port_forwarding: self.port_forwarding,
            dhcp_server: self.dhcp_server,
            static_route: self.static_route,
            syslog_host: self.syslog_host,
        }
    }
}

/// Builds a new VPC router or reconciles an existing one
pub struct VpcRouterBuilder {
    /// Existing router to update; `None` creates a new one
    pub id: Option<ResourceId>,
    pub zone: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub icon_id: ResourceId,
    pub plan: VpcRouterPlan,
    pub version: u32,
    pub nic_setting: NicSetting,
    pub additional_nic_settings: Vec<AdditionalNicSetting>,
    pub router_setting: Option<RouterSetting>,
    /// Return right after the create call without waiting or provisioning
    pub no_wait: bool,
    pub setup_options: SetupOptions,
    client: Arc<dyn VpcRouterApi>,
}

impl VpcRouterBuilder {
    pub fn new(client: Arc<dyn VpcRouterApi>, zone: impl Into<String>) -> Self {
        Self {
            id: None,
            zone: zone.into(),
            name: String::new(),
            description: String::new(),
            tags: Vec::new(),
            icon_id: ResourceId::EMPTY,
            plan: VpcRouterPlan::Standard,
            version: 2,
            nic_setting: NicSetting::Standard,
            additional_nic_settings: Vec::new(),
            router_setting: None,
            no_wait: false,
            setup_options: SetupOptions::default(),
            client,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(BuilderError::validation("name is required"));
        }

        let mut indexes = HashSet::new();
        for (i, nic) in self.additional_nic_settings.iter().enumerate() {
            if nic.switch_id().is_empty() {
                return Err(BuilderError::validation(format!(
                    "additional_nic_settings[{}]: switch_id is empty",
                    i
                )));
            }
            if nic.index() == 0 || nic.index() > MAX_NIC_INDEX {
                return Err(BuilderError::validation(format!(
                    "additional_nic_settings[{}]: index must be between 1 and {}",
                    i, MAX_NIC_INDEX
                )));
            }
            if !indexes.insert(nic.index()) {
                return Err(BuilderError::validation(format!(
                    "additional_nic_settings[{}]: index {} is used more than once",
                    i,
                    nic.index()
                )));
            }
        }

        if self.no_wait {
            if !self.additional_nic_settings.is_empty() || self.router_setting.is_some() {
                return Err(BuilderError::validation(
                    "no_wait is not supported with additional NICs or router settings",
                ));
            }
            if self.setup_options.boot_after_build {
                return Err(BuilderError::validation(
                    "no_wait is not supported with boot_after_build",
                ));
            }
        }

        if self.plan.is_standard() {
            self.validate_for_standard()
        } else {
            self.validate_for_premium()
        }
    }

    fn validate_for_standard(&self) -> Result<()> {
        if !matches!(self.nic_setting, NicSetting::Standard) {
            return Err(BuilderError::validation(
                "standard plan requires a standard NIC setting",
            ));
        }
        if let Some(i) = self.additional_nic_settings.iter().position(|n| n.is_premium()) {
            return Err(BuilderError::validation(format!(
                "additional_nic_settings[{}]: standard plan requires standard NIC settings",
                i
            )));
        }
        if self
            .router_setting
            .as_ref()
            .is_some_and(|s| !s.static_nat.is_empty())
        {
            return Err(BuilderError::validation(
                "static NAT is only available on premium plans",
            ));
        }
        Ok(())
    }

    fn validate_for_premium(&self) -> Result<()> {
        if !matches!(self.nic_setting, NicSetting::Premium(_)) {
            return Err(BuilderError::validation(format!(
                "{} plan requires a premium NIC setting",
                self.plan
            )));
        }
        if let Some(i) = self.additional_nic_settings.iter().position(|n| !n.is_premium()) {
            return Err(BuilderError::validation(format!(
                "additional_nic_settings[{}]: {} plan requires premium NIC settings",
                i, self.plan
            )));
        }
        Ok(())
    }

    /// Create the router, or update it when `id` is set
    pub async fn build(&self, cancel: &CancellationToken) -> Result<VpcRouter> {
        match self.id {
            Some(id) if !id.is_empty() => self.update(cancel, id).await,
            _ => self.create(cancel).await,
        }
    }

    async fn create(&self, cancel: &CancellationToken) -> Result<VpcRouter> {
        self.validate()?;

        // the provisioning hook is not idempotent (NIC connects)
        let options = SetupOptions {
            provisioning_retry_count: 1,
            ..self.setup_options.clone()
        };

        let create_client = self.client.clone();
        let read_client = self.client.clone();
        let delete_client = self.client.clone();
        let request = self.create_request();

        let mut setup = RetryableSetup::new()
            .create(move |zone: String| {
                let client = create_client.clone();
                let request = request.clone();
                async move { client.create(&zone, &request).await }
            })
            .read(move |zone: String, id: ResourceId| {
                let client = read_client.clone();
                async move { client.read(&zone, id).await }
            })
            .delete(move |zone: String, id: ResourceId| {
                let client = delete_client.clone();
                async move { client.delete(&zone, id).await }
            })
            .wait_for_copy(!self.no_wait)
            .wait_for_up(!self.no_wait && options.boot_after_build)
            .options(options.clone());

        if !self.no_wait {
            let provisioner = Arc::new(Provisioner {
                client: self.client.clone(),
                additional_nics: self.additional_nic_settings.clone(),
                settings: self.full_settings(),
                options,
                cancel: cancel.clone(),
            });
            setup = setup.provision_before_up(move |zone: String, id, created: VpcRouter| {
                let provisioner = provisioner.clone();
                async move { provisioner.run(&zone, id, created).await }
            });
        }

        let router = setup.setup(cancel, &self.zone).await?;
        let id = router.id;
        tracing::info!("VPC router {} ({}) created", self.name, id);

        self.client
            .read(&self.zone, id)
            .await
            .map_err(|e| BuilderError::incomplete(id, e))
    }

    async fn update(&self, cancel: &CancellationToken, id: ResourceId) -> Result<VpcRouter> {
        self.validate()?;

        let current = self.client.read(&self.zone, id).await?;
        let needs_shutdown = self.needs_shutdown(&current)?;

        let mut needs_restart = false;
        if current.instance_status.is_up() && needs_shutdown {
            if self.no_wait {
                return Err(BuilderError::Unsupported(
                    "no_wait is not available because the router has to be shut down".to_string(),
                ));
            }
            tracing::info!("Shutting down VPC router {} to change its NICs", id);
            power::shutdown_and_wait(
                self.client.clone(),
                &self.zone,
                id,
                false,
                &self.setup_options,
                cancel,
            )
            .await?;
            needs_restart = true;
        }

        let mut rewired = false;

        // changed or removed NICs
        for iface in current.additional_interfaces() {
            let desired = self.additional_switch_by_index(iface.index);
            if iface.switch_id == desired {
                continue;
            }
            tracing::debug!(
                "Disconnecting NIC {} of VPC router {} from switch {}",
                iface.index,
                id,
                iface.switch_id
            );
            self.client
                .disconnect_from_switch(&self.zone, id, iface.index)
                .await?;
            if !desired.is_empty() {
                self.client
                    .connect_to_switch(&self.zone, id, iface.index, desired)
                    .await?;
            }
            rewired = true;
        }

        // added NICs
        for nic in &self.additional_nic_settings {
            if current.interface(nic.index()).is_none() {
                tracing::debug!(
                    "Connecting NIC {} of VPC router {} to switch {}",
                    nic.index(),
                    id,
                    nic.switch_id()
                );
                self.client
                    .connect_to_switch(&self.zone, id, nic.index(), nic.switch_id())
                    .await?;
                rewired = true;
            }
        }

        if rewired {
            sleep_or_cancel(cancel, self.setup_options.nic_update_wait_duration).await?;
        }

        self.client
            .update(
                &self.zone,
                id,
                &VpcRouterUpdateRequest {
                    name: self.name.clone(),
                    description: self.description.clone(),
                    tags: self.tags.clone(),
                    icon_id: self.icon_id,
                    settings: self.full_settings(),
                    settings_hash: current.settings_hash.clone(),
                },
            )
            .await?;
        self.client.config(&self.zone, id).await?;

        if needs_restart {
            tracing::info!("Booting VPC router {} after NIC changes", id);
            power::boot_and_wait(
                self.client.clone(),
                &self.zone,
                id,
                &self.setup_options,
                cancel,
            )
            .await?;
        }

        Ok(self.client.read(&self.zone, id).await?)
    }

    /// Whether applying this builder to `current` requires a power cycle.
    ///
    /// Plan changes are rejected.
    pub fn needs_shutdown(&self, current: &VpcRouter) -> Result<bool> {
        if current.plan != self.plan {
            return Err(BuilderError::Unsupported(format!(
                "changing the plan of a VPC router is not allowed (current plan: {})",
                current.plan
            )));
        }

        let changed = current
            .additional_interfaces()
            .any(|iface| iface.switch_id != self.additional_switch_by_index(iface.index));
        if changed {
            return Ok(true);
        }

        Ok(current.additional_interfaces().count() != self.additional_nic_settings.len())
    }

    fn additional_switch_by_index(&self, index: u32) -> ResourceId {
        self.additional_nic_settings
            .iter()
            .find(|nic| nic.index() == index)
            .map(|nic| nic.switch_id())
            .unwrap_or(ResourceId::EMPTY)
    }

    fn create_request(&self) -> VpcRouterCreateRequest {
        let setting = self.router_setting.clone().unwrap_or_default();
        let initial = RouterSetting {
            vrid: setting.vrid,
            internet_connection_enabled: setting.internet_connection_enabled,
            syslog_host: setting.syslog_host,
            ..RouterSetting::default()
        };

        VpcRouterCreateRequest {
            name: self.name.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            icon_id: self.icon_id,
            plan: self.plan,
            switch: self.nic_setting.connected_switch(),
            ip_addresses: self.nic_setting.ip_addresses(),
            version: self.version,
            settings: initial.into_settings(self.nic_setting.interface_setting().into_iter().collect()),
        }
    }

    fn full_settings(&self) -> VpcRouterSettings {
        let interfaces = self
            .nic_setting
            .interface_setting()
            .into_iter()
            .chain(
                self.additional_nic_settings
                    .iter()
                    .map(AdditionalNicSetting::interface_setting),
            )
            .collect();

        self.router_setting
            .clone()
            .unwrap_or_default()
            .into_settings(interfaces)
    }
}

/// Provisioning hook state shared with `RetryableSetup`
struct Provisioner {
    client: Arc<dyn VpcRouterApi>,
    additional_nics: Vec<AdditionalNicSetting>,
    settings: VpcRouterSettings,
    options: SetupOptions,
    cancel: CancellationToken,
}

impl Provisioner {
    async fn run(&self, zone: &str, id: ResourceId, created: VpcRouter) -> iaas_setup::Result<()> {
        for nic in &self.additional_nics {
            tracing::debug!(
                "Connecting NIC {} of VPC router {} to switch {}",
                nic.index(),
                id,
                nic.switch_id()
            );
            self.client
                .connect_to_switch(zone, id, nic.index(), nic.switch_id())
                .await?;
        }

        // settings referring to a just-connected NIC are rejected for a few seconds
        if !self.additional_nics.is_empty() {
            sleep_or_cancel(&self.cancel, self.options.nic_update_wait_duration).await?;
        }

        self.client
            .update_settings(
                zone,
                id,
                &VpcRouterUpdateSettingsRequest {
                    settings: self.settings.clone(),
                    settings_hash: created.settings_hash,
                },
            )
            .await?;
        self.client.config(zone, id).await?;

        if self.options.boot_after_build {
            power::boot_and_wait(self.client.clone(), zone, id, &self.options, &self.cancel)
                .await?;
        }
        Ok(())
    }
}

async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> iaas_setup::Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(IaasError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
