//! NFS appliance builder

use crate::api::{Nfs, NfsApi, NfsCreateRequest, NfsPlan, NfsUpdateRequest};
use crate::error::{BuilderError, Result};
use iaas_setup::{CancellationToken, ResourceId, RetryableSetup, SetupOptions};
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::sync::Arc;

const NETWORK_MASK_LEN: RangeInclusive<u8> = 8..=29;

/// Builds a new NFS appliance or updates the metadata of an existing one
pub struct NfsBuilder {
    pub id: Option<ResourceId>,
    pub zone: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub icon_id: ResourceId,
    pub plan: NfsPlan,
    pub size_gb: u32,
    pub switch_id: ResourceId,
    pub ip_addresses: Vec<String>,
    pub network_mask_len: u8,
    pub default_route: Option<String>,
    pub no_wait: bool,
    pub setup_options: SetupOptions,
    client: Arc<dyn NfsApi>,
}

impl NfsBuilder {
    pub fn new(client: Arc<dyn NfsApi>, zone: impl Into<String>) -> Self {
        Self {
            id: None,
            zone: zone.into(),
            name: String::new(),
            description: String::new(),
            tags: Vec::new(),
            icon_id: ResourceId::EMPTY,
            plan: NfsPlan::Hdd,
            size_gb: 100,
            switch_id: ResourceId::EMPTY,
            ip_addresses: Vec::new(),
            network_mask_len: 24,
            default_route: None,
            no_wait: false,
            setup_options: SetupOptions::default(),
            client,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(BuilderError::validation("name is required"));
        }
        if self.switch_id.is_empty() {
            return Err(BuilderError::validation("switch_id is required"));
        }
        if self.ip_addresses.is_empty() || self.ip_addresses.len() > 2 {
            return Err(BuilderError::validation(
                "ip_addresses must contain one or two addresses",
            ));
        }
        for ip in &self.ip_addresses {
            parse_ipv4("ip_addresses", ip)?;
        }
        if let Some(route) = &self.default_route {
            parse_ipv4("default_route", route)?;
        }
        if !NETWORK_MASK_LEN.contains(&self.network_mask_len) {
            return Err(BuilderError::validation(format!(
                "network_mask_len must be between {} and {}",
                NETWORK_MASK_LEN.start(),
                NETWORK_MASK_LEN.end()
            )));
        }
        if !self.plan.sizes().contains(&self.size_gb) {
            return Err(BuilderError::validation(format!(
                "size {}GB is not offered for the {:?} plan",
                self.size_gb, self.plan
            )));
        }
        Ok(())
    }

    pub async fn build(&self, cancel: &CancellationToken) -> Result<Nfs> {
        match self.id {
            Some(id) if !id.is_empty() => self.update(id).await,
            _ => self.create(cancel).await,
        }
    }

    async fn create(&self, cancel: &CancellationToken) -> Result<Nfs> {
        self.validate()?;

        let create_client = self.client.clone();
        let read_client = self.client.clone();
        let delete_client = self.client.clone();
        let request = NfsCreateRequest {
            name: self.name.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            icon_id: self.icon_id,
            switch_id: self.switch_id,
            plan: self.plan,
            size_gb: self.size_gb,
            ip_addresses: self.ip_addresses.clone(),
            network_mask_len: self.network_mask_len,
            default_route: self.default_route.clone(),
        };

        let setup = RetryableSetup::new()
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
            .wait_for_up(!self.no_wait)
            .options(self.setup_options.clone());

        let nfs = setup.setup(cancel, &self.zone).await?;
        tracing::info!("NFS {} ({}) created", self.name, nfs.id);
        Ok(nfs)
    }

    async fn update(&self, id: ResourceId) -> Result<Nfs> {
        self.validate()?;

        let current = self.client.read(&self.zone, id).await?;
        if current.plan != self.plan
            || current.size_gb != self.size_gb
            || current.switch_id != self.switch_id
        {
            return Err(BuilderError::Unsupported(format!(
                "plan, size and switch of NFS {} cannot be changed",
                id
            )));
        }

        let updated = self
            .client
            .update(
                &self.zone,
                id,
                &NfsUpdateRequest {
                    name: self.name.clone(),
                    description: self.description.clone(),
                    tags: self.tags.clone(),
                    icon_id: self.icon_id,
                },
            )
            .await?;
        tracing::debug!("NFS {} updated", id);
        Ok(updated)
    }
}

fn parse_ipv4(field: &str, value: &str) -> Result<Ipv4Addr> {
    value.parse::<Ipv4Addr>().map_err(|_| {
        BuilderError::validation(format!("{}: {} is not a valid IPv4 address", field, value))
    })
}
