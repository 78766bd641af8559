//! Local router builder
//!
//! Local routers are global resources. Settings go through two
//! hash-guarded calls after the create: network settings first, then the
//! peers on top of what the router reports back.

use crate::api::{
    LocalRouter, LocalRouterApi, LocalRouterCreateRequest, LocalRouterInterface, LocalRouterPeer,
    LocalRouterStaticRoute, LocalRouterSwitch, LocalRouterUpdateRequest,
    LocalRouterUpdateSettingsRequest,
};
use crate::error::{BuilderError, Result};
use iaas_setup::ResourceId;
use std::sync::Arc;

const MAX_DESCRIPTION_LEN: usize = 512;

pub struct LocalRouterBuilder {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub icon_id: ResourceId,
    pub switch: Option<LocalRouterSwitch>,
    pub interface: Option<LocalRouterInterface>,
    pub peers: Vec<LocalRouterPeer>,
    pub static_routes: Vec<LocalRouterStaticRoute>,
    /// Hash of the settings this builder was derived from; empty on create
    pub settings_hash: String,
    client: Arc<dyn LocalRouterApi>,
}

impl LocalRouterBuilder {
    pub fn new(client: Arc<dyn LocalRouterApi>) -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            tags: Vec::new(),
            icon_id: ResourceId::EMPTY,
            switch: None,
            interface: None,
            peers: Vec::new(),
            static_routes: Vec::new(),
            settings_hash: String::new(),
            client,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(BuilderError::validation("name is required"));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(BuilderError::validation(format!(
                "description must be at most {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }
        if self.switch.is_some() != self.interface.is_some() {
            return Err(BuilderError::validation(
                "switch and interface must be set together",
            ));
        }
        Ok(())
    }

    /// Switch and interface are complete enough to be applied
    fn has_network_settings(&self) -> bool {
        match (&self.switch, &self.interface) {
            (Some(switch), Some(interface)) => {
                !switch.code.is_empty()
                    && interface.network_mask_len > 0
                    && !interface.virtual_ip_address.is_empty()
                    && !interface.ip_addresses.is_empty()
            }
            _ => false,
        }
    }

    pub async fn build(&self) -> Result<LocalRouter> {
        self.validate()?;

        let router = self
            .client
            .create(&LocalRouterCreateRequest {
                name: self.name.clone(),
                description: self.description.clone(),
                tags: self.tags.clone(),
                icon_id: self.icon_id,
            })
            .await?;
        let id = router.id;
        tracing::info!("Local router {} ({}) created", self.name, id);

        self.configure_created(router)
            .await
            .map_err(|e| BuilderError::incomplete(id, e))
    }

    async fn configure_created(&self, router: LocalRouter) -> iaas_setup::Result<LocalRouter> {
        if !self.has_network_settings() {
            return Ok(router);
        }

        let router = self
            .client
            .update_settings(
                router.id,
                &LocalRouterUpdateSettingsRequest {
                    switch: self.switch.clone(),
                    interface: self.interface.clone(),
                    peers: Vec::new(),
                    static_routes: self.static_routes.clone(),
                    settings_hash: self.settings_hash.clone(),
                },
            )
            .await?;
        tracing::debug!("Network settings applied to local router {}", router.id);

        if self.peers.is_empty() {
            return Ok(router);
        }

        // peers are accepted only once the router is attached to its switch
        let router = self
            .client
            .update_settings(
                router.id,
                &LocalRouterUpdateSettingsRequest {
                    switch: router.switch.clone(),
                    interface: router.interface.clone(),
                    peers: self.peers.clone(),
                    static_routes: router.static_routes.clone(),
                    settings_hash: router.settings_hash.clone(),
                },
            )
            .await?;
        tracing::debug!(
            "{} peer(s) applied to local router {}",
            self.peers.len(),
            router.id
        );
        Ok(router)
    }

    pub async fn update(&self, id: ResourceId) -> Result<LocalRouter> {
        self.validate()?;

        self.client.read(id).await?;

        let router = self
            .client
            .update(
                id,
                &LocalRouterUpdateRequest {
                    name: self.name.clone(),
                    description: self.description.clone(),
                    tags: self.tags.clone(),
                    icon_id: self.icon_id,
                    switch: self.switch.clone(),
                    interface: self.interface.clone(),
                    peers: self.peers.clone(),
                    static_routes: self.static_routes.clone(),
                    settings_hash: self.settings_hash.clone(),
                },
            )
            .await?;
        tracing::debug!("Local router {} updated", id);
        Ok(router)
    }
}
