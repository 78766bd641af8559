//! SIM builder
//!
//! SIMs are global resources configured through several independent calls.
//! There is nothing to poll, so the builder runs the calls in order and
//! reports the SIM id when a call after the create fails.

use crate::api::{Sim, SimApi, SimCreateRequest, SimNetworkOperatorConfig, SimUpdateRequest};
use crate::error::{BuilderError, Result};
use iaas_setup::ResourceId;
use std::sync::Arc;

const IMEI_LEN: usize = 15;

pub struct SimBuilder {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub icon_id: ResourceId,
    pub iccid: String,
    pub pass_code: String,
    pub activate: bool,
    /// Lock the SIM to this device; empty leaves it unlocked
    pub imei: String,
    pub carriers: Vec<SimNetworkOperatorConfig>,
    client: Arc<dyn SimApi>,
}

impl SimBuilder {
    pub fn new(client: Arc<dyn SimApi>) -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            tags: Vec::new(),
            icon_id: ResourceId::EMPTY,
            iccid: String::new(),
            pass_code: String::new(),
            activate: false,
            imei: String::new(),
            carriers: Vec::new(),
            client,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.iccid.is_empty() {
            return Err(BuilderError::validation("iccid is required"));
        }
        if self.carriers.is_empty() {
            return Err(BuilderError::validation("at least one carrier is required"));
        }
        if !self.imei.is_empty()
            && (self.imei.len() != IMEI_LEN || !self.imei.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(BuilderError::validation(format!(
                "imei must be {} digits",
                IMEI_LEN
            )));
        }
        Ok(())
    }

    pub async fn build(&self) -> Result<Sim> {
        self.validate()?;

        let sim = self
            .client
            .create(&SimCreateRequest {
                name: self.name.clone(),
                description: self.description.clone(),
                tags: self.tags.clone(),
                icon_id: self.icon_id,
                iccid: self.iccid.clone(),
                pass_code: self.pass_code.clone(),
            })
            .await?;
        let id = sim.id;
        tracing::info!("SIM {} ({}) registered", self.name, id);

        self.configure_created(id)
            .await
            .map_err(|e| BuilderError::incomplete(id, e))
    }

    async fn configure_created(&self, id: ResourceId) -> iaas_setup::Result<Sim> {
        self.client.set_network_operator(id, &self.carriers).await?;
        if self.activate {
            self.client.activate(id).await?;
        }
        if !self.imei.is_empty() {
            self.client.imei_lock(id, &self.imei).await?;
        }
        self.client.read(id).await
    }

    /// Bring an existing SIM in line with the builder
    pub async fn update(&self, id: ResourceId) -> Result<Sim> {
        self.validate()?;

        // the update response does not carry activation or IMEI state
        let current = self.client.read(id).await?.info;

        self.client
            .update(
                id,
                &SimUpdateRequest {
                    name: self.name.clone(),
                    description: self.description.clone(),
                    tags: self.tags.clone(),
                    icon_id: self.icon_id,
                },
            )
            .await?;

        self.client.set_network_operator(id, &self.carriers).await?;

        match (self.activate, current.activated) {
            (false, true) => self.client.deactivate(id).await?,
            (true, false) => self.client.activate(id).await?,
            _ => {}
        }

        // unlock when the lock is being removed or moved to another device
        let imei_changed = self.imei != current.imei;
        if current.imei_lock && (self.imei.is_empty() || imei_changed) {
            tracing::debug!("Unlocking IMEI of SIM {}", id);
            self.client.imei_unlock(id).await?;
        }
        if !self.imei.is_empty() && imei_changed {
            tracing::debug!("Locking SIM {} to IMEI {}", id, self.imei);
            self.client.imei_lock(id, &self.imei).await?;
        }

        Ok(self.client.read(id).await?)
    }
}
