//! In-memory API doubles for builder tests

use crate::api::*;
use async_trait::async_trait;
use iaas_setup::{Availability, IaasError, InstanceStatus, ResourceId, Result};
use std::sync::{Arc, Mutex};

fn api_error(msg: &str) -> IaasError {
    IaasError::ApiError(msg.to_string())
}

pub fn router_fixture(status: InstanceStatus) -> VpcRouter {
    VpcRouter {
        id: ResourceId(1001),
        name: "router".to_string(),
        plan: VpcRouterPlan::Standard,
        version: 2,
        availability: Availability::Available,
        instance_status: status,
        interfaces: vec![VpcRouterInterface {
            index: 0,
            switch_id: ResourceId::EMPTY,
        }],
        settings_hash: "hash-1".to_string(),
        ..VpcRouter::default()
    }
}

// ---------------------------------------------------------------------------
// VPC router
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RouterInner {
    router: Option<VpcRouter>,
    calls: Vec<String>,
    last_create: Option<VpcRouterCreateRequest>,
    fail_boot: bool,
    fail_update_settings: bool,
}

/// Single-router fake. A created router reports `Migrating` on its first
/// read and `Available` afterwards.
#[derive(Default)]
pub struct FakeVpcRouterApi {
    inner: Mutex<RouterInner>,
}

impl FakeVpcRouterApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_router(router: VpcRouter) -> Arc<Self> {
        let api = Self::default();
        api.lock().router = Some(router);
        Arc::new(api)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RouterInner> {
        self.inner.lock().unwrap()
    }

    pub fn fail_boot(&self) {
        self.lock().fail_boot = true;
    }

    pub fn fail_update_settings(&self) {
        self.lock().fail_update_settings = true;
    }

    /// Every call except reads
    pub fn mutating_calls(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|c| *c != "read")
            .cloned()
            .collect()
    }

    pub fn power_calls(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|c| *c == "boot" || *c == "shutdown")
            .cloned()
            .collect()
    }

    pub fn last_create_request(&self) -> Option<VpcRouterCreateRequest> {
        self.lock().last_create.clone()
    }

    fn with_existing<T>(
        &self,
        call: String,
        id: ResourceId,
        f: impl FnOnce(&mut VpcRouter) -> Result<T>,
    ) -> Result<T> {
        let mut inner = self.lock();
        inner.calls.push(call);
        match inner.router.as_mut() {
            Some(router) if router.id == id => f(router),
            _ => Err(IaasError::ResourceNotFound(id.to_string())),
        }
    }
}

fn check_hash(router: &mut VpcRouter, hash: &str) -> Result<()> {
    if router.settings_hash != hash {
        return Err(api_error("settings hash mismatch"));
    }
    router.settings_hash = format!("{}+", hash);
    Ok(())
}

#[async_trait]
impl Bootable for FakeVpcRouterApi {
    type Target = VpcRouter;

    async fn read(&self, _zone: &str, id: ResourceId) -> Result<VpcRouter> {
        self.with_existing("read".to_string(), id, |router| {
            let snapshot = router.clone();
            if router.availability == Availability::Migrating {
                router.availability = Availability::Available;
            }
            Ok(snapshot)
        })
    }

    async fn boot(&self, _zone: &str, id: ResourceId) -> Result<()> {
        let fail = self.lock().fail_boot;
        self.with_existing("boot".to_string(), id, |router| {
            if fail {
                return Err(api_error("boot rejected"));
            }
            router.instance_status = InstanceStatus::Up;
            Ok(())
        })
    }

    async fn shutdown(&self, _zone: &str, id: ResourceId, _force: bool) -> Result<()> {
        self.with_existing("shutdown".to_string(), id, |router| {
            router.instance_status = InstanceStatus::Down;
            Ok(())
        })
    }
}

#[async_trait]
impl VpcRouterApi for FakeVpcRouterApi {
    async fn create(&self, _zone: &str, req: &VpcRouterCreateRequest) -> Result<VpcRouter> {
        let primary_switch = match req.switch {
            ConnectedSwitch::Shared => ResourceId::EMPTY,
            ConnectedSwitch::Switch(id) => id,
        };
        let router = VpcRouter {
            id: ResourceId(1001),
            name: req.name.clone(),
            description: req.description.clone(),
            tags: req.tags.clone(),
            plan: req.plan,
            version: req.version,
            availability: Availability::Migrating,
            instance_status: InstanceStatus::Down,
            interfaces: vec![VpcRouterInterface {
                index: 0,
                switch_id: primary_switch,
            }],
            settings: req.settings.clone(),
            settings_hash: "hash-1".to_string(),
        };

        let mut inner = self.lock();
        inner.calls.push("create".to_string());
        inner.last_create = Some(req.clone());
        inner.router = Some(router.clone());
        Ok(router)
    }

    async fn update(
        &self,
        _zone: &str,
        id: ResourceId,
        req: &VpcRouterUpdateRequest,
    ) -> Result<VpcRouter> {
        self.with_existing("update".to_string(), id, |router| {
            check_hash(router, &req.settings_hash)?;
            router.name = req.name.clone();
            router.description = req.description.clone();
            router.tags = req.tags.clone();
            router.settings = req.settings.clone();
            Ok(router.clone())
        })
    }

    async fn update_settings(
        &self,
        _zone: &str,
        id: ResourceId,
        req: &VpcRouterUpdateSettingsRequest,
    ) -> Result<VpcRouter> {
        let fail = self.lock().fail_update_settings;
        self.with_existing("update_settings".to_string(), id, |router| {
            if fail {
                return Err(api_error("interface is not ready"));
            }
            check_hash(router, &req.settings_hash)?;
            router.settings = req.settings.clone();
            Ok(router.clone())
        })
    }

    async fn delete(&self, _zone: &str, id: ResourceId) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push("delete".to_string());
        if inner.router.as_ref().is_some_and(|r| r.id == id) {
            inner.router = None;
        }
        Ok(())
    }

    async fn config(&self, _zone: &str, id: ResourceId) -> Result<()> {
        self.with_existing("config".to_string(), id, |_| Ok(()))
    }

    async fn connect_to_switch(
        &self,
        _zone: &str,
        id: ResourceId,
        nic_index: u32,
        switch_id: ResourceId,
    ) -> Result<()> {
        self.with_existing(format!("connect {} {}", nic_index, switch_id), id, |router| {
            if router.interface(nic_index).is_some() {
                return Err(api_error("NIC is already connected"));
            }
            router.interfaces.push(VpcRouterInterface {
                index: nic_index,
                switch_id,
            });
            Ok(())
        })
    }

    async fn disconnect_from_switch(
        &self,
        _zone: &str,
        id: ResourceId,
        nic_index: u32,
    ) -> Result<()> {
        self.with_existing(format!("disconnect {}", nic_index), id, |router| {
            router.interfaces.retain(|i| i.index != nic_index);
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// NFS
// ---------------------------------------------------------------------------

#[derive(Default)]
struct NfsInner {
    appliances: Vec<Nfs>,
    copy_fails: Vec<bool>,
    created: usize,
    deleted: Vec<ResourceId>,
}

/// NFS fake: `copy_fails[n]` decides whether the n-th created appliance
/// ends its copy in `Failed`. A successful copy boots on the next read.
pub struct FakeNfsApi {
    inner: Mutex<NfsInner>,
}

impl FakeNfsApi {
    pub fn new(copy_fails: Vec<bool>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(NfsInner {
                copy_fails,
                ..NfsInner::default()
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NfsInner> {
        self.inner.lock().unwrap()
    }

    pub fn created(&self) -> usize {
        self.lock().created
    }

    pub fn deleted(&self) -> Vec<ResourceId> {
        self.lock().deleted.clone()
    }
}

#[async_trait]
impl Bootable for FakeNfsApi {
    type Target = Nfs;

    async fn read(&self, _zone: &str, id: ResourceId) -> Result<Nfs> {
        let mut inner = self.lock();
        let index = (id.0 as usize).saturating_sub(1);
        let fails = inner.copy_fails.get(index).copied().unwrap_or(false);
        let nfs = inner
            .appliances
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| IaasError::ResourceNotFound(id.to_string()))?;

        let snapshot = nfs.clone();
        match (nfs.availability, nfs.instance_status) {
            (Availability::Migrating, _) if fails => nfs.availability = Availability::Failed,
            (Availability::Migrating, _) => nfs.availability = Availability::Available,
            (Availability::Available, InstanceStatus::Down) => {
                nfs.instance_status = InstanceStatus::Up
            }
            _ => {}
        }
        Ok(snapshot)
    }

    async fn boot(&self, _zone: &str, _id: ResourceId) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self, _zone: &str, _id: ResourceId, _force: bool) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl NfsApi for FakeNfsApi {
    async fn create(&self, _zone: &str, req: &NfsCreateRequest) -> Result<Nfs> {
        let mut inner = self.lock();
        inner.created += 1;
        let nfs = Nfs {
            id: ResourceId(inner.created as u64),
            name: req.name.clone(),
            description: req.description.clone(),
            tags: req.tags.clone(),
            plan: req.plan,
            size_gb: req.size_gb,
            switch_id: req.switch_id,
            ip_addresses: req.ip_addresses.clone(),
            network_mask_len: req.network_mask_len,
            default_route: req.default_route.clone(),
            availability: Availability::Migrating,
            instance_status: InstanceStatus::Down,
        };
        inner.appliances.push(nfs.clone());
        Ok(nfs)
    }

    async fn update(&self, _zone: &str, id: ResourceId, req: &NfsUpdateRequest) -> Result<Nfs> {
        let mut inner = self.lock();
        let nfs = inner
            .appliances
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| IaasError::ResourceNotFound(id.to_string()))?;
        nfs.name = req.name.clone();
        nfs.description = req.description.clone();
        nfs.tags = req.tags.clone();
        Ok(nfs.clone())
    }

    async fn delete(&self, _zone: &str, id: ResourceId) -> Result<()> {
        let mut inner = self.lock();
        inner.appliances.retain(|n| n.id != id);
        inner.deleted.push(id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SIM
// ---------------------------------------------------------------------------

struct SimInner {
    sim: Sim,
    calls: Vec<String>,
    fail_activate: bool,
    omit_info_from_update: bool,
}

/// Holds a single SIM with id 1
pub struct FakeSimApi {
    inner: Mutex<SimInner>,
}

impl FakeSimApi {
    pub fn new(info: SimInfo) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(SimInner {
                sim: Sim {
                    id: ResourceId(1),
                    info,
                    ..Sim::default()
                },
                calls: Vec::new(),
                fail_activate: false,
                omit_info_from_update: false,
            }),
        })
    }

    fn record(&self, call: &str) -> std::sync::MutexGuard<'_, SimInner> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(call.to_string());
        inner
    }

    pub fn fail_activate(&self) {
        self.inner.lock().unwrap().fail_activate = true;
    }

    /// Answer `update` with an empty `info`, as the live API does
    pub fn omit_info_from_update(&self) {
        self.inner.lock().unwrap().omit_info_from_update = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl SimApi for FakeSimApi {
    async fn create(&self, req: &SimCreateRequest) -> Result<Sim> {
        let mut inner = self.record("create");
        inner.sim = Sim {
            id: ResourceId(1),
            name: req.name.clone(),
            description: req.description.clone(),
            tags: req.tags.clone(),
            iccid: req.iccid.clone(),
            info: SimInfo::default(),
        };
        Ok(inner.sim.clone())
    }

    async fn read(&self, _id: ResourceId) -> Result<Sim> {
        Ok(self.record("read").sim.clone())
    }

    async fn update(&self, _id: ResourceId, req: &SimUpdateRequest) -> Result<Sim> {
        let mut inner = self.record("update");
        inner.sim.name = req.name.clone();
        inner.sim.description = req.description.clone();
        inner.sim.tags = req.tags.clone();
        let mut sim = inner.sim.clone();
        if inner.omit_info_from_update {
            sim.info = SimInfo::default();
        }
        Ok(sim)
    }

    async fn set_network_operator(
        &self,
        _id: ResourceId,
        _configs: &[SimNetworkOperatorConfig],
    ) -> Result<()> {
        let _inner = self.record("set_network_operator");
        Ok(())
    }

    async fn activate(&self, _id: ResourceId) -> Result<()> {
        let mut inner = self.record("activate");
        if inner.fail_activate {
            return Err(api_error("activation rejected"));
        }
        inner.sim.info.activated = true;
        Ok(())
    }

    async fn deactivate(&self, _id: ResourceId) -> Result<()> {
        self.record("deactivate").sim.info.activated = false;
        Ok(())
    }

    async fn imei_lock(&self, _id: ResourceId, imei: &str) -> Result<()> {
        let mut inner = self.record("imei_lock");
        inner.sim.info.imei_lock = true;
        inner.sim.info.imei = imei.to_string();
        Ok(())
    }

    async fn imei_unlock(&self, _id: ResourceId) -> Result<()> {
        let mut inner = self.record("imei_unlock");
        inner.sim.info.imei_lock = false;
        inner.sim.info.imei.clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Local router
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LocalRouterInner {
    router: Option<LocalRouter>,
    calls: Vec<String>,
    settings_requests: Vec<LocalRouterUpdateSettingsRequest>,
    hash_seq: u32,
    fail_update_settings: bool,
}

/// Holds at most one local router, created with id 1. Every settings
/// change issues a new hash; an empty hash in a request skips the check.
#[derive(Default)]
pub struct FakeLocalRouterApi {
    inner: Mutex<LocalRouterInner>,
}

impl FakeLocalRouterApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_router(router: LocalRouter) -> Arc<Self> {
        let api = Self::default();
        api.lock().router = Some(router);
        Arc::new(api)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LocalRouterInner> {
        self.inner.lock().unwrap()
    }

    pub fn fail_update_settings(&self) {
        self.lock().fail_update_settings = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn settings_requests(&self) -> Vec<LocalRouterUpdateSettingsRequest> {
        self.lock().settings_requests.clone()
    }

    fn with_existing<T>(
        &self,
        call: &str,
        id: ResourceId,
        f: impl FnOnce(&mut LocalRouterInner) -> Result<T>,
    ) -> Result<T> {
        let mut inner = self.lock();
        inner.calls.push(call.to_string());
        if !inner.router.as_ref().is_some_and(|r| r.id == id) {
            return Err(IaasError::ResourceNotFound(id.to_string()));
        }
        f(&mut *inner)
    }
}

fn apply_settings(
    inner: &mut LocalRouterInner,
    req: &LocalRouterUpdateSettingsRequest,
) -> Result<LocalRouter> {
    let stored = inner.router.as_ref().map(|r| r.settings_hash.clone());
    if !req.settings_hash.is_empty() && stored.as_deref() != Some(req.settings_hash.as_str()) {
        return Err(api_error("settings hash mismatch"));
    }
    inner.hash_seq += 1;
    let hash = format!("hash-{}", inner.hash_seq);
    let router = inner
        .router
        .as_mut()
        .ok_or_else(|| IaasError::ResourceNotFound("local router".to_string()))?;
    router.switch = req.switch.clone();
    router.interface = req.interface.clone();
    router.peers = req.peers.clone();
    router.static_routes = req.static_routes.clone();
    router.settings_hash = hash;
    Ok(router.clone())
}

#[async_trait]
impl LocalRouterApi for FakeLocalRouterApi {
    async fn create(&self, req: &LocalRouterCreateRequest) -> Result<LocalRouter> {
        let mut inner = self.lock();
        inner.calls.push("create".to_string());
        let router = LocalRouter {
            id: ResourceId(1),
            name: req.name.clone(),
            description: req.description.clone(),
            tags: req.tags.clone(),
            ..LocalRouter::default()
        };
        inner.router = Some(router.clone());
        Ok(router)
    }

    async fn read(&self, id: ResourceId) -> Result<LocalRouter> {
        self.with_existing("read", id, |inner| {
            inner
                .router
                .clone()
                .ok_or_else(|| IaasError::ResourceNotFound(id.to_string()))
        })
    }

    async fn update(
        &self,
        id: ResourceId,
        req: &LocalRouterUpdateRequest,
    ) -> Result<LocalRouter> {
        self.with_existing("update", id, |inner| {
            let settings = LocalRouterUpdateSettingsRequest {
                switch: req.switch.clone(),
                interface: req.interface.clone(),
                peers: req.peers.clone(),
                static_routes: req.static_routes.clone(),
                settings_hash: req.settings_hash.clone(),
            };
            apply_settings(inner, &settings)?;
            let router = inner
                .router
                .as_mut()
                .ok_or_else(|| IaasError::ResourceNotFound(id.to_string()))?;
            router.name = req.name.clone();
            router.description = req.description.clone();
            router.tags = req.tags.clone();
            Ok(router.clone())
        })
    }

    async fn update_settings(
        &self,
        id: ResourceId,
        req: &LocalRouterUpdateSettingsRequest,
    ) -> Result<LocalRouter> {
        self.with_existing("update_settings", id, |inner| {
            inner.settings_requests.push(req.clone());
            if inner.fail_update_settings {
                return Err(api_error("settings rejected"));
            }
            apply_settings(inner, req)
        })
    }
}
