//! Wrapped IaaS API surface
//!
//! The builders talk to the platform only through these traits; the HTTP
//! client implementing them lives outside this crate.

use async_trait::async_trait;
use iaas_setup::{Availability, InstanceStatus, Resource, ResourceId, Result};
use serde::{Deserialize, Serialize};

/// Power operations shared by bootable appliances
#[async_trait]
pub trait Bootable: Send + Sync + 'static {
    type Target: Resource + Send + 'static;

    async fn read(&self, zone: &str, id: ResourceId) -> Result<Self::Target>;

    async fn boot(&self, zone: &str, id: ResourceId) -> Result<()>;

    async fn shutdown(&self, zone: &str, id: ResourceId, force: bool) -> Result<()>;
}

// ---------------------------------------------------------------------------
// VPC router
// ---------------------------------------------------------------------------

#[async_trait]
pub trait VpcRouterApi: Bootable<Target = VpcRouter> {
    async fn create(&self, zone: &str, req: &VpcRouterCreateRequest) -> Result<VpcRouter>;

    async fn update(
        &self,
        zone: &str,
        id: ResourceId,
        req: &VpcRouterUpdateRequest,
    ) -> Result<VpcRouter>;

    async fn update_settings(
        &self,
        zone: &str,
        id: ResourceId,
        req: &VpcRouterUpdateSettingsRequest,
    ) -> Result<VpcRouter>;

    async fn delete(&self, zone: &str, id: ResourceId) -> Result<()>;

    /// Commit the stored settings to the running router
    async fn config(&self, zone: &str, id: ResourceId) -> Result<()>;

    async fn connect_to_switch(
        &self,
        zone: &str,
        id: ResourceId,
        nic_index: u32,
        switch_id: ResourceId,
    ) -> Result<()>;

    async fn disconnect_from_switch(&self, zone: &str, id: ResourceId, nic_index: u32)
    -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VpcRouterPlan {
    #[default]
    Standard,
    Premium,
    HighSpec,
    HighSpec4000,
}

impl VpcRouterPlan {
    pub fn is_standard(&self) -> bool {
        matches!(self, VpcRouterPlan::Standard)
    }
}

impl std::fmt::Display for VpcRouterPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VpcRouterPlan::Standard => write!(f, "standard"),
            VpcRouterPlan::Premium => write!(f, "premium"),
            VpcRouterPlan::HighSpec => write!(f, "highspec"),
            VpcRouterPlan::HighSpec4000 => write!(f, "highspec4000"),
        }
    }
}

/// VPC router as returned by the API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VpcRouter {
    #[serde(rename = "ID")]
    pub id: ResourceId,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Description", default)]
    pub description: String,

    #[serde(rename = "Tags", default)]
    pub tags: Vec<String>,

    #[serde(rename = "Plan")]
    pub plan: VpcRouterPlan,

    #[serde(rename = "Version", default)]
    pub version: u32,

    #[serde(rename = "Availability")]
    pub availability: Availability,

    #[serde(rename = "InstanceStatus")]
    pub instance_status: InstanceStatus,

    /// Connected NICs; index 0 is the public side
    #[serde(rename = "Interfaces", default)]
    pub interfaces: Vec<VpcRouterInterface>,

    #[serde(rename = "Settings", default)]
    pub settings: VpcRouterSettings,

    #[serde(rename = "SettingsHash", default)]
    pub settings_hash: String,
}

impl VpcRouter {
    pub fn interface(&self, index: u32) -> Option<&VpcRouterInterface> {
        self.interfaces.iter().find(|i| i.index == index)
    }

    /// NICs connected to private switches
    pub fn additional_interfaces(&self) -> impl Iterator<Item = &VpcRouterInterface> {
        self.interfaces.iter().filter(|i| i.index != 0)
    }
}

impl Resource for VpcRouter {
    fn id(&self) -> ResourceId {
        self.id
    }

    fn availability(&self) -> Option<Availability> {
        Some(self.availability)
    }

    fn instance_status(&self) -> Option<InstanceStatus> {
        Some(self.instance_status)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpcRouterInterface {
    #[serde(rename = "Index")]
    pub index: u32,

    #[serde(rename = "SwitchID")]
    pub switch_id: ResourceId,
}

/// Switch the primary NIC is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectedSwitch {
    /// Shared internet segment
    Shared,
    /// Router+switch or private switch
    Switch(ResourceId),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VpcRouterInterfaceSetting {
    #[serde(rename = "Index")]
    pub index: u32,

    #[serde(rename = "IPAddress")]
    pub ip_addresses: Vec<String>,

    #[serde(rename = "VirtualIPAddress", default)]
    pub virtual_ip_address: Option<String>,

    #[serde(rename = "IPAliases", default)]
    pub ip_aliases: Vec<String>,

    /// Unset for the primary NIC, whose mask follows the connected switch
    #[serde(rename = "NetworkMaskLen", default, skip_serializing_if = "Option::is_none")]
    pub network_mask_len: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticNat {
    #[serde(rename = "GlobalAddress")]
    pub global_address: String,

    #[serde(rename = "PrivateAddress")]
    pub private_address: String,

    #[serde(rename = "Description", default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortForwarding {
    #[serde(rename = "Protocol")]
    pub protocol: Protocol,

    #[serde(rename = "GlobalPort")]
    pub global_port: u16,

    #[serde(rename = "PrivateAddress")]
    pub private_address: String,

    #[serde(rename = "PrivatePort")]
    pub private_port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DhcpServer {
    #[serde(rename = "Interface")]
    pub interface: String,

    #[serde(rename = "RangeStart")]
    pub range_start: String,

    #[serde(rename = "RangeStop")]
    pub range_stop: String,

    #[serde(rename = "DNSServers", default)]
    pub dns_servers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticRoute {
    #[serde(rename = "Prefix")]
    pub prefix: String,

    #[serde(rename = "NextHop")]
    pub next_hop: String,
}

/// Router configuration applied through `update_settings` / `update`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpcRouterSettings {
    #[serde(rename = "VRID", default)]
    pub vrid: u32,

    #[serde(rename = "InternetConnectionEnabled")]
    pub internet_connection_enabled: bool,

    #[serde(rename = "Interfaces", default)]
    pub interfaces: Vec<VpcRouterInterfaceSetting>,

    #[serde(rename = "StaticNAT", default)]
    pub static_nat: Vec<StaticNat>,

    #[serde(rename = "PortForwarding", default)]
    pub port_forwarding: Vec<PortForwarding>,

    #[serde(rename = "DHCPServer", default)]
    pub dhcp_server: Vec<DhcpServer>,

    #[serde(rename = "StaticRoute", default)]
    pub static_route: Vec<StaticRoute>,

    #[serde(rename = "SyslogHost", default)]
    pub syslog_host: String,
}

impl Default for VpcRouterSettings {
    fn default() -> Self {
        Self {
            vrid: 0,
            internet_connection_enabled: true,
            interfaces: Vec::new(),
            static_nat: Vec::new(),
            port_forwarding: Vec::new(),
            dhcp_server: Vec::new(),
            static_route: Vec::new(),
            syslog_host: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VpcRouterCreateRequest {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub icon_id: ResourceId,
    pub plan: VpcRouterPlan,
    pub switch: ConnectedSwitch,
    pub ip_addresses: Vec<String>,
    pub version: u32,
    pub settings: VpcRouterSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VpcRouterUpdateRequest {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub icon_id: ResourceId,
    pub settings: VpcRouterSettings,
    pub settings_hash: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VpcRouterUpdateSettingsRequest {
    pub settings: VpcRouterSettings,
    pub settings_hash: String,
}

// ---------------------------------------------------------------------------
// NFS
// ---------------------------------------------------------------------------

#[async_trait]
pub trait NfsApi: Bootable<Target = Nfs> {
    async fn create(&self, zone: &str, req: &NfsCreateRequest) -> Result<Nfs>;

    async fn update(&self, zone: &str, id: ResourceId, req: &NfsUpdateRequest) -> Result<Nfs>;

    async fn delete(&self, zone: &str, id: ResourceId) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NfsPlan {
    #[default]
    Hdd,
    Ssd,
}

impl NfsPlan {
    /// Volume sizes in GiB offered for the plan
    pub fn sizes(&self) -> &'static [u32] {
        match self {
            NfsPlan::Hdd => &[100, 500, 1024, 2048, 4096, 8192, 12288],
            NfsPlan::Ssd => &[20, 100, 500, 1024, 2048, 4096],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Nfs {
    #[serde(rename = "ID")]
    pub id: ResourceId,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Description", default)]
    pub description: String,

    #[serde(rename = "Tags", default)]
    pub tags: Vec<String>,

    #[serde(rename = "Plan")]
    pub plan: NfsPlan,

    #[serde(rename = "SizeGB")]
    pub size_gb: u32,

    #[serde(rename = "SwitchID")]
    pub switch_id: ResourceId,

    #[serde(rename = "IPAddresses", default)]
    pub ip_addresses: Vec<String>,

    #[serde(rename = "NetworkMaskLen")]
    pub network_mask_len: u8,

    #[serde(rename = "DefaultRoute", default)]
    pub default_route: Option<String>,

    #[serde(rename = "Availability")]
    pub availability: Availability,

    #[serde(rename = "InstanceStatus")]
    pub instance_status: InstanceStatus,
}

impl Resource for Nfs {
    fn id(&self) -> ResourceId {
        self.id
    }

    fn availability(&self) -> Option<Availability> {
        Some(self.availability)
    }

    fn instance_status(&self) -> Option<InstanceStatus> {
        Some(self.instance_status)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NfsCreateRequest {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub icon_id: ResourceId,
    pub switch_id: ResourceId,
    pub plan: NfsPlan,
    pub size_gb: u32,
    pub ip_addresses: Vec<String>,
    pub network_mask_len: u8,
    pub default_route: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NfsUpdateRequest {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub icon_id: ResourceId,
}

// ---------------------------------------------------------------------------
// SIM (global resource, no zone)
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SimApi: Send + Sync {
    async fn create(&self, req: &SimCreateRequest) -> Result<Sim>;

    /// Full SIM including `info` (activation and IMEI lock state)
    async fn read(&self, id: ResourceId) -> Result<Sim>;

    /// Metadata update; `info` in the response is not populated
    async fn update(&self, id: ResourceId, req: &SimUpdateRequest) -> Result<Sim>;

    async fn set_network_operator(
        &self,
        id: ResourceId,
        configs: &[SimNetworkOperatorConfig],
    ) -> Result<()>;

    async fn activate(&self, id: ResourceId) -> Result<()>;

    async fn deactivate(&self, id: ResourceId) -> Result<()>;

    async fn imei_lock(&self, id: ResourceId, imei: &str) -> Result<()>;

    async fn imei_unlock(&self, id: ResourceId) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sim {
    #[serde(rename = "ID")]
    pub id: ResourceId,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Description", default)]
    pub description: String,

    #[serde(rename = "Tags", default)]
    pub tags: Vec<String>,

    #[serde(rename = "ICCID")]
    pub iccid: String,

    #[serde(rename = "Info", default)]
    pub info: SimInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimInfo {
    #[serde(rename = "Activated")]
    pub activated: bool,

    #[serde(rename = "IMEILock")]
    pub imei_lock: bool,

    #[serde(rename = "IMEI", default)]
    pub imei: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimNetworkOperatorConfig {
    #[serde(rename = "Allow")]
    pub allow: bool,

    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimCreateRequest {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub icon_id: ResourceId,
    pub iccid: String,
    pub pass_code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimUpdateRequest {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub icon_id: ResourceId,
}

// ---------------------------------------------------------------------------
// Local router (global resource, no zone)
// ---------------------------------------------------------------------------

#[async_trait]
pub trait LocalRouterApi: Send + Sync {
    async fn create(&self, req: &LocalRouterCreateRequest) -> Result<LocalRouter>;

    async fn read(&self, id: ResourceId) -> Result<LocalRouter>;

    async fn update(
        &self,
        id: ResourceId,
        req: &LocalRouterUpdateRequest,
    ) -> Result<LocalRouter>;

    /// Rejected unless `settings_hash` matches the stored settings
    async fn update_settings(
        &self,
        id: ResourceId,
        req: &LocalRouterUpdateSettingsRequest,
    ) -> Result<LocalRouter>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalRouter {
    #[serde(rename = "ID")]
    pub id: ResourceId,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Description", default)]
    pub description: String,

    #[serde(rename = "Tags", default)]
    pub tags: Vec<String>,

    #[serde(rename = "Switch", default)]
    pub switch: Option<LocalRouterSwitch>,

    #[serde(rename = "Interface", default)]
    pub interface: Option<LocalRouterInterface>,

    #[serde(rename = "Peers", default)]
    pub peers: Vec<LocalRouterPeer>,

    #[serde(rename = "StaticRoutes", default)]
    pub static_routes: Vec<LocalRouterStaticRoute>,

    #[serde(rename = "SettingsHash", default)]
    pub settings_hash: String,
}

/// Switch or VPC router the local router is attached to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalRouterSwitch {
    #[serde(rename = "Code")]
    pub code: String,

    #[serde(rename = "Category")]
    pub category: String,

    #[serde(rename = "ZoneID")]
    pub zone_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalRouterInterface {
    #[serde(rename = "VirtualIPAddress")]
    pub virtual_ip_address: String,

    #[serde(rename = "IPAddress")]
    pub ip_addresses: Vec<String>,

    #[serde(rename = "NetworkMaskLen")]
    pub network_mask_len: u8,

    #[serde(rename = "VRID")]
    pub vrid: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRouterPeer {
    #[serde(rename = "ID")]
    pub id: ResourceId,

    #[serde(rename = "SecretKey")]
    pub secret_key: String,

    #[serde(rename = "Enabled")]
    pub enabled: bool,

    #[serde(rename = "Description", default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRouterStaticRoute {
    #[serde(rename = "Prefix")]
    pub prefix: String,

    #[serde(rename = "NextHop")]
    pub next_hop: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalRouterCreateRequest {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub icon_id: ResourceId,
}

/// Metadata and settings in one call
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRouterUpdateRequest {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub icon_id: ResourceId,
    pub switch: Option<LocalRouterSwitch>,
    pub interface: Option<LocalRouterInterface>,
    pub peers: Vec<LocalRouterPeer>,
    pub static_routes: Vec<LocalRouterStaticRoute>,
    pub settings_hash: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalRouterUpdateSettingsRequest {
    pub switch: Option<LocalRouterSwitch>,
    pub interface: Option<LocalRouterInterface>,
    pub peers: Vec<LocalRouterPeer>,
    pub static_routes: Vec<LocalRouterStaticRoute>,
    pub settings_hash: String,
}
