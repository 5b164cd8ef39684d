use serde::{Deserialize, Serialize};

/// A virtual NIC attachment point on a virtual network.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct Port {
    pub id: String,
    pub network_id: String,
    #[serde(default)]
    pub spec: PortSpec,
    #[serde(default)]
    pub status: PortStatus,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct PortSpec {
    pub mac_address: String,
    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    #[serde(default)]
    pub port_security_enabled: bool,
    #[serde(default)]
    pub binding: BindingProfile,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct FixedIp {
    #[serde(default)]
    pub subnet_id: String,
    pub ip_address: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct BindingProfile {
    #[serde(rename = "type", default)]
    pub binding_type: BindingType,
    /// only used for vhost-user bindings
    #[serde(default)]
    pub vhost_socket: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingType {
    #[default]
    #[serde(rename = "NORMAL")]
    Normal,
    /// SR-IOV
    #[serde(rename = "DIRECT")]
    Direct,
    #[serde(rename = "MACVTAP")]
    Macvtap,
    /// DPDK
    #[serde(rename = "VHOST_USER")]
    VhostUser,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct PortStatus {
    #[serde(default)]
    pub vm_id: String,
    #[serde(default)]
    pub host_id: String,
}
