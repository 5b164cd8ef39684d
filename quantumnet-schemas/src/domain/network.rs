use serde::{Deserialize, Serialize};

/// A tenant virtual network, realised as one logical switch.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct VirtualNetwork {
    pub id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub spec: VirtualNetworkSpec,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct VirtualNetworkSpec {
    #[serde(rename = "type", default)]
    pub network_type: NetworkType,
    #[serde(default)]
    pub vlan: Option<VlanConfig>,
    #[serde(default)]
    pub ip_config: IpAddressConfig,
    /// 0 leaves the MTU to OVN
    #[serde(default)]
    pub mtu: u32,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkType {
    #[default]
    #[serde(rename = "OVERLAY")]
    Overlay,
    #[serde(rename = "VLAN")]
    Vlan,
    #[serde(rename = "EXTERNAL")]
    External,
    #[serde(rename = "ISOLATED")]
    Isolated,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct VlanConfig {
    pub vlan_id: u32,
    #[serde(default)]
    pub physical_network: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct IpAddressConfig {
    /// e.g. 10.0.1.0/24
    #[serde(default)]
    pub ipv4_subnet: String,
    #[serde(default)]
    pub ipv4_gateway: String,
    #[serde(default)]
    pub dhcp: DhcpConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct DhcpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub lease_time_sec: u32,
    #[serde(default)]
    pub dns_servers: Vec<String>,
    #[serde(default)]
    pub domain_name: String,
    #[serde(default)]
    pub ntp_servers: Vec<String>,
}
