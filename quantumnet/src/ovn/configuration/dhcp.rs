use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use quantumnet_schemas::domain::network::VirtualNetwork;
use crate::ovn::components::{external_ids, external_ids_from, ExternalIds, MacAddress, OvnIpAddr};
use crate::ovn::northbound::ovsdb::{OvsdbRow, OvsdbValue, Row};
use crate::ovn::northbound::Table;
use crate::ovn::NorthboundError;

/// Lease handed out when the network does not set one, 24 hours.
pub const DEFAULT_LEASE_TIME_SECS: u32 = 86400;

/// This represents the `DHCP_Options` table entry. The uuid of this entry is set as
/// `dhcpv4_options` on a logical switch port to have OVN answer DHCP requests for that port.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct DhcpOptions {
    pub uuid: String,
    pub cidr: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub external_ids: ExternalIds,
}

impl DhcpOptions {
    pub fn validate(&self) -> Result<(), NorthboundError> {
        match OvnIpAddr::parse(&self.cidr) {
            Ok(OvnIpAddr::Subnet { .. }) => Ok(()),
            _ => Err(NorthboundError::invalid(format!("DHCP options need a cidr, got '{}'", self.cidr))),
        }
    }
}

impl OvsdbRow for DhcpOptions {
    const TABLE: Table = Table::DhcpOptions;

    fn to_columns(&self) -> Vec<(&'static str, OvsdbValue)> {
        vec![
            ("cidr", OvsdbValue::string(&self.cidr)),
            ("options", OvsdbValue::string_map(&self.options)),
            ("external_ids", OvsdbValue::string_map(&self.external_ids)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, NorthboundError> {
        Ok(Self {
            uuid: row.uuid("_uuid")?,
            cidr: row.string("cidr")?,
            options: row.string_map("options")?,
            external_ids: row.string_map("external_ids")?,
        })
    }
}

/// Everything needed to build a `DHCP_Options` row. The virtual DHCP server answers from
/// `server_id`/`server_mac` and advertises `router` as the default gateway.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct DhcpOptionsConfig {
    pub cidr: String,
    pub server_id: String,
    /// generated when not given
    #[serde(default)]
    pub server_mac: Option<MacAddress>,
    pub router: String,
    /// 0 means the default lease
    #[serde(default)]
    pub lease_time: u32,
    #[serde(default)]
    pub dns_servers: Vec<String>,
    #[serde(default)]
    pub ntp_servers: Vec<String>,
    #[serde(default)]
    pub mtu: Option<u32>,
    #[serde(default)]
    pub domain_name: Option<String>,
    #[serde(default)]
    pub external_ids: ExternalIds,
}

impl DhcpOptionsConfig {
    /// Build the config for a network with DHCP enabled, `None` when DHCP is off or the network
    /// has no IPv4 subnet to serve.
    pub fn from_network(network: &VirtualNetwork, switch_name: &str) -> Option<Self> {
        let ip_config = &network.spec.ip_config;
        if !ip_config.dhcp.enabled || ip_config.ipv4_subnet.is_empty() {
            return None;
        }
        let dhcp = &ip_config.dhcp;
        Some(Self {
            cidr: ip_config.ipv4_subnet.clone(),
            server_id: ip_config.ipv4_gateway.clone(),
            server_mac: None,
            router: ip_config.ipv4_gateway.clone(),
            lease_time: dhcp.lease_time_sec,
            dns_servers: dhcp.dns_servers.clone(),
            ntp_servers: dhcp.ntp_servers.clone(),
            mtu: None,
            domain_name: Some(dhcp.domain_name.clone()).filter(|name| !name.is_empty()),
            external_ids: external_ids_from(&[
                (external_ids::NETWORK_ID, &network.id),
                (external_ids::SWITCH, switch_name),
            ]),
        })
    }

    /// The `options` column, `server_mac` has to be resolved by the caller.
    pub fn to_options(&self, server_mac: &MacAddress) -> BTreeMap<String, String> {
        let mut options = BTreeMap::new();
        options.insert("server_id".to_string(), self.server_id.clone());
        options.insert("server_mac".to_string(), server_mac.get_string());
        options.insert("router".to_string(), self.router.clone());
        let lease_time = if self.lease_time > 0 { self.lease_time } else { DEFAULT_LEASE_TIME_SECS };
        options.insert("lease_time".to_string(), lease_time.to_string());
        if !self.dns_servers.is_empty() {
            options.insert("dns_server".to_string(), address_list(&self.dns_servers));
        }
        if !self.ntp_servers.is_empty() {
            options.insert("ntp_server".to_string(), address_list(&self.ntp_servers));
        }
        if let Some(mtu) = self.mtu.filter(|mtu| *mtu > 0) {
            options.insert("mtu".to_string(), mtu.to_string());
        }
        if let Some(domain) = self.domain_name.as_ref().filter(|name| !name.is_empty()) {
            // OVN parses domain_name as a quoted string
            options.insert("domain_name".to_string(), format!("\"{domain}\""));
        }
        options
    }
}

/// OVN takes a bare address for one server and `{a, b}` for several.
fn address_list(addresses: &[String]) -> String {
    if addresses.len() == 1 {
        addresses[0].clone()
    } else {
        format!("{{{}}}", addresses.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use quantumnet_schemas::domain::network::{DhcpConfig, IpAddressConfig, VirtualNetworkSpec};
    use super::*;

    fn network(dhcp_enabled: bool) -> VirtualNetwork {
        VirtualNetwork {
            id: "net-1".into(),
            project_id: "prj-1".into(),
            name: "web".into(),
            spec: VirtualNetworkSpec {
                ip_config: IpAddressConfig {
                    ipv4_subnet: "10.0.0.0/24".into(),
                    ipv4_gateway: "10.0.0.1".into(),
                    dhcp: DhcpConfig {
                        enabled: dhcp_enabled,
                        lease_time_sec: 0,
                        dns_servers: vec!["8.8.8.8".into(), "1.1.1.1".into()],
                        domain_name: "example.internal".into(),
                        ntp_servers: vec!["10.0.0.5".into()],
                    },
                },
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_options_from_network() {
        let config = DhcpOptionsConfig::from_network(&network(true), "ls-net-1").unwrap();
        let mac = MacAddress::new("0a:00:00:00:00:01".into()).unwrap();
        let options = config.to_options(&mac);
        assert_eq!(options["server_id"], "10.0.0.1");
        assert_eq!(options["router"], "10.0.0.1");
        assert_eq!(options["server_mac"], "0a:00:00:00:00:01");
        assert_eq!(options["lease_time"], "86400");
        assert_eq!(options["dns_server"], "{8.8.8.8, 1.1.1.1}");
        assert_eq!(options["ntp_server"], "10.0.0.5");
        assert_eq!(options["domain_name"], "\"example.internal\"");
        assert!(!options.contains_key("mtu"));
        assert_eq!(config.external_ids[external_ids::SWITCH], "ls-net-1");
        assert_eq!(config.external_ids[external_ids::NETWORK_ID], "net-1");
    }

    #[test]
    fn test_no_options_without_dhcp() {
        assert!(DhcpOptionsConfig::from_network(&network(false), "ls-net-1").is_none());
    }

    #[test]
    fn test_cidr_required() {
        let options = DhcpOptions { uuid: "u".into(), cidr: "".into(), ..Default::default() };
        assert!(options.validate().is_err());
        let options = DhcpOptions { uuid: "u".into(), cidr: "10.0.0.1".into(), ..Default::default() };
        assert!(options.validate().is_err());
        let options = DhcpOptions { uuid: "u".into(), cidr: "10.0.0.0/24".into(), ..Default::default() };
        assert!(options.validate().is_ok());
    }
}
