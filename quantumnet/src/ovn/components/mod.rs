use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Formatter;
use std::net::IpAddr;
use rand::Rng;
use serde::{Deserialize, Serialize};
use crate::ovn::NorthboundError;

pub mod acl;
pub mod address_set;
pub mod load_balancer;
pub mod logical_router;
pub mod logical_router_port;
pub mod logical_switch;
pub mod logical_switch_port;
pub mod port_group;

/// Helper macro to convert Vec<&str> to Vec<String> to avoid having to keep writing `.to_string()`
#[macro_export]
macro_rules! vec_of_strings {
    ($($x:expr),*) => (vec![$($x.to_string()),*]);
}

/// Every Northbound row carries an `external_ids` column mapping it back to the platform entity
/// that owns it. An ordered map keeps command lines and serialised output stable.
pub type ExternalIds = BTreeMap<String, String>;

/// The platform namespaced keys used in `external_ids`. These are read by anything reconciling
/// the Northbound database against the platform, so they must not change.
pub mod external_ids {
    pub const SG_ID: &str = "limiquantix-sg-id";
    pub const SG_NAME: &str = "limiquantix-sg-name";
    pub const RULE_ID: &str = "limiquantix-rule-id";
    pub const BUILTIN: &str = "limiquantix-builtin";
    pub const NETWORK_ID: &str = "limiquantix-network-id";
    pub const PROJECT_ID: &str = "limiquantix-project-id";
    pub const NAME: &str = "limiquantix-name";
    pub const SWITCH: &str = "limiquantix-switch";
    pub const PORT_ID: &str = "limiquantix-port-id";
    pub const VM_ID: &str = "limiquantix-vm-id";
    pub const ROUTER_ID: &str = "limiquantix-router-id";
    pub const ROUTER: &str = "limiquantix-router";
    pub const FLOATING_IP: &str = "limiquantix-floating-ip";
    pub const SNAT: &str = "limiquantix-snat";
    pub const LB_ID: &str = "limiquantix-lb-id";
}

/// Build an `ExternalIds` map from key value pairs, skipping pairs with an empty value.
pub fn external_ids_from(pairs: &[(&str, &str)]) -> ExternalIds {
    pairs.iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Struct to represent mac addresses, to validate the string to make sure it is a valid mac address
#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq, Hash)]
pub struct MacAddress {
    pub address: String,
    pub as_bytes: u64,
}

impl MacAddress {
    pub fn new(
        address: String,
    ) -> Result<Self, NorthboundError> {
        if address.eq("00:00:00:00:00:00") {
            return Err(NorthboundError::invalid("cant have a mac address of 00:00:00:00:00:00"));
        }
        validate_mac(&address)?;
        let as_bytes = Self::get_mac_as_bytes(&address)?;
        // normalise to lower case so comparisons against generated addresses work
        Ok(Self { address: address.to_lowercase(), as_bytes })
    }

    fn get_mac_as_bytes(address: &str) -> Result<u64, NorthboundError> {
        let split: Vec<_> = address.split(':').collect();
        if split.len() != 6 {
            return Err(NorthboundError::invalid(format!("mac address not 48 bit format {address}")));
        }
        let octets = MacAddress::get_octets(&split)?;
        let mut mac_bytes = 0;
        for byte in octets {
            mac_bytes = (mac_bytes << 8) | u64::from(byte);
        }
        Ok(mac_bytes)
    }

    fn get_octets(address: &[&str]) -> Result<[u8; 6], NorthboundError> {
        let mut byte_array = [0u8; 6];
        for (slot, oct) in byte_array.iter_mut().zip(address) {
            *slot = u8::from_str_radix(oct, 16)
                .map_err(|_| NorthboundError::invalid(format!("mac octet {oct} is not hex")))?;
        }
        Ok(byte_array)
    }

    pub fn from_u64(num: u64) -> Result<Self, NorthboundError> {
        if num == 0 {
            return Err(NorthboundError::invalid(
                "mac from u64 is 0, cant have a mac address of 00:00:00:00:00:00"));
        }
        if num >> 48 != 0 {
            return Err(NorthboundError::invalid(format!("{num} does not fit in a 48 bit mac")));
        }
        let mut result = [0u8; 6];
        for (i, octet) in result.iter_mut().rev().enumerate() {
            *octet = ((num >> (i * 8)) & 0xFF) as u8;
        }
        let mac = format!(
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            result[0], result[1], result[2], result[3], result[4], result[5]
        );
        Self::new(mac)
    }

    /// A random unicast mac with the locally administered bit set, the same kind of address
    /// OVN hands out itself.
    pub fn random_local(rng: &mut impl Rng) -> Self {
        let mut octets: [u8; 6] = rng.gen();
        octets[0] = (octets[0] & 0xfe) | 0x02;
        let num = octets.iter().fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
        let address = format!(
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            octets[0], octets[1], octets[2], octets[3], octets[4], octets[5]
        );
        // first octet always has bit 1 set so this can never be the zero address
        Self { address, as_bytes: num }
    }

    pub fn get_string(&self) -> String {
        self.address.clone()
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

fn validate_mac(mac: &str) -> Result<(), NorthboundError> {
    // make sure the format of the octets is OK
    for octet in mac.split(':') {
        if octet.len() != 2 {
            return Err(NorthboundError::invalid(format!("octet {octet} in mac {mac} is not correct")));
        }
    }
    Ok(())
}

/// Enum to represent an address used in the logical network, either a single v4/v6 address or a
/// subnet in `ip/mask` form. Used for validation of prefixes, NAT and route addresses.
#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq, Hash)]
pub enum OvnIpAddr {
    Ip(IpAddr),
    Subnet {
        ip: IpAddr,
        mask: u16,
    },
}

impl OvnIpAddr {
    pub fn parse(text: &str) -> Result<Self, NorthboundError> {
        let invalid = || NorthboundError::invalid(format!("{text} is not an ip or ip/mask"));
        match text.split_once('/') {
            None => Ok(OvnIpAddr::Ip(text.trim().parse::<IpAddr>().map_err(|_| invalid())?)),
            Some((ip, mask)) => {
                let ip = ip.trim().parse::<IpAddr>().map_err(|_| invalid())?;
                let mask = mask.trim().parse::<u16>().map_err(|_| invalid())?;
                let max = if ip.is_ipv6() { 128 } else { 32 };
                if mask > max {
                    return Err(invalid());
                }
                Ok(OvnIpAddr::Subnet { ip, mask })
            }
        }
    }

    pub fn ip(&self) -> IpAddr {
        match self {
            OvnIpAddr::Ip(ip) => *ip,
            OvnIpAddr::Subnet { ip, .. } => *ip,
        }
    }

    pub fn is_ipv6(&self) -> bool {
        self.ip().is_ipv6()
    }

    /// `0.0.0.0/0` and `::/0` match everything.
    pub fn is_any(&self) -> bool {
        matches!(self, OvnIpAddr::Subnet { ip, mask: 0 } if ip.is_unspecified())
    }
}

impl fmt::Display for OvnIpAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            OvnIpAddr::Ip(ip) => write!(f, "{ip}"),
            OvnIpAddr::Subnet { ip, mask } => write!(f, "{ip}/{mask}"),
        }
    }
}
