use std::fmt;
use std::fmt::Formatter;
use serde::{Deserialize, Serialize};
use crate::ovn::components::{external_ids, ExternalIds, OvnIpAddr};
use crate::ovn::northbound::ovsdb::{OvsdbRow, OvsdbValue, Row};
use crate::ovn::northbound::Table;
use crate::ovn::NorthboundError;

/// This represents network address translation rules for logical routers. The row itself does not
/// name its router, the owning router is recorded in the external ids.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Nat {
    pub uuid: String,
    #[serde(rename = "type")]
    pub nat_type: OvnNatType,
    pub external_ip: OvnIpAddr, // must be ip
    pub logical_ip: OvnIpAddr, // can be a subnet with mask or an ip
    #[serde(default)]
    pub external_ids: ExternalIds,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum OvnNatType {
    #[serde(rename = "snat")]
    SNat,
    #[serde(rename = "dnat")]
    DNat,
    #[serde(rename = "dnat_and_snat")]
    DnatSNat,
}

impl OvnNatType {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            OvnNatType::SNat => "snat",
            OvnNatType::DNat => "dnat",
            OvnNatType::DnatSNat => "dnat_and_snat",
        }
    }

    pub fn from_db_str(text: &str) -> Result<Self, NorthboundError> {
        match text {
            "snat" => Ok(OvnNatType::SNat),
            "dnat" => Ok(OvnNatType::DNat),
            "dnat_and_snat" => Ok(OvnNatType::DnatSNat),
            _ => Err(NorthboundError::invalid(format!("unknown NAT type {text}"))),
        }
    }
}

impl fmt::Display for OvnNatType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl Nat {
    pub fn new(
        uuid: String,
        nat_type: OvnNatType,
        external_ip: OvnIpAddr,
        logical_ip: OvnIpAddr,
    ) -> Result<Self, NorthboundError> {
        if let OvnIpAddr::Subnet { .. } = external_ip {
            return Err(NorthboundError::invalid(format!("NAT external ip {external_ip} cannot be a subnet")));
        }
        // only snat translates a whole subnet
        if nat_type != OvnNatType::SNat {
            if let OvnIpAddr::Subnet { .. } = logical_ip {
                return Err(NorthboundError::invalid(format!(
                    "{nat_type} logical ip {logical_ip} cannot be a subnet")));
            }
        }
        Ok(Self {
            uuid,
            nat_type,
            external_ip,
            logical_ip,
            external_ids: ExternalIds::new(),
        })
    }

    /// Name of the router this rule was created on.
    pub fn router(&self) -> Option<&str> {
        self.external_ids.get(external_ids::ROUTER).map(String::as_str)
    }
}

impl OvsdbRow for Nat {
    const TABLE: Table = Table::Nat;

    fn to_columns(&self) -> Vec<(&'static str, OvsdbValue)> {
        vec![
            ("type", OvsdbValue::string(self.nat_type.as_db_str())),
            ("external_ip", OvsdbValue::string(self.external_ip.to_string())),
            ("logical_ip", OvsdbValue::string(self.logical_ip.to_string())),
            ("external_ids", OvsdbValue::string_map(&self.external_ids)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, NorthboundError> {
        Ok(Self {
            uuid: row.uuid("_uuid")?,
            nat_type: OvnNatType::from_db_str(&row.string("type")?)?,
            external_ip: OvnIpAddr::parse(&row.string("external_ip")?)?,
            logical_ip: OvnIpAddr::parse(&row.string("logical_ip")?)?,
            external_ids: row.string_map("external_ids")?,
        })
    }
}
