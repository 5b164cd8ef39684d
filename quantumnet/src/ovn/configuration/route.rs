use serde::{Deserialize, Serialize};
use crate::ovn::components::{ExternalIds, OvnIpAddr};
use crate::ovn::northbound::ovsdb::{OvsdbRow, OvsdbValue, Row};
use crate::ovn::northbound::Table;
use crate::ovn::NorthboundError;

/// This represents a static route on a logical router
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LogicalRouterStaticRoute {
    pub uuid: String,
    pub ip_prefix: OvnIpAddr, // can be a subnet with mask or ip
    pub nexthop: OvnIpAddr, // must be ip
    #[serde(default)]
    pub external_ids: ExternalIds,
}

impl LogicalRouterStaticRoute {
    pub fn new(
        uuid: String,
        ip_prefix: OvnIpAddr,
        nexthop: OvnIpAddr,
    ) -> Result<Self, NorthboundError> {
        if let OvnIpAddr::Subnet { .. } = nexthop {
            return Err(NorthboundError::invalid(format!("route next hop {nexthop} must be an ip")));
        }
        if ip_prefix.is_ipv6() != nexthop.is_ipv6() {
            return Err(NorthboundError::invalid(format!(
                "route {ip_prefix} via {nexthop} mixes address families")));
        }
        Ok(Self {
            uuid,
            ip_prefix,
            nexthop,
            external_ids: ExternalIds::new(),
        })
    }
}

impl OvsdbRow for LogicalRouterStaticRoute {
    const TABLE: Table = Table::LogicalRouterStaticRoute;

    fn to_columns(&self) -> Vec<(&'static str, OvsdbValue)> {
        vec![
            ("ip_prefix", OvsdbValue::string(self.ip_prefix.to_string())),
            ("nexthop", OvsdbValue::string(self.nexthop.to_string())),
            ("external_ids", OvsdbValue::string_map(&self.external_ids)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, NorthboundError> {
        Ok(Self {
            uuid: row.uuid("_uuid")?,
            ip_prefix: OvnIpAddr::parse(&row.string("ip_prefix")?)?,
            nexthop: OvnIpAddr::parse(&row.string("nexthop")?)?,
            external_ids: row.string_map("external_ids")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_validation() {
        let ip = |text: &str| OvnIpAddr::parse(text).unwrap();
        assert!(LogicalRouterStaticRoute::new("u".into(), ip("0.0.0.0/0"), ip("203.0.113.1")).is_ok());
        assert!(LogicalRouterStaticRoute::new("u".into(), ip("0.0.0.0/0"), ip("203.0.113.0/24")).is_err());
        assert!(LogicalRouterStaticRoute::new("u".into(), ip("::/0"), ip("203.0.113.1")).is_err());
    }
}
