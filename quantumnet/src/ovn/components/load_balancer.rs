use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use crate::ovn::components::ExternalIds;
use crate::ovn::northbound::ovsdb::{OvsdbRow, OvsdbValue, Row};
use crate::ovn::northbound::Table;
use crate::ovn::NorthboundError;

/// An OVN load balancer. Each VIP key is `vip:port` and maps to a comma separated list of
/// `member:port` backends.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct OvnLoadBalancer {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub vips: BTreeMap<String, String>,
    /// `tcp`, `udp` or `sctp`, OVN treats an unset protocol as tcp
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub external_ids: ExternalIds,
}

impl OvnLoadBalancer {
    pub fn new(
        uuid: String,
        name: String,
    ) -> Self {
        Self {
            uuid,
            name,
            ..Default::default()
        }
    }
}

impl OvsdbRow for OvnLoadBalancer {
    const TABLE: Table = Table::LoadBalancer;

    fn to_columns(&self) -> Vec<(&'static str, OvsdbValue)> {
        vec![
            ("name", OvsdbValue::string(&self.name)),
            ("vips", OvsdbValue::string_map(&self.vips)),
            ("protocol", OvsdbValue::optional_string(self.protocol.as_ref())),
            ("external_ids", OvsdbValue::string_map(&self.external_ids)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, NorthboundError> {
        Ok(Self {
            uuid: row.uuid("_uuid")?,
            name: row.string("name")?,
            vips: row.string_map("vips")?,
            protocol: row.optional_string("protocol")?,
            external_ids: row.string_map("external_ids")?,
        })
    }
}
