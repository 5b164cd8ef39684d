use serde::{Deserialize, Serialize};
use crate::ovn::components::{ExternalIds, MacAddress};
use crate::ovn::northbound::ovsdb::{OvsdbRow, OvsdbValue, Row};
use crate::ovn::northbound::Table;
use crate::ovn::NorthboundError;

/// A logical router port, the router side of a router interface on a switch.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LogicalRouterPort {
    pub uuid: String,
    pub name: String,
    pub mac: MacAddress,
    /// gateway address with the subnet mask, e.g. `10.0.0.1/24`
    pub networks: Vec<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub peer: Option<String>,
    #[serde(default)]
    pub external_ids: ExternalIds,
}

impl LogicalRouterPort {
    pub fn new(
        uuid: String,
        name: String,
        mac: MacAddress,
        networks: Vec<String>,
    ) -> Self {
        Self {
            uuid,
            name,
            mac,
            networks,
            enabled: None,
            peer: None,
            external_ids: ExternalIds::new(),
        }
    }
}

impl OvsdbRow for LogicalRouterPort {
    const TABLE: Table = Table::LogicalRouterPort;

    fn to_columns(&self) -> Vec<(&'static str, OvsdbValue)> {
        vec![
            ("name", OvsdbValue::string(&self.name)),
            ("mac", OvsdbValue::string(&self.mac.address)),
            ("networks", OvsdbValue::strings(&self.networks)),
            ("enabled", OvsdbValue::optional_boolean(self.enabled)),
            ("peer", OvsdbValue::optional_string(self.peer.as_ref())),
            ("external_ids", OvsdbValue::string_map(&self.external_ids)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, NorthboundError> {
        Ok(Self {
            uuid: row.uuid("_uuid")?,
            name: row.string("name")?,
            mac: MacAddress::new(row.string("mac")?)?,
            networks: row.strings("networks")?,
            enabled: row.optional_boolean("enabled")?,
            peer: row.optional_string("peer")?,
            external_ids: row.string_map("external_ids")?,
        })
    }
}
