use serde::{Deserialize, Serialize};
use crate::ovn::components::ExternalIds;
use crate::ovn::northbound::ovsdb::{OvsdbRow, OvsdbValue, Row};
use crate::ovn::northbound::Table;
use crate::ovn::NorthboundError;

/// This represents a logical router. NAT rules, static routes and load balancers hang off the
/// router by uuid, router ports are created per attached switch.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct LogicalRouter {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub nat: Vec<String>,
    #[serde(default)]
    pub load_balancers: Vec<String>,
    #[serde(default)]
    pub static_routes: Vec<String>,
    #[serde(default)]
    pub options: ExternalIds,
    #[serde(default)]
    pub external_ids: ExternalIds,
}

impl LogicalRouter {
    pub fn new(
        uuid: String,
        name: String,
    ) -> Self {
        Self {
            uuid,
            name,
            enabled: Some(true),
            ..Default::default()
        }
    }
}

impl OvsdbRow for LogicalRouter {
    const TABLE: Table = Table::LogicalRouter;

    fn to_columns(&self) -> Vec<(&'static str, OvsdbValue)> {
        vec![
            ("name", OvsdbValue::string(&self.name)),
            ("enabled", OvsdbValue::optional_boolean(self.enabled)),
            ("ports", OvsdbValue::uuids(&self.ports)),
            ("nat", OvsdbValue::uuids(&self.nat)),
            ("load_balancer", OvsdbValue::uuids(&self.load_balancers)),
            ("static_routes", OvsdbValue::uuids(&self.static_routes)),
            ("options", OvsdbValue::string_map(&self.options)),
            ("external_ids", OvsdbValue::string_map(&self.external_ids)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, NorthboundError> {
        Ok(Self {
            uuid: row.uuid("_uuid")?,
            name: row.string("name")?,
            enabled: row.optional_boolean("enabled")?,
            ports: row.strings("ports")?,
            nat: row.strings("nat")?,
            load_balancers: row.strings("load_balancer")?,
            static_routes: row.strings("static_routes")?,
            options: row.string_map("options")?,
            external_ids: row.string_map("external_ids")?,
        })
    }
}
