use serde::{Deserialize, Serialize};
use crate::ovn::components::ExternalIds;
use crate::ovn::northbound::ovsdb::{OvsdbRow, OvsdbValue, Row};
use crate::ovn::northbound::Table;
use crate::ovn::NorthboundError;

/// A logical switch, the L2 segment backing one virtual network.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct LogicalSwitch {
    pub uuid: String,
    pub name: String,
    /// uuids of `Logical_Switch_Port` rows
    #[serde(default)]
    pub ports: Vec<String>,
    /// uuids of `ACL` rows applied directly to the switch
    #[serde(default)]
    pub acls: Vec<String>,
    #[serde(default)]
    pub load_balancers: Vec<String>,
    #[serde(default)]
    pub external_ids: ExternalIds,
    /// `vlan`, `subnet` and `mtu` hints for the network this switch implements
    #[serde(default)]
    pub other_config: ExternalIds,
}

impl LogicalSwitch {
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

impl OvsdbRow for LogicalSwitch {
    const TABLE: Table = Table::LogicalSwitch;

    fn to_columns(&self) -> Vec<(&'static str, OvsdbValue)> {
        vec![
            ("name", OvsdbValue::string(&self.name)),
            ("ports", OvsdbValue::uuids(&self.ports)),
            ("acls", OvsdbValue::uuids(&self.acls)),
            ("load_balancer", OvsdbValue::uuids(&self.load_balancers)),
            ("external_ids", OvsdbValue::string_map(&self.external_ids)),
            ("other_config", OvsdbValue::string_map(&self.other_config)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, NorthboundError> {
        Ok(Self {
            uuid: row.uuid("_uuid")?,
            name: row.string("name")?,
            ports: row.strings("ports")?,
            acls: row.strings("acls")?,
            load_balancers: row.strings("load_balancer")?,
            external_ids: row.string_map("external_ids")?,
            other_config: row.string_map("other_config")?,
        })
    }
}
