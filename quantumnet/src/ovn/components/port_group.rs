use serde::{Deserialize, Serialize};
use crate::ovn::components::ExternalIds;
use crate::ovn::northbound::ovsdb::{OvsdbRow, OvsdbValue, Row};
use crate::ovn::northbound::Table;
use crate::ovn::NorthboundError;

/// A port group binds the ACLs of one security group to the ports that are members of it. Ports
/// are added and removed independently of the ACL list.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct PortGroup {
    pub uuid: String,
    pub name: String,
    /// uuids of `Logical_Switch_Port` rows
    #[serde(default)]
    pub ports: Vec<String>,
    /// uuids of `ACL` rows owned by this group
    #[serde(default)]
    pub acls: Vec<String>,
    #[serde(default)]
    pub external_ids: ExternalIds,
}

impl PortGroup {
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

impl OvsdbRow for PortGroup {
    const TABLE: Table = Table::PortGroup;

    fn to_columns(&self) -> Vec<(&'static str, OvsdbValue)> {
        vec![
            ("name", OvsdbValue::string(&self.name)),
            ("ports", OvsdbValue::uuids(&self.ports)),
            ("acls", OvsdbValue::uuids(&self.acls)),
            ("external_ids", OvsdbValue::string_map(&self.external_ids)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, NorthboundError> {
        Ok(Self {
            uuid: row.uuid("_uuid")?,
            name: row.string("name")?,
            ports: row.strings("ports")?,
            acls: row.strings("acls")?,
            external_ids: row.string_map("external_ids")?,
        })
    }
}
