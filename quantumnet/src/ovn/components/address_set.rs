use serde::{Deserialize, Serialize};
use crate::ovn::components::ExternalIds;
use crate::ovn::northbound::ovsdb::{OvsdbRow, OvsdbValue, Row};
use crate::ovn::northbound::Table;
use crate::ovn::NorthboundError;

/// Named set of addresses that match expressions can reference as `$<name>`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct AddressSet {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub external_ids: ExternalIds,
}

impl AddressSet {
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

impl OvsdbRow for AddressSet {
    const TABLE: Table = Table::AddressSet;

    fn to_columns(&self) -> Vec<(&'static str, OvsdbValue)> {
        vec![
            ("name", OvsdbValue::string(&self.name)),
            ("addresses", OvsdbValue::strings(&self.addresses)),
            ("external_ids", OvsdbValue::string_map(&self.external_ids)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, NorthboundError> {
        Ok(Self {
            uuid: row.uuid("_uuid")?,
            name: row.string("name")?,
            addresses: row.strings("addresses")?,
            external_ids: row.string_map("external_ids")?,
        })
    }
}
