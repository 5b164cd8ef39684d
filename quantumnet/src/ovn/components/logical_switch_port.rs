use std::fmt;
use std::fmt::Formatter;
use serde::{Deserialize, Serialize};
use crate::ovn::components::ExternalIds;
use crate::ovn::northbound::ovsdb::{OvsdbRow, OvsdbValue, Row};
use crate::ovn::northbound::Table;
use crate::ovn::NorthboundError;

/// This represents a logical switch port, the attachment point of a single virtual NIC or of a
/// router or provider network on a logical switch.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct LogicalSwitchPort {
    pub uuid: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub port_type: LogicalSwitchPortType,
    /// each entry is `"MAC IP..."`, or one of the keywords `router`/`unknown`
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub port_security: Vec<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    /// VLAN tag, only meaningful on localnet ports
    #[serde(default)]
    pub tag: Option<u16>,
    #[serde(default)]
    pub options: ExternalIds,
    #[serde(default)]
    pub external_ids: ExternalIds,
    /// uuid of the `DHCP_Options` row serving this port
    #[serde(default)]
    pub dhcpv4_options: Option<String>,
}

impl LogicalSwitchPort {
    pub fn new(
        uuid: String,
        name: String,
        port_type: LogicalSwitchPortType,
    ) -> Self {
        Self {
            uuid,
            name,
            port_type,
            ..Default::default()
        }
    }
}

/// The OVN port types this client creates. Anything else found in the database is kept as
/// `Other` so listing a switch never fails on ports created by other tools.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
pub enum LogicalSwitchPortType {
    #[default]
    Normal,
    /// SR-IOV/macvtap passthrough, bound to a chassis with `requested-chassis`
    Direct,
    VhostUser,
    Localnet,
    Router,
    Other(String),
}

impl LogicalSwitchPortType {
    pub fn as_db_str(&self) -> &str {
        match self {
            LogicalSwitchPortType::Normal => "",
            LogicalSwitchPortType::Direct => "direct",
            LogicalSwitchPortType::VhostUser => "dpdkvhostuser",
            LogicalSwitchPortType::Localnet => "localnet",
            LogicalSwitchPortType::Router => "router",
            LogicalSwitchPortType::Other(other) => other,
        }
    }

    pub fn from_db_str(text: &str) -> Self {
        match text {
            "" => LogicalSwitchPortType::Normal,
            "direct" => LogicalSwitchPortType::Direct,
            "dpdkvhostuser" => LogicalSwitchPortType::VhostUser,
            "localnet" => LogicalSwitchPortType::Localnet,
            "router" => LogicalSwitchPortType::Router,
            other => LogicalSwitchPortType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for LogicalSwitchPortType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LogicalSwitchPortType::Normal => f.write_str("normal"),
            other => f.write_str(other.as_db_str()),
        }
    }
}

impl OvsdbRow for LogicalSwitchPort {
    const TABLE: Table = Table::LogicalSwitchPort;

    fn to_columns(&self) -> Vec<(&'static str, OvsdbValue)> {
        vec![
            ("name", OvsdbValue::string(&self.name)),
            ("type", OvsdbValue::string(self.port_type.as_db_str())),
            ("addresses", OvsdbValue::strings(&self.addresses)),
            ("port_security", OvsdbValue::strings(&self.port_security)),
            ("enabled", OvsdbValue::optional_boolean(self.enabled)),
            ("tag", OvsdbValue::optional_integer(self.tag.map(i64::from))),
            ("options", OvsdbValue::string_map(&self.options)),
            ("external_ids", OvsdbValue::string_map(&self.external_ids)),
            ("dhcpv4_options", OvsdbValue::optional_uuid(self.dhcpv4_options.as_ref())),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, NorthboundError> {
        let tag = match row.optional_integer("tag")? {
            None => None,
            Some(tag) => Some(u16::try_from(tag)
                .map_err(|_| NorthboundError::invalid(format!("vlan tag {tag} out of range")))?),
        };
        Ok(Self {
            uuid: row.uuid("_uuid")?,
            name: row.string("name")?,
            port_type: LogicalSwitchPortType::from_db_str(&row.optional_string("type")?.unwrap_or_default()),
            addresses: row.strings("addresses")?,
            port_security: row.strings("port_security")?,
            enabled: row.optional_boolean("enabled")?,
            tag,
            options: row.string_map("options")?,
            external_ids: row.string_map("external_ids")?,
            dhcpv4_options: row.optional_uuid("dhcpv4_options")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_type_db_names() {
        for port_type in [
            LogicalSwitchPortType::Normal,
            LogicalSwitchPortType::Direct,
            LogicalSwitchPortType::VhostUser,
            LogicalSwitchPortType::Localnet,
            LogicalSwitchPortType::Router,
        ] {
            assert_eq!(LogicalSwitchPortType::from_db_str(port_type.as_db_str()), port_type);
        }
        assert_eq!(LogicalSwitchPortType::VhostUser.as_db_str(), "dpdkvhostuser");
        assert_eq!(LogicalSwitchPortType::from_db_str("localport"),
                   LogicalSwitchPortType::Other("localport".into()));
        assert_eq!(LogicalSwitchPortType::Normal.to_string(), "normal");
    }
}
