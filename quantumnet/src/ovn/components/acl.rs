use std::fmt;
use std::fmt::Formatter;
use serde::{Deserialize, Serialize};
use crate::ovn::components::ExternalIds;
use crate::ovn::northbound::ovsdb::{OvsdbRow, OvsdbValue, Row};
use crate::ovn::northbound::Table;
use crate::ovn::NorthboundError;

/// Highest priority the Northbound schema accepts for an ACL.
pub const MAX_ACL_PRIORITY: u16 = 32767;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum AclDirection {
    /// traffic destined to the port
    #[serde(rename = "to-lport")]
    ToLport,
    /// traffic originating from the port
    #[serde(rename = "from-lport")]
    FromLport,
}

impl AclDirection {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AclDirection::ToLport => "to-lport",
            AclDirection::FromLport => "from-lport",
        }
    }

    pub fn from_db_str(text: &str) -> Result<Self, NorthboundError> {
        match text {
            "to-lport" => Ok(AclDirection::ToLport),
            "from-lport" => Ok(AclDirection::FromLport),
            _ => Err(NorthboundError::invalid(format!("unknown ACL direction {text}"))),
        }
    }
}

impl fmt::Display for AclDirection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum AclAction {
    #[serde(rename = "allow")]
    Allow,
    /// allow and commit the connection to conntrack so replies are allowed too
    #[serde(rename = "allow-related")]
    AllowRelated,
    #[serde(rename = "allow-stateless")]
    AllowStateless,
    #[serde(rename = "drop")]
    Drop,
    #[serde(rename = "reject")]
    Reject,
}

impl AclAction {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AclAction::Allow => "allow",
            AclAction::AllowRelated => "allow-related",
            AclAction::AllowStateless => "allow-stateless",
            AclAction::Drop => "drop",
            AclAction::Reject => "reject",
        }
    }

    pub fn from_db_str(text: &str) -> Result<Self, NorthboundError> {
        match text {
            "allow" => Ok(AclAction::Allow),
            "allow-related" => Ok(AclAction::AllowRelated),
            "allow-stateless" => Ok(AclAction::AllowStateless),
            "drop" => Ok(AclAction::Drop),
            "reject" => Ok(AclAction::Reject),
            _ => Err(NorthboundError::invalid(format!("unknown ACL action {text}"))),
        }
    }
}

impl fmt::Display for AclAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Acl {
    pub uuid: String,
    pub direction: AclDirection,
    /// Must be number between 0 and 32,767
    pub priority: u16,
    #[serde(rename = "match")]
    pub _match: String,
    pub action: AclAction,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub log: bool,
    #[serde(default)]
    pub external_ids: ExternalIds,
}

impl Acl {
    pub fn new(
        uuid: String,
        direction: AclDirection,
        priority: u16,
        _match: String,
        action: AclAction,
    ) -> Self {
        Self {
            uuid,
            direction,
            priority,
            _match,
            action,
            name: None,
            log: false,
            external_ids: ExternalIds::new(),
        }
    }

    pub fn validate(&self) -> Result<(), NorthboundError> {
        if self.priority > MAX_ACL_PRIORITY {
            return Err(NorthboundError::invalid(format!(
                "ACL priority {} is above {MAX_ACL_PRIORITY}", self.priority)));
        }
        if self._match.trim().is_empty() {
            return Err(NorthboundError::invalid("ACL match expression is empty"));
        }
        Ok(())
    }

    /// The fields that decide what the ACL does, ignoring identifiers.
    pub fn semantics(&self) -> (AclDirection, u16, &str, AclAction) {
        (self.direction, self.priority, &self._match, self.action)
    }
}

impl OvsdbRow for Acl {
    const TABLE: Table = Table::Acl;

    fn to_columns(&self) -> Vec<(&'static str, OvsdbValue)> {
        vec![
            ("name", OvsdbValue::optional_string(self.name.as_ref())),
            ("direction", OvsdbValue::string(self.direction.as_db_str())),
            ("priority", OvsdbValue::Integer(i64::from(self.priority))),
            ("match", OvsdbValue::string(&self._match)),
            ("action", OvsdbValue::string(self.action.as_db_str())),
            ("log", OvsdbValue::Boolean(self.log)),
            ("external_ids", OvsdbValue::string_map(&self.external_ids)),
        ]
    }

    fn from_row(row: &Row) -> Result<Self, NorthboundError> {
        let priority = row.integer("priority")?;
        let priority = u16::try_from(priority)
            .map_err(|_| NorthboundError::invalid(format!("ACL priority {priority} out of range")))?;
        Ok(Self {
            uuid: row.uuid("_uuid")?,
            direction: AclDirection::from_db_str(&row.string("direction")?)?,
            priority,
            _match: row.string("match")?,
            action: AclAction::from_db_str(&row.string("action")?)?,
            name: row.optional_string("name")?,
            log: row.optional_boolean("log")?.unwrap_or(false),
            external_ids: row.string_map("external_ids")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acl_priority_bound() {
        let acl = Acl::new("u".into(), AclDirection::ToLport, 32767, "ip4".into(), AclAction::Drop);
        assert!(acl.validate().is_ok());
        let acl = Acl::new("u".into(), AclDirection::ToLport, 32768, "ip4".into(), AclAction::Drop);
        assert!(acl.validate().is_err());
        let acl = Acl::new("u".into(), AclDirection::ToLport, 0, " ".into(), AclAction::Drop);
        assert!(acl.validate().is_err());
    }

    #[test]
    fn test_acl_serde_names() {
        let acl = Acl::new("u".into(), AclDirection::FromLport, 100, "inport == @pg".into(), AclAction::AllowRelated);
        let json = serde_json::to_value(&acl).unwrap();
        assert_eq!(json["direction"], "from-lport");
        assert_eq!(json["action"], "allow-related");
        assert_eq!(json["match"], "inport == @pg");
        assert_eq!(AclAction::from_db_str("allow-stateless").unwrap(), AclAction::AllowStateless);
        assert!(AclDirection::from_db_str("both").is_err());
    }
}
