use thiserror::Error;
use crate::ovn::northbound::Table;

pub mod components;
pub mod configuration;
pub mod identity;
pub mod northbound;
pub mod translator;

/// This enum represents the different kinds of failure when reading or writing logical network
/// components in the Northbound database, whichever store is backing the client.
#[derive(Error, PartialEq, Eq, Debug, Clone)]
pub enum NorthboundError {
    #[error("{table} {name} already exists")]
    AlreadyExists {
        table: Table,
        name: String,
    },
    #[error("{table} {name} does not exist")]
    NotFound {
        table: Table,
        name: String,
    },
    #[error("parent {parent} for {name} does not exist")]
    ParentNotFound {
        name: String,
        parent: String,
    },
    #[error("could not connect to the Northbound database at {address}: {msg}")]
    Connection {
        address: String,
        msg: String,
    },
    #[error("invalid input: {msg}")]
    InvalidInput {
        msg: String,
    },
    #[error("expected a {expected} row but got a {found} row")]
    TypeMismatch {
        expected: Table,
        found: Table,
    },
    #[error("Northbound command failed: {msg}")]
    Backend {
        msg: String,
    },
}

impl NorthboundError {
    pub fn not_found(table: Table, name: impl Into<String>) -> Self {
        Self::NotFound { table, name: name.into() }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput { msg: msg.into() }
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend { msg: msg.into() }
    }

    /// Callers treat this as "not created yet" rather than as a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors from compiling a security group or one of its rules into ACLs.
#[derive(Error, PartialEq, Eq, Debug, Clone)]
pub enum TranslationError {
    #[error("security group is missing")]
    MissingSecurityGroup,
    #[error("rule {rule_id}: invalid remote ip prefix {prefix}")]
    InvalidPrefix {
        rule_id: String,
        prefix: String,
    },
    #[error("rule {rule_id}: invalid port range {min}-{max}")]
    InvalidPortRange {
        rule_id: String,
        min: u32,
        max: u32,
    },
    #[error("rule {rule_id}: icmp {field} {value} is outside -1..=255")]
    InvalidIcmp {
        rule_id: String,
        field: &'static str,
        value: i32,
    },
    #[error("rule {rule_id}: unknown protocol {protocol}")]
    UnknownProtocol {
        rule_id: String,
        protocol: String,
    },
    #[error("ACL priority {0} is outside 0..=32767")]
    InvalidPriority(u32),
}

impl From<TranslationError> for NorthboundError {
    fn from(err: TranslationError) -> Self {
        NorthboundError::invalid(err.to_string())
    }
}
