//! The Northbound database behind one trait. [`memory::InMemoryStore`] simulates the database for
//! development and tests, [`nbctl::NbctlStore`] drives a real one through `ovn-nbctl`, and
//! [`cache::CachingStore`] adds a read cache over either. [`client::NorthboundClient`] builds the
//! per entity operations on top.

use std::fmt;
use std::fmt::Formatter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::ovn::components::acl::Acl;
use crate::ovn::components::address_set::AddressSet;
use crate::ovn::components::load_balancer::OvnLoadBalancer;
use crate::ovn::components::logical_router::LogicalRouter;
use crate::ovn::components::logical_router_port::LogicalRouterPort;
use crate::ovn::components::logical_switch::LogicalSwitch;
use crate::ovn::components::logical_switch_port::LogicalSwitchPort;
use crate::ovn::components::port_group::PortGroup;
use crate::ovn::components::ExternalIds;
use crate::ovn::configuration::dhcp::DhcpOptions;
use crate::ovn::configuration::nat::Nat;
use crate::ovn::configuration::route::LogicalRouterStaticRoute;
use crate::ovn::northbound::ovsdb::{OvsdbRow, OvsdbValue, Row};
use crate::ovn::NorthboundError;

pub mod cache;
pub mod client;
pub mod memory;
pub mod nbctl;
pub mod ovsdb;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Table {
    LogicalSwitch,
    LogicalSwitchPort,
    LogicalRouter,
    LogicalRouterPort,
    LogicalRouterStaticRoute,
    Acl,
    AddressSet,
    PortGroup,
    DhcpOptions,
    Nat,
    LoadBalancer,
}

impl Table {
    pub const ALL: [Table; 11] = [
        Table::LogicalSwitch,
        Table::LogicalSwitchPort,
        Table::LogicalRouter,
        Table::LogicalRouterPort,
        Table::LogicalRouterStaticRoute,
        Table::Acl,
        Table::AddressSet,
        Table::PortGroup,
        Table::DhcpOptions,
        Table::Nat,
        Table::LoadBalancer,
    ];

    pub fn db_name(&self) -> &'static str {
        match self {
            Table::LogicalSwitch => "Logical_Switch",
            Table::LogicalSwitchPort => "Logical_Switch_Port",
            Table::LogicalRouter => "Logical_Router",
            Table::LogicalRouterPort => "Logical_Router_Port",
            Table::LogicalRouterStaticRoute => "Logical_Router_Static_Route",
            Table::Acl => "ACL",
            Table::AddressSet => "Address_Set",
            Table::PortGroup => "Port_Group",
            Table::DhcpOptions => "DHCP_Options",
            Table::Nat => "NAT",
            Table::LoadBalancer => "Load_Balancer",
        }
    }

    /// Tables whose rows are addressed and kept unique by name.
    pub fn has_name_index(&self) -> bool {
        matches!(self,
            Table::LogicalSwitch | Table::LogicalSwitchPort | Table::LogicalRouter
            | Table::LogicalRouterPort | Table::AddressSet | Table::PortGroup | Table::LoadBalancer)
    }

    /// Rows in non root tables only live while another row references them, the database drops
    /// them once the last reference goes.
    pub fn is_root(&self) -> bool {
        matches!(self,
            Table::LogicalSwitch | Table::LogicalRouter | Table::AddressSet | Table::PortGroup
            | Table::DhcpOptions | Table::LoadBalancer)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.db_name())
    }
}

/// How a row is addressed. Names are only meaningful for tables with a name index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Lookup {
    Name(String),
    Uuid(String),
}

impl Lookup {
    pub fn name(name: impl Into<String>) -> Self {
        Lookup::Name(name.into())
    }

    pub fn uuid(uuid: impl Into<String>) -> Self {
        Lookup::Uuid(uuid.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Lookup::Name(name) => name,
            Lookup::Uuid(uuid) => uuid,
        }
    }

    pub fn matches(&self, object: &NbObject) -> bool {
        match self {
            Lookup::Uuid(uuid) => object.uuid() == uuid,
            Lookup::Name(name) => object.name() == Some(name.as_str()),
        }
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Columns holding references to rows of another table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefColumn {
    Ports,
    Acls,
    Nat,
    LoadBalancers,
    StaticRoutes,
}

impl RefColumn {
    pub const ALL: [RefColumn; 5] = [
        RefColumn::Ports,
        RefColumn::Acls,
        RefColumn::Nat,
        RefColumn::LoadBalancers,
        RefColumn::StaticRoutes,
    ];

    pub fn db_name(&self) -> &'static str {
        match self {
            RefColumn::Ports => "ports",
            RefColumn::Acls => "acls",
            RefColumn::Nat => "nat",
            RefColumn::LoadBalancers => "load_balancer",
            RefColumn::StaticRoutes => "static_routes",
        }
    }

    /// The table the referenced rows live in for a given owner.
    pub fn target(&self, owner: Table) -> Option<Table> {
        match (owner, self) {
            (Table::LogicalSwitch | Table::PortGroup, RefColumn::Ports) => Some(Table::LogicalSwitchPort),
            (Table::LogicalRouter, RefColumn::Ports) => Some(Table::LogicalRouterPort),
            (Table::LogicalSwitch | Table::PortGroup, RefColumn::Acls) => Some(Table::Acl),
            (Table::LogicalRouter, RefColumn::Nat) => Some(Table::Nat),
            (Table::LogicalSwitch | Table::LogicalRouter, RefColumn::LoadBalancers) => Some(Table::LoadBalancer),
            (Table::LogicalRouter, RefColumn::StaticRoutes) => Some(Table::LogicalRouterStaticRoute),
            _ => None,
        }
    }
}

/// String to string map columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapColumn {
    ExternalIds,
    Options,
    OtherConfig,
}

impl MapColumn {
    pub fn db_name(&self) -> &'static str {
        match self {
            MapColumn::ExternalIds => "external_ids",
            MapColumn::Options => "options",
            MapColumn::OtherConfig => "other_config",
        }
    }
}

macro_rules! nb_objects {
    ($($variant:ident($model:ty)),* $(,)?) => {
        /// One row of any Northbound table this client manages.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "table", content = "row")]
        pub enum NbObject {
            $($variant($model)),*
        }

        impl NbObject {
            pub fn table(&self) -> Table {
                match self {
                    $(NbObject::$variant(_) => <$model as OvsdbRow>::TABLE),*
                }
            }

            pub fn uuid(&self) -> &str {
                match self {
                    $(NbObject::$variant(row) => &row.uuid),*
                }
            }

            pub fn external_ids(&self) -> &ExternalIds {
                match self {
                    $(NbObject::$variant(row) => &row.external_ids),*
                }
            }

            pub fn to_columns(&self) -> Vec<(&'static str, OvsdbValue)> {
                match self {
                    $(NbObject::$variant(row) => row.to_columns()),*
                }
            }

            pub fn from_row(table: Table, row: &Row) -> Result<Self, NorthboundError> {
                $(
                    if table == <$model as OvsdbRow>::TABLE {
                        return Ok(NbObject::$variant(<$model as OvsdbRow>::from_row(row)?));
                    }
                )*
                Err(NorthboundError::invalid(format!("no model for table {table}")))
            }
        }

        $(
            impl From<$model> for NbObject {
                fn from(row: $model) -> Self {
                    NbObject::$variant(row)
                }
            }

            impl TryFrom<NbObject> for $model {
                type Error = NorthboundError;

                fn try_from(object: NbObject) -> Result<Self, Self::Error> {
                    match object {
                        NbObject::$variant(row) => Ok(row),
                        other => Err(NorthboundError::TypeMismatch {
                            expected: <$model as OvsdbRow>::TABLE,
                            found: other.table(),
                        }),
                    }
                }
            }
        )*
    };
}

nb_objects! {
    Switch(LogicalSwitch),
    SwitchPort(LogicalSwitchPort),
    Router(LogicalRouter),
    RouterPort(LogicalRouterPort),
    StaticRoute(LogicalRouterStaticRoute),
    Acl(Acl),
    AddressSet(AddressSet),
    PortGroup(PortGroup),
    DhcpOptions(DhcpOptions),
    Nat(Nat),
    LoadBalancer(OvnLoadBalancer),
}

impl NbObject {
    pub fn name(&self) -> Option<&str> {
        match self {
            NbObject::Switch(row) => Some(&row.name),
            NbObject::SwitchPort(row) => Some(&row.name),
            NbObject::Router(row) => Some(&row.name),
            NbObject::RouterPort(row) => Some(&row.name),
            NbObject::AddressSet(row) => Some(&row.name),
            NbObject::PortGroup(row) => Some(&row.name),
            NbObject::LoadBalancer(row) => Some(&row.name),
            NbObject::Acl(row) => row.name.as_deref(),
            NbObject::StaticRoute(_) | NbObject::DhcpOptions(_) | NbObject::Nat(_) => None,
        }
    }

    /// Checks every store applies before writing a row.
    pub fn validate(&self) -> Result<(), NorthboundError> {
        if self.uuid().is_empty() {
            return Err(NorthboundError::invalid(format!("{} row without a uuid", self.table())));
        }
        if self.table().has_name_index() && self.name().map_or(true, str::is_empty) {
            return Err(NorthboundError::invalid(format!("{} row {} without a name", self.table(), self.uuid())));
        }
        match self {
            NbObject::Acl(acl) => acl.validate(),
            NbObject::DhcpOptions(options) => options.validate(),
            _ => Ok(()),
        }
    }

    pub fn references_mut(&mut self, column: RefColumn) -> Option<&mut Vec<String>> {
        match (self, column) {
            (NbObject::Switch(row), RefColumn::Ports) => Some(&mut row.ports),
            (NbObject::Switch(row), RefColumn::Acls) => Some(&mut row.acls),
            (NbObject::Switch(row), RefColumn::LoadBalancers) => Some(&mut row.load_balancers),
            (NbObject::Router(row), RefColumn::Ports) => Some(&mut row.ports),
            (NbObject::Router(row), RefColumn::Nat) => Some(&mut row.nat),
            (NbObject::Router(row), RefColumn::LoadBalancers) => Some(&mut row.load_balancers),
            (NbObject::Router(row), RefColumn::StaticRoutes) => Some(&mut row.static_routes),
            (NbObject::PortGroup(row), RefColumn::Ports) => Some(&mut row.ports),
            (NbObject::PortGroup(row), RefColumn::Acls) => Some(&mut row.acls),
            _ => None,
        }
    }

    pub fn map_mut(&mut self, column: MapColumn) -> Option<&mut ExternalIds> {
        match (self, column) {
            (NbObject::Switch(row), MapColumn::ExternalIds) => Some(&mut row.external_ids),
            (NbObject::Switch(row), MapColumn::OtherConfig) => Some(&mut row.other_config),
            (NbObject::SwitchPort(row), MapColumn::ExternalIds) => Some(&mut row.external_ids),
            (NbObject::SwitchPort(row), MapColumn::Options) => Some(&mut row.options),
            (NbObject::Router(row), MapColumn::ExternalIds) => Some(&mut row.external_ids),
            (NbObject::Router(row), MapColumn::Options) => Some(&mut row.options),
            (NbObject::RouterPort(row), MapColumn::ExternalIds) => Some(&mut row.external_ids),
            (NbObject::StaticRoute(row), MapColumn::ExternalIds) => Some(&mut row.external_ids),
            (NbObject::Acl(row), MapColumn::ExternalIds) => Some(&mut row.external_ids),
            (NbObject::AddressSet(row), MapColumn::ExternalIds) => Some(&mut row.external_ids),
            (NbObject::PortGroup(row), MapColumn::ExternalIds) => Some(&mut row.external_ids),
            (NbObject::DhcpOptions(row), MapColumn::ExternalIds) => Some(&mut row.external_ids),
            (NbObject::DhcpOptions(row), MapColumn::Options) => Some(&mut row.options),
            (NbObject::Nat(row), MapColumn::ExternalIds) => Some(&mut row.external_ids),
            (NbObject::LoadBalancer(row), MapColumn::ExternalIds) => Some(&mut row.external_ids),
            _ => None,
        }
    }
}

/// One mutation inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// the row is created with its own uuid
    Insert(NbObject),
    /// replace every column of the row with the same uuid
    Update(NbObject),
    /// no-op if the row does not exist
    Delete {
        table: Table,
        lookup: Lookup,
    },
    AddRefs {
        table: Table,
        lookup: Lookup,
        column: RefColumn,
        uuids: Vec<String>,
    },
    RemoveRefs {
        table: Table,
        lookup: Lookup,
        column: RefColumn,
        uuids: Vec<String>,
    },
    /// insert or overwrite the given keys, other keys are left alone
    SetKeys {
        table: Table,
        lookup: Lookup,
        column: MapColumn,
        entries: ExternalIds,
    },
}

impl Operation {
    pub fn table(&self) -> Table {
        match self {
            Operation::Insert(object) | Operation::Update(object) => object.table(),
            Operation::Delete { table, .. }
            | Operation::AddRefs { table, .. }
            | Operation::RemoveRefs { table, .. }
            | Operation::SetKeys { table, .. } => *table,
        }
    }

    pub fn lookup(&self) -> Lookup {
        match self {
            Operation::Insert(object) | Operation::Update(object) => Lookup::uuid(object.uuid()),
            Operation::Delete { lookup, .. }
            | Operation::AddRefs { lookup, .. }
            | Operation::RemoveRefs { lookup, .. }
            | Operation::SetKeys { lookup, .. } => lookup.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreBackend {
    /// a real Northbound database
    Remote,
    /// the in process simulation
    InMemory,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Remote => f.write_str("remote"),
            StoreBackend::InMemory => f.write_str("mock"),
        }
    }
}

/// The Northbound database as seen by the client. Every write goes through `transact`, which is
/// all or nothing, so related mutations such as creating an ACL and attaching it to its port group
/// are never observed half done.
#[async_trait]
pub trait NorthboundStore: Send + Sync {
    async fn get(&self, table: Table, lookup: &Lookup) -> Result<Option<NbObject>, NorthboundError>;

    async fn list(&self, table: Table) -> Result<Vec<NbObject>, NorthboundError>;

    async fn find_by_external_id(
        &self,
        table: Table,
        key: &str,
        value: &str,
    ) -> Result<Vec<NbObject>, NorthboundError>;

    async fn transact(&self, operations: Vec<Operation>) -> Result<(), NorthboundError>;

    async fn close(&self) -> Result<(), NorthboundError>;

    fn is_connected(&self) -> bool;

    fn backend(&self) -> StoreBackend;
}

#[cfg(test)]
mod tests {
    use crate::ovn::components::acl::{AclAction, AclDirection};
    use super::*;

    #[test]
    fn test_object_conversions() {
        let object = NbObject::from(LogicalSwitch::new("u1".into(), "ls-1".into()));
        assert_eq!(object.table(), Table::LogicalSwitch);
        assert_eq!(object.name(), Some("ls-1"));
        assert!(Lookup::name("ls-1").matches(&object));
        assert!(Lookup::uuid("u1").matches(&object));

        let wrong = PortGroup::try_from(object.clone());
        assert_eq!(wrong, Err(NorthboundError::TypeMismatch {
            expected: Table::PortGroup,
            found: Table::LogicalSwitch,
        }));
        assert!(LogicalSwitch::try_from(object).is_ok());
    }

    #[test]
    fn test_validate() {
        let nameless = NbObject::from(LogicalSwitch::new("u1".into(), "".into()));
        assert!(nameless.validate().is_err());
        let acl = NbObject::from(Acl::new("u2".into(), AclDirection::ToLport, 40000, "ip4".into(), AclAction::Drop));
        assert!(acl.validate().is_err());
        // ACL names are labels, not keys
        let acl = NbObject::from(Acl::new("u3".into(), AclDirection::ToLport, 10, "ip4".into(), AclAction::Drop));
        assert!(acl.validate().is_ok());
    }

    #[test]
    fn test_reference_targets() {
        assert_eq!(RefColumn::Ports.target(Table::LogicalRouter), Some(Table::LogicalRouterPort));
        assert_eq!(RefColumn::Ports.target(Table::PortGroup), Some(Table::LogicalSwitchPort));
        assert_eq!(RefColumn::Nat.target(Table::LogicalSwitch), None);
        let mut router = NbObject::from(LogicalRouter::new("u".into(), "lr-1".into()));
        assert!(router.references_mut(RefColumn::StaticRoutes).is_some());
        assert!(router.references_mut(RefColumn::Acls).is_none());
        assert!(router.map_mut(MapColumn::OtherConfig).is_none());
    }
}
