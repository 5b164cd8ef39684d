use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use async_trait::async_trait;
use tokio::sync::RwLock;
use crate::ovn::northbound::{Lookup, NbObject, NorthboundStore, Operation, RefColumn, StoreBackend, Table};
use crate::ovn::NorthboundError;

/// rows by uuid, per table
type Tables = HashMap<Table, BTreeMap<String, NbObject>>;

/// The Northbound database simulated in process. Used when no real database is reachable and
/// throughout the tests. State lives as long as the store and is private to it.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    open: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::new()),
            open: AtomicBool::new(true),
        }
    }

    fn find_key(tables: &Tables, table: Table, lookup: &Lookup) -> Option<String> {
        let rows = tables.get(&table)?;
        match lookup {
            Lookup::Uuid(uuid) => rows.contains_key(uuid).then(|| uuid.clone()),
            Lookup::Name(_) => rows.values()
                .find(|row| lookup.matches(row))
                .map(|row| row.uuid().to_string()),
        }
    }

    fn name_taken(tables: &Tables, object: &NbObject) -> bool {
        let table = object.table();
        if !table.has_name_index() {
            return false;
        }
        let Some(name) = object.name() else {
            return false;
        };
        tables.get(&table).map_or(false, |rows| rows.values()
            .any(|row| row.uuid() != object.uuid() && row.name() == Some(name)))
    }

    fn apply(tables: &mut Tables, operation: Operation) -> Result<(), NorthboundError> {
        match operation {
            Operation::Insert(object) => {
                object.validate()?;
                let table = object.table();
                if Self::find_key(tables, table, &Lookup::uuid(object.uuid())).is_some() {
                    return Err(NorthboundError::AlreadyExists { table, name: object.uuid().to_string() });
                }
                if Self::name_taken(tables, &object) {
                    let name = object.name().unwrap_or_default().to_string();
                    return Err(NorthboundError::AlreadyExists { table, name });
                }
                tables.entry(table).or_default().insert(object.uuid().to_string(), object);
            }
            Operation::Update(object) => {
                object.validate()?;
                let table = object.table();
                if Self::find_key(tables, table, &Lookup::uuid(object.uuid())).is_none() {
                    return Err(NorthboundError::not_found(table, object.uuid()));
                }
                if Self::name_taken(tables, &object) {
                    let name = object.name().unwrap_or_default().to_string();
                    return Err(NorthboundError::AlreadyExists { table, name });
                }
                tables.entry(table).or_default().insert(object.uuid().to_string(), object);
            }
            Operation::Delete { table, lookup } => {
                let Some(key) = Self::find_key(tables, table, &lookup) else {
                    return Ok(());
                };
                if let Some(rows) = tables.get_mut(&table) {
                    rows.remove(&key);
                }
                // like the real database, nothing is left pointing at a deleted row
                for rows in tables.values_mut() {
                    for row in rows.values_mut() {
                        for column in RefColumn::ALL {
                            if column.target(row.table()) != Some(table) {
                                continue;
                            }
                            if let Some(refs) = row.references_mut(column) {
                                refs.retain(|uuid| uuid != &key);
                            }
                        }
                    }
                }
            }
            Operation::AddRefs { table, lookup, column, uuids } => {
                let target = column.target(table).ok_or_else(|| NorthboundError::invalid(
                    format!("{table} has no {} reference column", column.db_name())))?;
                for uuid in &uuids {
                    if Self::find_key(tables, target, &Lookup::uuid(uuid)).is_none() {
                        return Err(NorthboundError::not_found(target, uuid));
                    }
                }
                let key = Self::find_key(tables, table, &lookup)
                    .ok_or_else(|| NorthboundError::not_found(table, lookup.as_str()))?;
                let refs = tables.get_mut(&table)
                    .and_then(|rows| rows.get_mut(&key))
                    .and_then(|row| row.references_mut(column))
                    .ok_or_else(|| NorthboundError::not_found(table, lookup.as_str()))?;
                for uuid in uuids {
                    if !refs.contains(&uuid) {
                        refs.push(uuid);
                    }
                }
            }
            Operation::RemoveRefs { table, lookup, column, uuids } => {
                if column.target(table).is_none() {
                    return Err(NorthboundError::invalid(
                        format!("{table} has no {} reference column", column.db_name())));
                }
                let Some(key) = Self::find_key(tables, table, &lookup) else {
                    return Ok(());
                };
                if let Some(refs) = tables.get_mut(&table)
                    .and_then(|rows| rows.get_mut(&key))
                    .and_then(|row| row.references_mut(column)) {
                    refs.retain(|uuid| !uuids.contains(uuid));
                }
            }
            Operation::SetKeys { table, lookup, column, entries } => {
                let key = Self::find_key(tables, table, &lookup)
                    .ok_or_else(|| NorthboundError::not_found(table, lookup.as_str()))?;
                let map = tables.get_mut(&table)
                    .and_then(|rows| rows.get_mut(&key))
                    .and_then(|row| row.map_mut(column))
                    .ok_or_else(|| NorthboundError::invalid(
                        format!("{table} has no {} column", column.db_name())))?;
                map.extend(entries);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl NorthboundStore for InMemoryStore {
    async fn get(&self, table: Table, lookup: &Lookup) -> Result<Option<NbObject>, NorthboundError> {
        let tables = self.tables.read().await;
        Ok(Self::find_key(&tables, table, lookup)
            .and_then(|key| tables.get(&table).and_then(|rows| rows.get(&key)).cloned()))
    }

    async fn list(&self, table: Table) -> Result<Vec<NbObject>, NorthboundError> {
        let tables = self.tables.read().await;
        Ok(tables.get(&table).map(|rows| rows.values().cloned().collect()).unwrap_or_default())
    }

    async fn find_by_external_id(
        &self,
        table: Table,
        key: &str,
        value: &str,
    ) -> Result<Vec<NbObject>, NorthboundError> {
        let tables = self.tables.read().await;
        Ok(tables.get(&table)
            .map(|rows| rows.values()
                .filter(|row| row.external_ids().get(key).map(String::as_str) == Some(value))
                .cloned()
                .collect())
            .unwrap_or_default())
    }

    async fn transact(&self, operations: Vec<Operation>) -> Result<(), NorthboundError> {
        let mut tables = self.tables.write().await;
        // apply to a copy so a failing operation leaves nothing behind
        let mut working = tables.clone();
        for operation in operations {
            tracing::trace!("mock northbound operation on {} {}", operation.table(), operation.lookup());
            Self::apply(&mut working, operation)?;
        }
        *tables = working;
        Ok(())
    }

    async fn close(&self) -> Result<(), NorthboundError> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::InMemory
    }
}
