use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use crate::ovn::northbound::{Lookup, NbObject, NorthboundStore, Operation, RefColumn, StoreBackend, Table};
use crate::ovn::NorthboundError;

struct CacheEntry {
    object: NbObject,
    stored: Instant,
}

/// Read through cache in front of another store. Switch, switch port, router and ACL reads are
/// served from memory for up to `ttl`. Writes made through this store update or drop the
/// affected entries, changes made behind its back are only seen once an entry expires.
pub struct CachingStore {
    inner: Arc<dyn NorthboundStore>,
    ttl: Duration,
    entries: RwLock<HashMap<(Table, Lookup), CacheEntry>>,
    /// bumped under the write lock by every write made through this store, a read only fills
    /// the cache if no write landed while it was talking to the inner store
    generation: AtomicU64,
}

impl CachingStore {
    pub fn new(inner: Arc<dyn NorthboundStore>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    fn is_cached(table: Table) -> bool {
        matches!(table,
            Table::LogicalSwitch | Table::LogicalSwitchPort | Table::LogicalRouter | Table::Acl)
    }

    async fn store(&self, object: &NbObject) {
        if !Self::is_cached(object.table()) {
            return;
        }
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        Self::insert(&mut entries, object);
    }

    /// Fill after a read of the inner store that started at `generation`.
    async fn fill(&self, object: &NbObject, generation: u64) {
        let mut entries = self.entries.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::trace!("dropping {} {} read, written since", object.table(), object.uuid());
            return;
        }
        Self::insert(&mut entries, object);
    }

    fn insert(entries: &mut HashMap<(Table, Lookup), CacheEntry>, object: &NbObject) {
        let table = object.table();
        let stored = Instant::now();
        // a rename leaves the old name behind otherwise
        entries.retain(|(cached_table, _), entry| {
            *cached_table != table || entry.object.uuid() != object.uuid()
        });
        entries.insert((table, Lookup::uuid(object.uuid())), CacheEntry { object: object.clone(), stored });
        if let Some(name) = object.name() {
            entries.insert((table, Lookup::name(name)), CacheEntry { object: object.clone(), stored });
        }
    }

    async fn invalidate(&self, table: Table, lookup: &Lookup) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        Self::remove(&mut entries, table, lookup);
    }

    fn remove(entries: &mut HashMap<(Table, Lookup), CacheEntry>, table: Table, lookup: &Lookup) {
        entries.retain(|(cached_table, key), entry| {
            *cached_table != table || (key != lookup && !lookup.matches(&entry.object))
        });
    }

    /// Deleting a row also drops references to it, so rows in tables that can point at it are
    /// stale too.
    async fn invalidate_owners(&self, table: Table) {
        let owners: Vec<Table> = Table::ALL.into_iter()
            .filter(|owner| RefColumn::ALL.iter().any(|column| column.target(*owner) == Some(table)))
            .collect();
        if owners.is_empty() {
            return;
        }
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        entries.retain(|(cached_table, _), _| !owners.contains(cached_table));
    }

    async fn after_transaction(&self, operations: &[Operation]) {
        for operation in operations {
            match operation {
                Operation::Insert(object) | Operation::Update(object) => self.store(object).await,
                Operation::Delete { table, lookup } => {
                    self.invalidate(*table, lookup).await;
                    self.invalidate_owners(*table).await;
                }
                Operation::AddRefs { table, lookup, .. }
                | Operation::RemoveRefs { table, lookup, .. }
                | Operation::SetKeys { table, lookup, .. } => self.invalidate(*table, lookup).await,
            }
        }
    }
}

#[async_trait]
impl NorthboundStore for CachingStore {
    async fn get(&self, table: Table, lookup: &Lookup) -> Result<Option<NbObject>, NorthboundError> {
        if !Self::is_cached(table) {
            return self.inner.get(table, lookup).await;
        }
        let generation = {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(&(table, lookup.clone())) {
                if entry.stored.elapsed() < self.ttl {
                    tracing::trace!("cache hit for {table} {lookup}");
                    return Ok(Some(entry.object.clone()));
                }
            }
            self.generation.load(Ordering::SeqCst)
        };
        let object = self.inner.get(table, lookup).await?;
        match &object {
            Some(object) => self.fill(object, generation).await,
            None => Self::remove(&mut *self.entries.write().await, table, lookup),
        }
        Ok(object)
    }

    async fn list(&self, table: Table) -> Result<Vec<NbObject>, NorthboundError> {
        self.inner.list(table).await
    }

    async fn find_by_external_id(
        &self,
        table: Table,
        key: &str,
        value: &str,
    ) -> Result<Vec<NbObject>, NorthboundError> {
        self.inner.find_by_external_id(table, key, value).await
    }

    async fn transact(&self, operations: Vec<Operation>) -> Result<(), NorthboundError> {
        let result = self.inner.transact(operations.clone()).await;
        if result.is_ok() {
            self.after_transaction(&operations).await;
        }
        result
    }

    async fn close(&self) -> Result<(), NorthboundError> {
        self.entries.write().await.clear();
        self.inner.close().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn backend(&self) -> StoreBackend {
        self.inner.backend()
    }
}

#[cfg(test)]
mod tests {
    use crate::ovn::components::logical_switch::LogicalSwitch;
    use crate::ovn::components::logical_switch_port::{LogicalSwitchPort, LogicalSwitchPortType};
    use crate::ovn::components::port_group::PortGroup;
    use crate::ovn::northbound::memory::InMemoryStore;
    use super::*;

    fn stores() -> (Arc<InMemoryStore>, CachingStore) {
        let inner = Arc::new(InMemoryStore::new());
        let cache = CachingStore::new(inner.clone(), Duration::from_secs(30));
        (inner, cache)
    }

    async fn get_switch(store: &CachingStore, name: &str) -> Option<LogicalSwitch> {
        store.get(Table::LogicalSwitch, &Lookup::name(name)).await.unwrap()
            .map(|object| LogicalSwitch::try_from(object).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let (inner, cache) = stores();
        cache.transact(vec![Operation::Insert(LogicalSwitch::new("u1".into(), "ls-1".into()).into())]).await.unwrap();
        assert!(get_switch(&cache, "ls-1").await.unwrap().other_config.is_empty());

        // changed behind the cache
        let mut switch = LogicalSwitch::new("u1".into(), "ls-1".into());
        switch.other_config.insert("mtu".into(), "1442".into());
        inner.transact(vec![Operation::Update(switch.into())]).await.unwrap();
        assert!(get_switch(&cache, "ls-1").await.unwrap().other_config.is_empty());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(get_switch(&cache, "ls-1").await.unwrap().other_config["mtu"], "1442");
    }

    #[tokio::test]
    async fn test_writes_invalidate() {
        let (_inner, cache) = stores();
        cache.transact(vec![Operation::Insert(LogicalSwitch::new("u1".into(), "ls-1".into()).into())]).await.unwrap();
        assert!(get_switch(&cache, "ls-1").await.unwrap().ports.is_empty());

        cache.transact(vec![
            Operation::Insert(LogicalSwitchPort::new("p1".into(), "lsp-1".into(), LogicalSwitchPortType::Normal).into()),
            Operation::AddRefs {
                table: Table::LogicalSwitch,
                lookup: Lookup::name("ls-1"),
                column: RefColumn::Ports,
                uuids: vec!["p1".into()],
            },
        ]).await.unwrap();
        assert_eq!(get_switch(&cache, "ls-1").await.unwrap().ports, vec!["p1".to_string()]);
        // fetched by uuid the switch is the same row
        let by_uuid = cache.get(Table::LogicalSwitch, &Lookup::uuid("u1")).await.unwrap().unwrap();
        assert_eq!(by_uuid.name(), Some("ls-1"));

        // deleting the port strips it from the cached switch as well
        cache.transact(vec![Operation::Delete { table: Table::LogicalSwitchPort, lookup: Lookup::uuid("p1") }]).await.unwrap();
        assert!(get_switch(&cache, "ls-1").await.unwrap().ports.is_empty());

        cache.transact(vec![Operation::Delete { table: Table::LogicalSwitch, lookup: Lookup::name("ls-1") }]).await.unwrap();
        assert!(get_switch(&cache, "ls-1").await.is_none());
        assert!(cache.get(Table::LogicalSwitch, &Lookup::uuid("u1")).await.unwrap().is_none());
    }

    /// Parks every `get` after it has read the wrapped store until released.
    struct GatedStore {
        inner: InMemoryStore,
        gated: std::sync::atomic::AtomicBool,
        read: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl NorthboundStore for GatedStore {
        async fn get(&self, table: Table, lookup: &Lookup) -> Result<Option<NbObject>, NorthboundError> {
            let object = self.inner.get(table, lookup).await?;
            if self.gated.load(Ordering::SeqCst) {
                self.read.notify_one();
                self.release.notified().await;
            }
            Ok(object)
        }

        async fn list(&self, table: Table) -> Result<Vec<NbObject>, NorthboundError> {
            self.inner.list(table).await
        }

        async fn find_by_external_id(&self, table: Table, key: &str, value: &str) -> Result<Vec<NbObject>, NorthboundError> {
            self.inner.find_by_external_id(table, key, value).await
        }

        async fn transact(&self, operations: Vec<Operation>) -> Result<(), NorthboundError> {
            self.inner.transact(operations).await
        }

        async fn close(&self) -> Result<(), NorthboundError> {
            self.inner.close().await
        }

        fn is_connected(&self) -> bool {
            self.inner.is_connected()
        }

        fn backend(&self) -> StoreBackend {
            self.inner.backend()
        }
    }

    #[tokio::test]
    async fn test_delete_during_read_is_not_cached() {
        let inner = Arc::new(GatedStore {
            inner: InMemoryStore::new(),
            gated: std::sync::atomic::AtomicBool::new(false),
            read: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        inner.transact(vec![Operation::Insert(LogicalSwitch::new("u1".into(), "ls-1".into()).into())]).await.unwrap();
        let cache = Arc::new(CachingStore::new(inner.clone(), Duration::from_secs(30)));

        inner.gated.store(true, Ordering::SeqCst);
        let reader = {
            let cache = cache.clone();
            tokio::spawn(async move { get_switch(&cache, "ls-1").await })
        };
        // the reader has the row but has not filled the cache yet
        inner.read.notified().await;
        cache.transact(vec![Operation::Delete { table: Table::LogicalSwitch, lookup: Lookup::name("ls-1") }]).await.unwrap();
        inner.release.notify_one();
        assert!(reader.await.unwrap().is_some());

        inner.gated.store(false, Ordering::SeqCst);
        assert!(inner.get(Table::LogicalSwitch, &Lookup::name("ls-1")).await.unwrap().is_none());
        assert!(get_switch(&cache, "ls-1").await.is_none());
        assert!(cache.get(Table::LogicalSwitch, &Lookup::uuid("u1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_uncached_tables_read_through() {
        let (inner, cache) = stores();
        inner.transact(vec![Operation::Insert(PortGroup::new("g1".into(), "pg_sg_1".into()).into())]).await.unwrap();
        assert!(cache.get(Table::PortGroup, &Lookup::name("pg_sg_1")).await.unwrap().is_some());
        inner.transact(vec![Operation::Delete { table: Table::PortGroup, lookup: Lookup::uuid("g1") }]).await.unwrap();
        assert!(cache.get(Table::PortGroup, &Lookup::name("pg_sg_1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_cache() {
        let (_inner, cache) = stores();
        cache.transact(vec![Operation::Insert(LogicalSwitch::new("u1".into(), "ls-1".into()).into())]).await.unwrap();
        let duplicate = cache.transact(vec![Operation::Insert(LogicalSwitch::new("u2".into(), "ls-1".into()).into())]).await;
        assert!(matches!(duplicate, Err(NorthboundError::AlreadyExists { .. })));
        assert_eq!(get_switch(&cache, "ls-1").await.unwrap().uuid, "u1");
        assert_eq!(cache.backend(), StoreBackend::InMemory);
        cache.close().await.unwrap();
        assert!(!cache.is_connected());
    }
}
