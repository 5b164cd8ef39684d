use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use async_trait::async_trait;
use tokio::net::{TcpStream, UnixStream};
use tokio::process::Command;
use quantumnet_schemas::settings::NorthboundConfig;
use crate::ovn::northbound::ovsdb::{OvsdbValue, Row};
use crate::ovn::northbound::{Lookup, NbObject, NorthboundStore, Operation, StoreBackend, Table};
use crate::ovn::NorthboundError;
use crate::vec_of_strings;

/// Runs `ovn-nbctl` with the given arguments and returns its stdout. Tests swap in an executor
/// that records the arguments instead of running anything.
#[async_trait]
pub trait NbctlExecutor: Send + Sync {
    async fn run(&self, args: Vec<String>) -> Result<String, NorthboundError>;
}

pub struct ProcessExecutor {
    program: String,
}

impl ProcessExecutor {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

#[async_trait]
impl NbctlExecutor for ProcessExecutor {
    async fn run(&self, args: Vec<String>) -> Result<String, NorthboundError> {
        tracing::trace!("{} {:?}", self.program, args);
        let output = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| NorthboundError::backend(format!("could not run {}: {err}", self.program)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NorthboundError::backend(stderr.trim().to_string()));
        }
        String::from_utf8(output.stdout)
            .map_err(|err| NorthboundError::backend(format!("{} output is not utf-8: {err}", self.program)))
    }
}

/// Where the Northbound database listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Remote {
    Tcp { host: String, port: u16 },
    Ssl { host: String, port: u16 },
    Unix(PathBuf),
}

impl Remote {
    pub fn parse(address: &str) -> Result<Self, NorthboundError> {
        let invalid = |msg: &str| NorthboundError::Connection {
            address: address.to_string(),
            msg: msg.to_string(),
        };
        let address = address.trim();
        if address.is_empty() {
            return Err(invalid("no address configured"));
        }
        let (scheme, rest) = address.split_once(':')
            .ok_or_else(|| invalid("expected tcp:<host>:<port>, ssl:<host>:<port> or unix:<path>"))?;
        match scheme {
            "unix" if !rest.is_empty() => Ok(Remote::Unix(PathBuf::from(rest))),
            "tcp" | "ssl" => {
                // host may be a bracketed v6 address
                let (host, port) = rest.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
                let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
                if host.is_empty() {
                    return Err(invalid("missing host"));
                }
                let port = port.parse::<u16>().map_err(|_| invalid("port is not a number"))?;
                if scheme == "tcp" {
                    Ok(Remote::Tcp { host, port })
                } else {
                    Ok(Remote::Ssl { host, port })
                }
            }
            _ => Err(invalid("unsupported remote")),
        }
    }
}

/// The real Northbound database, driven through `ovn-nbctl`. Every transaction is one
/// invocation with its commands separated by `--`, which `ovn-nbctl` commits as a single OVSDB
/// transaction.
pub struct NbctlStore {
    config: NorthboundConfig,
    remote: Remote,
    executor: Box<dyn NbctlExecutor>,
    connected: AtomicBool,
    closed: AtomicBool,
}

impl NbctlStore {
    /// Set up the store without touching the network, `connect` or `reconnect` establish
    /// connectivity.
    pub fn new(
        config: NorthboundConfig,
        executor: Box<dyn NbctlExecutor>,
    ) -> Result<Self, NorthboundError> {
        let remote = Remote::parse(&config.address)?;
        Ok(Self {
            config,
            remote,
            executor,
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// A single bounded connection attempt using the configured `ovn-nbctl` binary.
    pub async fn connect(config: &NorthboundConfig) -> Result<Self, NorthboundError> {
        let executor = Box::new(ProcessExecutor::new(config.nbctl_path.clone()));
        let store = Self::new(config.clone(), executor)?;
        store.probe().await?;
        store.connected.store(true, Ordering::SeqCst);
        tracing::info!("connected to Northbound database at {}", store.config.address);
        Ok(store)
    }

    /// Check the database accepts connections, bounded by the connect timeout.
    async fn probe(&self) -> Result<(), NorthboundError> {
        let failed = |msg: String| NorthboundError::Connection {
            address: self.config.address.clone(),
            msg,
        };
        let timeout = self.config.connect_timeout();
        let attempt = async {
            match &self.remote {
                Remote::Tcp { host, port } | Remote::Ssl { host, port } => {
                    TcpStream::connect((host.as_str(), *port)).await.map(|_| ())
                }
                Remote::Unix(path) => UnixStream::connect(path).await.map(|_| ()),
            }
        };
        match tokio::time::timeout(timeout, attempt).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(failed(err.to_string())),
            Err(_) => Err(failed(format!("timed out after {timeout:?}"))),
        }
    }

    /// Try to reach the database again, at most `max_reconnect_attempts` times with
    /// `reconnect_interval` between attempts.
    pub async fn reconnect(&self) -> Result<(), NorthboundError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(NorthboundError::Connection {
                address: self.config.address.clone(),
                msg: "store is closed".into(),
            });
        }
        let attempts = self.config.max_reconnect_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.probe().await {
                Ok(()) => {
                    self.connected.store(true, Ordering::SeqCst);
                    tracing::info!("reconnected to Northbound database at {} on attempt {attempt}",
                        self.config.address);
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!("Northbound reconnect attempt {attempt}/{attempts} failed: {err}");
                    last_error = Some(err);
                    if attempt < attempts {
                        tokio::time::sleep(self.config.reconnect_interval()).await;
                    }
                }
            }
        }
        self.connected.store(false, Ordering::SeqCst);
        Err(last_error.unwrap_or_else(|| NorthboundError::Connection {
            address: self.config.address.clone(),
            msg: "no reconnect attempts made".into(),
        }))
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--db={}", self.config.address),
            format!("--timeout={}", self.config.connect_timeout_secs),
        ];
        if let (Remote::Ssl { .. }, Some(tls)) = (&self.remote, &self.config.tls) {
            args.push(format!("--private-key={}", tls.client_key));
            args.push(format!("--certificate={}", tls.client_cert));
            args.push(format!("--ca-cert={}", tls.ca_cert));
        }
        args
    }

    async fn run(&self, args: Vec<String>) -> Result<String, NorthboundError> {
        if !self.connected.load(Ordering::SeqCst) {
            self.reconnect().await?;
        }
        let mut full = self.base_args();
        full.extend(args);
        // ovn-nbctl enforces --timeout itself, this only guards against a hung process
        let limit = self.config.connect_timeout() + Duration::from_secs(5);
        let result = match tokio::time::timeout(limit, self.executor.run(full)).await {
            Ok(result) => result,
            Err(_) => Err(NorthboundError::backend(format!("ovn-nbctl did not finish within {limit:?}"))),
        };
        if result.is_err() && self.probe().await.is_err() {
            self.connected.store(false, Ordering::SeqCst);
        }
        result
    }

    /// Resolve a lookup into the record argument `ovn-nbctl` accepts. Names only work for tables
    /// with a name index, anything else is looked up first.
    async fn record(&self, table: Table, lookup: &Lookup) -> Result<Option<String>, NorthboundError> {
        match lookup {
            Lookup::Uuid(uuid) => Ok(Some(uuid.clone())),
            Lookup::Name(name) if table.has_name_index() => Ok(Some(name.clone())),
            Lookup::Name(_) => Ok(self.get(table, lookup).await?.map(|row| row.uuid().to_string())),
        }
    }

    /// The sub commands for one operation, empty when there is nothing to do.
    async fn commands(&self, operation: &Operation) -> Result<Vec<Vec<String>>, NorthboundError> {
        let commands = match operation {
            Operation::Insert(object) => {
                object.validate()?;
                let mut command = vec_of_strings![format!("--id={}", object.uuid()), "create", object.table()];
                command.extend(column_args(object));
                vec![command]
            }
            Operation::Update(object) => {
                object.validate()?;
                let mut command = vec_of_strings!["set", object.table(), object.uuid()];
                command.extend(column_args(object));
                vec![command]
            }
            Operation::Delete { table, lookup } => {
                if !table.is_root() {
                    // dropped by the database once nothing references it
                    return Ok(Vec::new());
                }
                match self.record(*table, lookup).await? {
                    None => Vec::new(),
                    Some(record) => vec![vec_of_strings!["--if-exists", "destroy", table, record]],
                }
            }
            Operation::AddRefs { table, lookup, column, uuids } => {
                let record = self.record(*table, lookup).await?
                    .ok_or_else(|| NorthboundError::not_found(*table, lookup.as_str()))?;
                let mut command = vec_of_strings!["add", table, record, column.db_name()];
                command.extend(uuids.iter().cloned());
                vec![command]
            }
            Operation::RemoveRefs { table, lookup, column, uuids } => {
                match self.record(*table, lookup).await? {
                    None => Vec::new(),
                    Some(record) => {
                        let mut command = vec_of_strings!["--if-exists", "remove", table, record, column.db_name()];
                        command.extend(uuids.iter().cloned());
                        vec![command]
                    }
                }
            }
            Operation::SetKeys { table, lookup, column, entries } => {
                let record = self.record(*table, lookup).await?
                    .ok_or_else(|| NorthboundError::not_found(*table, lookup.as_str()))?;
                let mut command = vec_of_strings!["set", table, record];
                command.extend(entries.iter().map(|(key, value)| format!(
                    "{}:{}={}", column.db_name(), OvsdbValue::string(key).to_nbctl(), OvsdbValue::string(value).to_nbctl())));
                vec![command]
            }
        };
        Ok(commands)
    }

    /// All sub commands of a transaction joined into one argument list.
    pub async fn transaction_args(&self, operations: &[Operation]) -> Result<Vec<String>, NorthboundError> {
        let mut args = Vec::new();
        for operation in operations {
            for command in self.commands(operation).await? {
                args.push("--".to_string());
                args.extend(command);
            }
        }
        Ok(args)
    }

    async fn find(&self, table: Table, conditions: Vec<String>) -> Result<Vec<NbObject>, NorthboundError> {
        let mut args = vec_of_strings!["--format=json", "--data=json", "find", table];
        args.extend(conditions);
        let output = self.run(args).await?;
        Row::from_find_output(&output)?
            .iter()
            .map(|row| NbObject::from_row(table, row))
            .collect()
    }
}

fn column_args(object: &NbObject) -> Vec<String> {
    object.to_columns()
        .into_iter()
        .map(|(column, value)| format!("{column}={}", value.to_nbctl()))
        .collect()
}

#[async_trait]
impl NorthboundStore for NbctlStore {
    async fn get(&self, table: Table, lookup: &Lookup) -> Result<Option<NbObject>, NorthboundError> {
        let condition = match lookup {
            Lookup::Uuid(uuid) => format!("_uuid={uuid}"),
            Lookup::Name(name) => format!("name={}", OvsdbValue::string(name).to_nbctl()),
        };
        Ok(self.find(table, vec![condition]).await?.into_iter().next())
    }

    async fn list(&self, table: Table) -> Result<Vec<NbObject>, NorthboundError> {
        self.find(table, Vec::new()).await
    }

    async fn find_by_external_id(
        &self,
        table: Table,
        key: &str,
        value: &str,
    ) -> Result<Vec<NbObject>, NorthboundError> {
        let condition = format!("external_ids:{}={}",
            OvsdbValue::string(key).to_nbctl(), OvsdbValue::string(value).to_nbctl());
        self.find(table, vec![condition]).await
    }

    async fn transact(&self, operations: Vec<Operation>) -> Result<(), NorthboundError> {
        let args = self.transaction_args(&operations).await?;
        if args.is_empty() {
            return Ok(());
        }
        tracing::debug!("Northbound transaction with {} operations", operations.len());
        self.run(args).await.map(|_| ())
    }

    async fn close(&self) -> Result<(), NorthboundError> {
        self.closed.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn backend(&self) -> StoreBackend {
        StoreBackend::Remote
    }
}
