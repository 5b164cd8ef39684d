use std::fmt;
use std::fmt::Formatter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use crate::NORTHBOUND_SETTINGS_FOLDER;

/// This is the configuration for the Northbound client. Only the address normally needs to be
/// set, everything else has defaults that suit a single node development setup where the client
/// falls back to the in memory store if the Northbound database is not running.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct NorthboundConfig {
    /// Northbound database remote, `tcp:<host>:<port>`, `ssl:<host>:<port>` or `unix:<path>`
    #[serde(default = "default_address")]
    pub address: String,
    /// client certificates, only used with `ssl:` remotes
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,
    /// upper bound on attempts made by a reconnect, there is no unbounded retry
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_enable_cache")]
    pub enable_cache: bool,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// switch to the in memory store for the lifetime of the client if the first connection
    /// fails, otherwise construction fails
    #[serde(default = "default_use_mock_on_failure")]
    pub use_mock_on_failure: bool,
    /// binary used to talk to the database in remote mode
    #[serde(default = "default_nbctl_path")]
    pub nbctl_path: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub struct TlsConfig {
    pub ca_cert: String,
    pub client_cert: String,
    pub client_key: String,
}

impl Default for NorthboundConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            tls: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            reconnect_interval_secs: default_reconnect_interval_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            enable_cache: default_enable_cache(),
            cache_ttl_secs: default_cache_ttl_secs(),
            use_mock_on_failure: default_use_mock_on_failure(),
            nbctl_path: default_nbctl_path(),
        }
    }
}

fn default_address() -> String {"tcp:127.0.0.1:6641".to_string()}
fn default_connect_timeout_secs() -> u64 {10}
fn default_reconnect_interval_secs() -> u64 {5}
fn default_max_reconnect_attempts() -> u32 {10}
fn default_enable_cache() -> bool {true}
fn default_cache_ttl_secs() -> u64 {30}
fn default_use_mock_on_failure() -> bool {true}
fn default_nbctl_path() -> String {"ovn-nbctl".to_string()}

impl fmt::Display for NorthboundConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string_pretty(&self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl NorthboundConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// The location used when no config file is given on the command line.
    pub fn default_location() -> PathBuf {
        PathBuf::from(format!("{NORTHBOUND_SETTINGS_FOLDER}/config/northbound.yaml"))
    }

    /// Parse the config from text, yaml unless `is_json` is set.
    pub fn parse(text: &str, is_json: bool) -> anyhow::Result<Self> {
        let config = if is_json {
            serde_json::from_str(text).context("parsing northbound config json")?
        } else {
            serde_yaml::from_str(text).context("parsing northbound config yaml")?
        };
        Ok(config)
    }

    /// Read the config from a yaml or json file, the format is picked from the extension.
    pub async fn read(path: &Path) -> anyhow::Result<Self> {
        tracing::trace!("expected northbound config location: {:?}", path);
        if !path.is_file() {
            bail!("could not read northbound config at {path:?}");
        }
        let text = tokio::fs::read_to_string(path).await?;
        Self::parse(&text, is_json(path))
    }

    pub async fn write(&self, path: &Path) -> anyhow::Result<()> {
        let text = if is_json(path) {
            serde_json::to_string_pretty(&self)?
        } else {
            serde_yaml::to_string(&self)?
        };
        let mut output = tokio::fs::File::create(path).await?;
        output.write_all(text.as_bytes()).await?;
        Ok(())
    }
}

pub(crate) fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config = NorthboundConfig::parse("{}", false).unwrap();
        assert_eq!(config, NorthboundConfig::default());
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.cache_ttl(), Duration::from_secs(30));
        assert!(config.use_mock_on_failure);
    }

    #[test]
    fn test_partial_json() {
        let config = NorthboundConfig::parse(
            r#"{"address": "ssl:10.0.0.1:6641", "enable_cache": false, "tls": {"ca_cert": "ca.pem", "client_cert": "c.pem", "client_key": "k.pem"}}"#,
            true,
        ).unwrap();
        assert_eq!(config.address, "ssl:10.0.0.1:6641");
        assert!(!config.enable_cache);
        assert_eq!(config.tls.unwrap().ca_cert, "ca.pem");
        assert_eq!(config.max_reconnect_attempts, 10);
    }

    #[tokio::test]
    async fn test_write_then_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("northbound.json");
        let mut config = NorthboundConfig::default();
        config.address = "unix:/run/ovn/ovnnb_db.sock".into();
        config.write(&path).await.unwrap();
        let read = NorthboundConfig::read(&path).await.unwrap();
        assert_eq!(read, config);

        let missing = NorthboundConfig::read(&dir.path().join("missing.yaml")).await;
        assert!(missing.is_err());
    }
}
