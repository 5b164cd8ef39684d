use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{anyhow, Context};
use clap::Parser;
use tracing_subscriber::prelude::*;
use tracing::level_filters::LevelFilter;
use quantumnet_lib::ovn::identity::{IdGenerator, RandomIdGenerator};
use quantumnet_lib::ovn::northbound::client::NorthboundClient;
use quantumnet_lib::ovn::northbound::StoreBackend;
use quantumnet_lib::ovn::translator::AclTranslator;
use quantumnet_lib::ovn::translator::presets::presets;
use quantumnet_schemas::cli_models::{Opts, SubCommand};
use quantumnet_schemas::domain::security_group::SecurityGroup;
use quantumnet_schemas::settings::NorthboundConfig;


#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    std::process::exit(match run_app().await {
        Ok(_) => 0,
        Err(err) => {
            tracing::error!("{:#}", err);
            1
        }
    });
}

fn log_level(s: &str) -> anyhow::Result<LevelFilter> {
    match s.to_lowercase().as_str() {
        "error" => Ok(LevelFilter::ERROR),
        "warn" => Ok(LevelFilter::WARN),
        "info" => Ok(LevelFilter::INFO),
        "debug" => Ok(LevelFilter::DEBUG),
        "trace" => Ok(LevelFilter::TRACE),
        _ => Err(anyhow!("Unknown Log LevelFilter {}", s)),
    }
}

/// Parse the arguments, set up logging and run the sub command.
pub async fn run_app() -> Result<(), anyhow::Error> {
    let opts: Opts = Opts::parse();
    let mut e = None;
    let level = match &opts.verbosity {
        None => LevelFilter::INFO,
        Some(x) => match log_level(x) {
            Ok(l) => l,
            Err(err) => {
                e = Some(err);
                LevelFilter::INFO
            }
        },
    };

    // logs go to stderr so translated output on stdout can be piped
    let stderr_log = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(stderr_log.with_filter(level))
        .init();
    if let Some(e) = e {
        tracing::warn!("{}", e);
    }

    let name = opts.sub_command.name();
    parse_command(opts).await.with_context(|| format!("running {name}"))
}

pub async fn parse_command(opts: Opts) -> anyhow::Result<()> {
    let ids: Arc<dyn IdGenerator> = Arc::new(RandomIdGenerator::new());
    match &opts.sub_command {
        SubCommand::Translate(cmd) => {
            let sg = SecurityGroup::read(&cmd.input).await?;
            let translation = AclTranslator::new(ids).translate_security_group(&sg)?;
            for skipped in &translation.skipped {
                tracing::warn!("rule {} skipped: {}", skipped.rule_id, skipped.error);
            }
            println!("{}", serde_json::to_string_pretty(&translation)?);
        }
        SubCommand::Presets => {
            print!("{}", serde_yaml::to_string(&presets())?);
        }
        SubCommand::Apply(cmd) => {
            let sg = SecurityGroup::read(&cmd.input).await?;
            let client = connect(opts.config.clone(), ids).await?;
            let translation = client.create_security_group_acls(&sg).await?;
            tracing::info!("applied {} ACLs to {} ({} rules skipped)",
                translation.acls.len(), translation.port_group.name, translation.skipped.len());
            client.close().await?;
        }
        SubCommand::Delete(cmd) => {
            let client = connect(opts.config.clone(), ids).await?;
            client.delete_security_group_acls(&cmd.security_group_id).await?;
            tracing::info!("deleted ACLs of security group {}", cmd.security_group_id);
            client.close().await?;
        }
    }
    Ok(())
}

/// A config given on the command line must exist, the default location may be missing in which
/// case the defaults are used.
async fn connect(config: Option<PathBuf>, ids: Arc<dyn IdGenerator>) -> anyhow::Result<NorthboundClient> {
    let config = match config {
        Some(path) => NorthboundConfig::read(&path).await?,
        None => {
            let path = NorthboundConfig::default_location();
            if path.is_file() {
                NorthboundConfig::read(&path).await?
            } else {
                tracing::info!("no config at {path:?}, using defaults");
                NorthboundConfig::default()
            }
        }
    };
    tracing::debug!("northbound config: {config}");
    let client = NorthboundClient::connect(&config, ids).await
        .context("connecting to the Northbound database")?;
    if !client.is_connected() {
        return Err(anyhow!("Northbound client is not connected"));
    }
    // writes to the simulation vanish when the process exits
    if client.mode() == StoreBackend::InMemory {
        client.close().await?;
        return Err(anyhow!("Northbound database at {} is unreachable", config.address));
    }
    Ok(client)
}
