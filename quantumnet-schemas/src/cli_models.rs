use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version = "1.0", about = "Security group compiler and OVN Northbound client")]
pub struct Opts {
    #[arg(short, long)]
    pub verbosity: Option<String>,
    #[arg(long, help = "Northbound client config, yaml or json. Defaults to /var/lib/quantumnet/config/northbound.yaml")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub sub_command: SubCommand,
}

#[derive(Subcommand, Debug, Deserialize, Serialize)]
pub enum SubCommand {
    #[command(about = "Compile a security group file into OVN ACLs and print them")]
    Translate(SecurityGroupFileCmd),
    #[command(about = "List the built in security group presets")]
    Presets,
    #[command(about = "Create the port group, address set and ACLs for a security group")]
    Apply(SecurityGroupFileCmd),
    #[command(about = "Delete the port group, address set and ACLs of a security group")]
    Delete(DeleteCmd),
}

impl SubCommand {
    pub fn name(&self) -> String {
        match &self {
            SubCommand::Translate(_) => "translate".into(),
            SubCommand::Presets => "presets".into(),
            SubCommand::Apply(_) => "apply".into(),
            SubCommand::Delete(_) => "delete".into(),
        }
    }
}

#[derive(Args, Debug, Deserialize, Serialize)]
pub struct SecurityGroupFileCmd {
    #[arg(help = "Security group definition, yaml or json")]
    pub input: PathBuf,
}

#[derive(Args, Debug, Deserialize, Serialize)]
pub struct DeleteCmd {
    pub security_group_id: String,
}
