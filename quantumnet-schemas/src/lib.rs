pub mod cli_models;
pub mod domain;
pub mod settings;

pub const NORTHBOUND_SETTINGS_FOLDER: &str = "/var/lib/quantumnet";

/// Namespace of every external-ids key written to the Northbound database. Anything reconciling
/// logical network state against domain state matches on these keys, so they must never change.
pub const EXTERNAL_ID_PREFIX: &str = "limiquantix";
