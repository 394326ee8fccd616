pub mod error;
pub mod services;
pub mod systemd;

use serde::Serialize;
use std::path::PathBuf;

pub use error::{Error, Result};
pub use services::{parse_list_units, ServiceLister, Systemctl};
pub use systemd::{generate_file, UnitConfigBuilder};

/// One row of `systemctl list-units` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRecord {
    pub name: String,
    pub unit: String,
    pub active_state: String,
    pub sub_state: String,
    pub load_state: String,
    pub path: String,
}

/// Partial settings layered over [`ConfigOverrides::default_set`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub service_type: Option<String>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub limit_nofile: Option<u64>,
    pub restart: Option<String>,
    pub restart_sec: Option<String>,
}

/// A fully populated unit, ready to be written out with [`generate_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitConfig {
    // [Unit]
    pub description: String,

    // [Service]
    pub service_type: String,
    pub user: String,
    pub group: String,
    pub limit_nofile: u64,
    pub restart: String,
    pub restart_sec: String,
    pub standard_output: String,
    pub standard_error: String,
    pub exec_start: String,

    // [Install]
    pub wanted_by: String,

    /// Where the unit would be installed. Never written by this crate.
    pub save_path: PathBuf,
}
