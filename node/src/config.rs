//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use presence_store::GeofenceConfig;
use presence_types::{
    GeoPoint, PipelineParams, Role, DEFAULT_GEOFENCE_CENTER, DEFAULT_GEOFENCE_RADIUS_M,
};

use crate::logging::LogFormat;
use crate::NodeError;

/// Where records are persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Lmdb,
    /// Process memory only; everything is lost on exit.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lmdb" => Ok(StoreBackend::Lmdb),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Lmdb => f.write_str("lmdb"),
            StoreBackend::Memory => f.write_str("memory"),
        }
    }
}

/// The geofence used until an administrator persists one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeofenceSection {
    pub center_lat: f64,
    pub center_lng: f64,
    pub radius_m: f64,
}

impl Default for GeofenceSection {
    fn default() -> Self {
        Self {
            center_lat: DEFAULT_GEOFENCE_CENTER.lat,
            center_lng: DEFAULT_GEOFENCE_CENTER.lng,
            radius_m: DEFAULT_GEOFENCE_RADIUS_M,
        }
    }
}

impl GeofenceSection {
    pub fn seed(&self) -> Result<GeofenceConfig, NodeError> {
        let seed = GeofenceConfig::seeded(
            GeoPoint::new(self.center_lat, self.center_lng),
            self.radius_m,
        );
        if !seed.is_valid() {
            return Err(NodeError::Config(format!(
                "invalid [geofence]: center ({}, {}), radius {}",
                self.center_lat, self.center_lng, self.radius_m
            )));
        }
        Ok(seed)
    }
}

/// One `[[principals]]` entry of the static role directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalEntry {
    pub user_id: String,
    pub role: Role,
}

/// Configuration for an attendance node.
///
/// Loaded from a TOML file via [`NodeConfig::from_toml_file`] or built
/// programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Data directory for LMDB storage.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub backend: StoreBackend,

    /// LMDB map size in bytes.
    #[serde(default = "default_map_size")]
    pub lmdb_map_size: usize,

    #[serde(default = "default_true")]
    pub enable_rpc: bool,

    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    #[serde(default)]
    pub enable_websocket: bool,

    #[serde(default = "default_ws_port")]
    pub websocket_port: u16,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter, e.g. "info" or "debug,presence_verification=trace".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub geofence: GeofenceSection,

    #[serde(default)]
    pub pipeline: PipelineParams,

    /// Users with a role other than student. Everyone else is a student.
    #[serde(default)]
    pub principals: Vec<PrincipalEntry>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./presence_data")
}

fn default_map_size() -> usize {
    presence_store_lmdb::DEFAULT_MAP_SIZE
}

fn default_true() -> bool {
    true
}

fn default_rpc_port() -> u16 {
    7090
}

fn default_ws_port() -> u16 {
    7091
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl NodeConfig {
    pub fn from_toml_file(path: &std::path::Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        self.log_format.parse().map_err(NodeError::Config)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backend: StoreBackend::default(),
            lmdb_map_size: default_map_size(),
            enable_rpc: default_true(),
            rpc_port: default_rpc_port(),
            enable_websocket: false,
            websocket_port: default_ws_port(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            geofence: GeofenceSection::default(),
            pipeline: PipelineParams::default(),
            principals: Vec::new(),
        }
    }
}
