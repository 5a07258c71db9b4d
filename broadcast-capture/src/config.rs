use std::net::SocketAddr;
use std::path::PathBuf;

use envconfig::Envconfig;
use tracing::Level;

use crate::auth::ApiKeys;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "127.0.0.1:8080")]
    pub address: SocketAddr,

    /// Root of the event log, dead letters, live HLS and exports.
    #[envconfig(default = "./data")]
    pub data_root: PathBuf,

    #[envconfig(default = "./schemas")]
    pub schema_dir: PathBuf,

    #[envconfig(default = "admin:CHANGE_ME,ingest:CHANGE_ME")]
    pub api_keys: ApiKeys, // "<role>:<key>,<role>:<key>"

    #[envconfig(default = "5242880")]
    pub max_body_bytes: usize,

    #[envconfig(default = "1024")]
    pub index_queue_capacity: usize,

    #[envconfig(default = "4")]
    pub index_concurrency: usize,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,

    pub otel_url: Option<String>,

    #[envconfig(default = "1.0")]
    pub otel_sampling_rate: f64,

    #[envconfig(default = "broadcast-capture")]
    pub otel_service_name: String,

    #[envconfig(default = "info")]
    pub log_level: Level,
}
