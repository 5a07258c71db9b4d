use std::path::PathBuf;

use envconfig::Envconfig;

#[derive(Envconfig)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3302")]
    pub port: u16,

    #[envconfig(default = "./data")]
    pub data_root: PathBuf,

    #[envconfig(default = "30")]
    pub retention_days: u64,

    #[envconfig(default = "3600")]
    pub cleanup_interval_secs: u64,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,
}

impl Config {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
