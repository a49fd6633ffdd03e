use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;

use crate::error::Error;

/// Gatehouse server configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "gatehouse")]
#[command(about = "Policy decision point for authorization checks")]
pub struct Config {
    /// HTTP server listen address
    #[arg(long, default_value = "0.0.0.0:6174", env = "GATEHOUSE_LISTEN_ADDR")]
    pub listen_addr: String,

    /// Storage backend: file:{path}, etcd:{url} or memory
    #[arg(long, default_value = "file:/tmp/gatehouse", env = "GATESTORAGE")]
    pub storage: String,

    /// Per-call deadline for persistence operations in seconds
    #[arg(long, default_value = "10", env = "GATEHOUSE_STORAGE_TIMEOUT_SECS")]
    pub storage_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Enable graceful shutdown on SIGINT/SIGTERM
    #[arg(long, default_value = "true", env = "GATEHOUSE_GRACEFUL_SHUTDOWN")]
    pub graceful_shutdown: bool,
}

impl Config {
    pub fn storage_backend(&self) -> Result<StorageBackend, Error> {
        self.storage.parse()
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_secs)
    }
}

/// Parsed form of the `GATESTORAGE` selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    File(PathBuf),
    Etcd(String),
    Memory,
}

impl FromStr for StorageBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("file", path)) if !path.is_empty() => {
                Ok(StorageBackend::File(PathBuf::from(path)))
            }
            Some(("etcd", url)) if !url.is_empty() => Ok(StorageBackend::Etcd(url.to_string())),
            Some(("memory", "")) => Ok(StorageBackend::Memory),
            None if s == "memory" => Ok(StorageBackend::Memory),
            _ => Err(Error::invalid(format!("unrecognized storage selector: {s}"))),
        }
    }
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::File(path) => write!(f, "file:{}", path.display()),
            StorageBackend::Etcd(url) => write!(f, "etcd:{url}"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}
