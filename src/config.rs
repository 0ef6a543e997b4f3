use crate::core_logic::date_parsing::DEFAULT_MAX_YEAR;
use crate::error::ConfigError;
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Directory holding `datasets.csv` and `metadata.json`.
    pub data_dir: PathBuf,
    /// Rayon worker stack size in bytes.
    pub worker_stack_size: usize,
    pub max_results: usize,
    pub max_year: i32,
    /// Where the pairwise scan appends highly correlated partners.
    pub pairwise_output: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8001,
            data_dir: PathBuf::from("data"),
            worker_stack_size: 32 * 1024 * 1024, // 32 MB
            max_results: 100,
            max_year: DEFAULT_MAX_YEAR,
            pairwise_output: PathBuf::from("correlated_datasets.csv"),
        }
    }
}

impl ServiceConfig {
    /// Reads the process environment. Call `dotenv::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = ServiceConfig::default();
        let stack_size_mb: usize = parse_or(&lookup, "WORKER_STACK_SIZE_MB", 32)?;

        Ok(ServiceConfig {
            host: parse_or(&lookup, "HOST", defaults.host)?,
            port: parse_or(&lookup, "PORT", defaults.port)?,
            data_dir: lookup("DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            worker_stack_size: stack_size_mb * 1024 * 1024,
            max_results: parse_or(&lookup, "MAX_RESULTS", defaults.max_results)?,
            max_year: parse_or(&lookup, "MAX_YEAR", defaults.max_year)?,
            pairwise_output: lookup("PAIRWISE_OUTPUT")
                .map_or(defaults.pairwise_output, PathBuf::from),
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
