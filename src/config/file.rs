use std::fs::File;
use std::io::{self, Read};
use std::net::SocketAddr;

use serde::{self, Deserialize};

use super::ConfigError;
use crate::api::{Global, RouteSpec};

pub(super) struct Defaults {}

impl Defaults {
    pub(super) fn api_address() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 50051))
    }
}

/// Config (toml) representation of the daemon config
#[derive(Debug, Deserialize)]
pub(super) struct ServerConfigSpec {
    // Listening address for the JSON-RPC API
    #[serde(default = "Defaults::api_address")]
    pub(super) api_address: SocketAddr,
    // BGP global config, started at boot if present
    pub(super) global: Option<Global>,
    // Static routes originated once BGP is started
    #[serde(default = "Vec::new")]
    pub(super) routes: Vec<RouteSpec>,
}

impl ServerConfigSpec {
    pub(super) fn from_file(path: &str) -> Result<Self, ConfigError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_str(&contents)
    }

    pub(super) fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ServerConfigSpec = toml::from_str(contents)?;
        Ok(config)
    }
}

impl From<ConfigError> for io::Error {
    fn from(err: ConfigError) -> io::Error {
        match err {
            ConfigError::Io(err) => err,
            err => io::Error::new(io::ErrorKind::InvalidData, err.to_string()),
        }
    }
}
