mod file;

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use thiserror::Error;

use crate::api::{Global, RouteSpec};
use crate::rib::{Families, Family, PathSource};
use crate::utils::{parse_route_spec, ParseError};

pub const DEFAULT_LOCAL_PREF: u32 = 100;
pub const DEFAULT_BGP_PORT: u16 = 179;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid AS number {0}")]
    InvalidAsn(u32),
    #[error("Invalid router-id '{0}'")]
    InvalidRouterId(String),
    #[error("Invalid listen port {0}")]
    InvalidListenPort(i32),
    #[error("Invalid listen address '{0}'")]
    InvalidListenAddress(String),
    #[error("Unsupported family {0}")]
    UnsupportedFamily(Family),
    #[error("Invalid static route: {0}")]
    InvalidRoute(#[from] ParseError),
    #[error("Error reading config: {0}")]
    Io(#[from] io::Error),
    #[error("Error parsing config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Parse a TOML config file and return a ServerConfig
pub fn from_file(path: &str) -> Result<ServerConfig, ConfigError> {
    let spec = file::ServerConfigSpec::from_file(path)?;
    ServerConfig::from_spec(spec)
}

/// Daemon config: where to serve the API and what to start with
#[derive(Debug)]
pub struct ServerConfig {
    pub api_address: SocketAddr,
    /// BGP is started at boot when present, otherwise it waits for `start_bgp`
    pub global: Option<Global>,
    pub static_routes: Vec<RouteSpec>,
}

impl ServerConfig {
    fn from_spec(spec: file::ServerConfigSpec) -> Result<Self, ConfigError> {
        if let Some(global) = &spec.global {
            // Fail at load time rather than when BGP is started
            GlobalConfig::from_global(global)?;
        }
        for route in &spec.routes {
            parse_route_spec(route, PathSource::Config)?;
        }
        Ok(Self {
            api_address: spec.api_address,
            global: spec.global,
            static_routes: spec.routes,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_address: file::Defaults::api_address(),
            global: None,
            static_routes: vec![],
        }
    }
}

/// Process-wide BGP identity, fixed from StartBgp until StopBgp
#[derive(Clone, Debug, PartialEq)]
pub struct GlobalConfig {
    pub asn: u32,
    pub router_id: Ipv4Addr,
    /// -1 disables the peer listener
    pub listen_port: i32,
    pub listen_addresses: Vec<IpAddr>,
    pub families: Families,
    pub use_multiple_paths: bool,
    pub default_local_pref: u32,
}

impl GlobalConfig {
    pub fn new(asn: u32, router_id: Ipv4Addr) -> Self {
        Self {
            asn,
            router_id,
            listen_port: -1,
            listen_addresses: default_listen_addresses(),
            families: Families::default(),
            use_multiple_paths: false,
            default_local_pref: DEFAULT_LOCAL_PREF,
        }
    }

    pub fn from_global(global: &Global) -> Result<Self, ConfigError> {
        if global.asn == 0 {
            return Err(ConfigError::InvalidAsn(global.asn));
        }
        let router_id: Ipv4Addr = global
            .router_id
            .parse()
            .map_err(|_| ConfigError::InvalidRouterId(global.router_id.clone()))?;
        if router_id.is_unspecified() {
            return Err(ConfigError::InvalidRouterId(global.router_id.clone()));
        }
        if global.listen_port < -1 || global.listen_port > i32::from(u16::MAX) {
            return Err(ConfigError::InvalidListenPort(global.listen_port));
        }
        let listen_addresses = if global.listen_addresses.is_empty() {
            default_listen_addresses()
        } else {
            global
                .listen_addresses
                .iter()
                .map(|addr| {
                    addr.parse()
                        .map_err(|_| ConfigError::InvalidListenAddress(addr.clone()))
                })
                .collect::<Result<Vec<IpAddr>, _>>()?
        };
        if let Some(family) = global.families.iter().find(|f| !f.is_supported()) {
            return Err(ConfigError::UnsupportedFamily(*family));
        }
        let families = if global.families.is_empty() {
            Families::default()
        } else {
            Families::new(global.families.clone())
        };

        Ok(Self {
            asn: global.asn,
            router_id,
            listen_port: global.listen_port,
            listen_addresses,
            families,
            use_multiple_paths: global.use_multiple_paths,
            default_local_pref: global.default_local_pref.unwrap_or(DEFAULT_LOCAL_PREF),
        })
    }

    pub fn to_global(&self) -> Global {
        Global {
            asn: self.asn,
            router_id: self.router_id.to_string(),
            listen_port: self.listen_port,
            listen_addresses: self
                .listen_addresses
                .iter()
                .map(|addr| addr.to_string())
                .collect(),
            families: self.families.sorted(),
            use_multiple_paths: self.use_multiple_paths,
            default_local_pref: Some(self.default_local_pref),
        }
    }

    /// Port for the peer-facing listener, `None` when it should not be opened.
    /// Independent of the administrative API, which always runs.
    pub fn peer_listen_port(&self) -> Option<u16> {
        match self.listen_port {
            -1 => None,
            0 => Some(DEFAULT_BGP_PORT),
            port => u16::try_from(port).ok(),
        }
    }
}

fn default_listen_addresses() -> Vec<IpAddr> {
    vec![IpAddr::from(Ipv4Addr::UNSPECIFIED)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global() -> Global {
        Global {
            asn: 65003,
            router_id: "10.0.255.254".to_string(),
            listen_port: -1,
            listen_addresses: vec![],
            families: vec![Family::IPV6_UNICAST],
            use_multiple_paths: true,
            default_local_pref: None,
        }
    }

    #[test]
    fn test_from_global() {
        let config = GlobalConfig::from_global(&global()).unwrap();
        assert_eq!(config.asn, 65003);
        assert_eq!(config.router_id, Ipv4Addr::new(10, 0, 255, 254));
        assert!(config.families.contains(Family::IPV6_UNICAST));
        assert!(!config.families.contains(Family::IPV4_UNICAST));
        assert!(config.use_multiple_paths);
        assert_eq!(config.default_local_pref, DEFAULT_LOCAL_PREF);
        assert_eq!(config.peer_listen_port(), None);
        assert_eq!(GlobalConfig::from_global(&config.to_global()).unwrap(), config);
    }

    #[test]
    fn test_empty_families_enable_unicast() {
        let mut spec = global();
        spec.families = vec![];
        let config = GlobalConfig::from_global(&spec).unwrap();
        assert_eq!(config.families, Families::default());
    }

    #[test]
    fn test_listen_port() {
        let mut spec = global();
        spec.listen_port = 0;
        assert_eq!(
            GlobalConfig::from_global(&spec).unwrap().peer_listen_port(),
            Some(DEFAULT_BGP_PORT)
        );
        spec.listen_port = 1179;
        assert_eq!(
            GlobalConfig::from_global(&spec).unwrap().peer_listen_port(),
            Some(1179)
        );
        spec.listen_port = -2;
        assert!(matches!(
            GlobalConfig::from_global(&spec),
            Err(ConfigError::InvalidListenPort(-2))
        ));
    }

    #[test]
    fn test_invalid_global() {
        let mut spec = global();
        spec.router_id = "not-an-ip".to_string();
        assert!(matches!(
            GlobalConfig::from_global(&spec),
            Err(ConfigError::InvalidRouterId(_))
        ));

        let mut spec = global();
        spec.asn = 0;
        assert!(matches!(
            GlobalConfig::from_global(&spec),
            Err(ConfigError::InvalidAsn(0))
        ));
    }
}
