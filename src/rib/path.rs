use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;

use super::{Family, PathAttributes};
use crate::utils::format_time_as_elapsed;

/// Where a path came from
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSource {
    /// Injected through the administrative API
    Api,
    /// Static route from the daemon config file
    Config,
    /// Learned from a BGP neighbor
    Peer {
        address: IpAddr,
        asn: u32,
        router_id: Ipv4Addr,
    },
}

impl PathSource {
    pub fn is_local(&self) -> bool {
        !matches!(self, PathSource::Peer { .. })
    }

    pub fn neighbor(&self) -> Option<IpAddr> {
        match self {
            PathSource::Peer { address, .. } => Some(*address),
            _ => None,
        }
    }
}

impl fmt::Display for PathSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use PathSource::*;
        match self {
            Api => write!(f, "API"),
            Config => write!(f, "Config"),
            Peer { address, .. } => write!(f, "{}", address),
        }
    }
}

/// Identity of a path within a destination: one path per (source, identifier)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathKey {
    pub source: PathSource,
    pub identifier: u32,
}

impl PathKey {
    pub fn new(source: PathSource, identifier: u32) -> Self {
        Self { source, identifier }
    }
}

/// A single route advertisement. Never mutated once inserted into the RIB,
/// an update is a replacement under the same [`PathKey`].
#[derive(Clone, Debug)]
pub struct Path {
    pub family: Family,
    pub prefix: IpNetwork,
    pub attributes: PathAttributes,
    pub identifier: u32,
    pub source: PathSource,
    /// Assigned by the RIB on insertion
    pub(crate) sequence: u64,
    pub(crate) timestamp: DateTime<Utc>,
    /// Cost to reach the next hop. Only set by next hop resolution for
    /// peer-learned paths, locally originated paths never carry one.
    pub igp_metric: Option<u32>,
}

impl Path {
    pub fn new(
        family: Family,
        prefix: IpNetwork,
        attributes: PathAttributes,
        identifier: u32,
        source: PathSource,
    ) -> Self {
        Self {
            family,
            // Host bits are never significant in a NLRI
            prefix: normalize_prefix(prefix),
            attributes,
            identifier,
            source,
            sequence: 0,
            timestamp: Utc::now(),
            igp_metric: None,
        }
    }

    /// Attach a resolved IGP metric, reserved for peer-learned paths
    pub fn with_igp_metric(mut self, metric: u32) -> Self {
        self.igp_metric = Some(metric);
        self
    }

    pub fn key(&self) -> PathKey {
        PathKey::new(self.source, self.identifier)
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<Path {} id={} source={} age={}>",
            self.prefix,
            self.identifier,
            self.source,
            format_time_as_elapsed(self.timestamp),
        )
    }
}

pub fn normalize_prefix(prefix: IpNetwork) -> IpNetwork {
    IpNetwork::new(prefix.network(), prefix.prefix()).unwrap_or(prefix)
}
