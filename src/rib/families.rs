use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use bgp_rs::{AFI, SAFI};
use ipnetwork::IpNetwork;
use serde::{self, Deserialize, Deserializer, Serialize, Serializer};

use super::RibError;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Family {
    pub afi: AFI,
    pub safi: SAFI,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.afi, self.safi)
    }
}

impl Family {
    pub const IPV4_UNICAST: Family = Family {
        afi: AFI::IPV4,
        safi: SAFI::Unicast,
    };
    pub const IPV6_UNICAST: Family = Family {
        afi: AFI::IPV6,
        safi: SAFI::Unicast,
    };

    pub fn new(afi: AFI, safi: SAFI) -> Self {
        Self { afi, safi }
    }

    /// Unicast family for the IP version of a prefix
    pub fn for_prefix(prefix: &IpNetwork) -> Self {
        match prefix {
            IpNetwork::V4(_) => Self::IPV4_UNICAST,
            IpNetwork::V6(_) => Self::IPV6_UNICAST,
        }
    }

    pub fn is_supported(&self) -> bool {
        *self == Self::IPV4_UNICAST || *self == Self::IPV6_UNICAST
    }

    /// Does the IP version of this prefix belong to the family's AFI
    pub fn matches_prefix(&self, prefix: &IpNetwork) -> bool {
        matches!(
            (self.afi, prefix),
            (AFI::IPV4, IpNetwork::V4(_)) | (AFI::IPV6, IpNetwork::V6(_))
        )
    }

    /// Sort key, bgp-rs types don't provide an ordering
    pub fn sort_key(&self) -> (u8, u8) {
        let afi = match self.afi {
            AFI::IPV4 => 1,
            AFI::IPV6 => 2,
            _ => u8::MAX,
        };
        let safi = match self.safi {
            SAFI::Unicast => 1,
            _ => u8::MAX,
        };
        (afi, safi)
    }
}

impl FromStr for Family {
    type Err = RibError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "IPv6 Unicast", "ipv6-unicast" or "ipv6_unicast"
        let parts: Vec<&str> = s
            .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
            .filter(|part| !part.is_empty())
            .collect();
        if parts.len() != 2 {
            return Err(RibError::InvalidFamily(s.to_string()));
        }
        let afi = match parts[0].to_lowercase().as_str() {
            "ipv4" => AFI::IPV4,
            "ipv6" => AFI::IPV6,
            _ => return Err(RibError::InvalidFamily(s.to_string())),
        };
        let safi = match parts[1].to_lowercase().as_str() {
            "unicast" => SAFI::Unicast,
            _ => return Err(RibError::InvalidFamily(s.to_string())),
        };
        Ok(Family::new(afi, safi))
    }
}

impl Serialize for Family {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Family {
    fn deserialize<D>(deserializer: D) -> Result<Family, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.trim().parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Families(HashSet<Family>);

impl Families {
    pub fn new(families: Vec<Family>) -> Self {
        Self(families.into_iter().collect())
    }

    pub fn contains(&self, family: Family) -> bool {
        self.0.contains(&family)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::collections::hash_set::Iter<Family> {
        self.0.iter()
    }

    /// Families in a stable order (IPv4 before IPv6)
    pub fn sorted(&self) -> Vec<Family> {
        let mut families: Vec<_> = self.0.iter().cloned().collect();
        families.sort_by_key(Family::sort_key);
        families
    }
}

impl Default for Families {
    fn default() -> Self {
        Self::new(vec![Family::IPV4_UNICAST, Family::IPV6_UNICAST])
    }
}
