//! Conversion between API paths (typed containers) and RIB paths

use std::net::IpAddr;

use bgp_rs::{ASPath, Origin, Segment};
use ipnetwork::IpNetwork;
use log::trace;
use thiserror::Error;

use super::any::{
    Any, AsPathAttribute, AsSegment, CommunitiesAttribute, IpAddressPrefix, LocalPrefAttribute,
    MpReachNlriAttribute, MultiExitDiscAttribute, NextHopAttribute, OriginAttribute,
    TypedMessage, AS_SEQUENCE, AS_SET,
};
use super::rpc;
use crate::config::GlobalConfig;
use crate::rib::{
    normalize_prefix, Attribute, AttributeError, CommunityList, Destination, Family, MpReachNlri,
    Path, PathAttributes, PathFilter, PathKey, PathSource,
};

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("Path has no NLRI")]
    MissingNlri,
    #[error("NLRI must be an IPAddressPrefix, got '{0}'")]
    UnexpectedNlri(String),
    #[error("Malformed {type_url}: {reason}")]
    Malformed { type_url: String, reason: String },
    #[error("Invalid prefix '{0}'")]
    InvalidPrefix(String),
    #[error("Invalid next hop '{0}'")]
    InvalidNextHop(String),
    #[error("Invalid origin {0}")]
    InvalidOrigin(u32),
    #[error("Invalid AS_PATH segment type {0}")]
    InvalidSegmentType(u32),
    #[error("Prefix {prefix} doesn't belong to {family}")]
    PrefixFamilyMismatch { family: Family, prefix: IpNetwork },
    #[error("MP_REACH_NLRI family {attribute} doesn't match path family {path}")]
    MpReachFamilyMismatch { path: Family, attribute: Family },
    #[error("MP_REACH_NLRI for {family} carries NLRI {prefix}")]
    MpReachForeignNlri { family: Family, prefix: IpNetwork },
    #[error("MP_REACH_NLRI doesn't carry the path NLRI {0}")]
    MpReachNlriMismatch(IpNetwork),
    #[error("Path has no next hop")]
    MissingNextHop,
    #[error("Next hop {next_hop} can't be used for {family}")]
    NextHopFamilyMismatch { family: Family, next_hop: IpAddr },
    #[error(transparent)]
    Attribute(#[from] AttributeError),
}

fn unpack<T: TypedMessage>(any: &Any) -> Result<Option<T>, DecodeError> {
    match any.unpack::<T>() {
        Some(Ok(message)) => Ok(Some(message)),
        Some(Err(err)) => Err(DecodeError::Malformed {
            type_url: any.type_url.clone(),
            reason: err.to_string(),
        }),
        None => Ok(None),
    }
}

pub fn decode_prefix(any: &Any) -> Result<IpNetwork, DecodeError> {
    let message: IpAddressPrefix = match unpack(any)? {
        Some(message) => message,
        None => return Err(DecodeError::UnexpectedNlri(any.type_url.clone())),
    };
    let invalid = || DecodeError::InvalidPrefix(format!("{}/{}", message.prefix, message.prefix_len));
    let addr: IpAddr = message.prefix.parse().map_err(|_| invalid())?;
    IpNetwork::new(addr, message.prefix_len)
        .map(normalize_prefix)
        .map_err(|_| invalid())
}

fn decode_origin(origin: u32) -> Result<Origin, DecodeError> {
    match origin {
        0 => Ok(Origin::IGP),
        1 => Ok(Origin::EGP),
        2 => Ok(Origin::INCOMPLETE),
        other => Err(DecodeError::InvalidOrigin(other)),
    }
}

fn decode_as_path(message: AsPathAttribute) -> Result<ASPath, DecodeError> {
    let segments = message
        .segments
        .into_iter()
        .map(|segment| match segment.segment_type {
            AS_SET => Ok(Segment::AS_SET(segment.numbers)),
            AS_SEQUENCE => Ok(Segment::AS_SEQUENCE(segment.numbers)),
            other => Err(DecodeError::InvalidSegmentType(other)),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ASPath { segments })
}

fn decode_next_hop(next_hop: &str) -> Result<IpAddr, DecodeError> {
    next_hop
        .parse()
        .map_err(|_| DecodeError::InvalidNextHop(next_hop.to_string()))
}

/// Decode one attribute container, unknown types are kept opaque
pub fn decode_attribute(any: &Any) -> Result<Attribute, DecodeError> {
    if let Some(message) = unpack::<OriginAttribute>(any)? {
        return Ok(Attribute::Origin(decode_origin(message.origin)?));
    }
    if let Some(message) = unpack::<AsPathAttribute>(any)? {
        return Ok(Attribute::AsPath(decode_as_path(message)?));
    }
    if let Some(message) = unpack::<NextHopAttribute>(any)? {
        // NEXT_HOP only carries IPv4, others go through MP_REACH_NLRI
        return match decode_next_hop(&message.next_hop)? {
            IpAddr::V4(addr) => Ok(Attribute::NextHop(IpAddr::V4(addr))),
            IpAddr::V6(_) => Err(DecodeError::InvalidNextHop(message.next_hop)),
        };
    }
    if let Some(message) = unpack::<MultiExitDiscAttribute>(any)? {
        return Ok(Attribute::MultiExitDisc(message.med));
    }
    if let Some(message) = unpack::<LocalPrefAttribute>(any)? {
        return Ok(Attribute::LocalPref(message.local_pref));
    }
    if let Some(message) = unpack::<CommunitiesAttribute>(any)? {
        return Ok(Attribute::Communities(CommunityList::from(message.communities)));
    }
    if let Some(message) = unpack::<MpReachNlriAttribute>(any)? {
        let next_hops = message
            .next_hops
            .iter()
            .map(|nh| decode_next_hop(nh))
            .collect::<Result<Vec<_>, _>>()?;
        let nlris = message
            .nlris
            .iter()
            .map(decode_prefix)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Attribute::MpReachNlri(MpReachNlri {
            family: message.family,
            next_hops,
            nlris,
        }));
    }
    trace!("Keeping unknown attribute {}", any.type_url);
    Ok(Attribute::Unknown {
        type_url: any.type_url.clone(),
        value: any.value.clone(),
    })
}

pub fn decode_attributes(pattrs: &[Any]) -> Result<PathAttributes, DecodeError> {
    let attributes = pattrs
        .iter()
        .map(decode_attribute)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PathAttributes::from_attributes(attributes)?)
}

/// Build a RIB path from an API path, checking that the NLRI, the family and
/// the next hop agree with each other
pub fn decode_path(path: &rpc::Path, source: PathSource) -> Result<Path, DecodeError> {
    let family = path.family;
    let prefix = match &path.nlri {
        Some(nlri) => decode_prefix(nlri)?,
        None => return Err(DecodeError::MissingNlri),
    };
    if !family.matches_prefix(&prefix) {
        return Err(DecodeError::PrefixFamilyMismatch { family, prefix });
    }
    let attributes = decode_attributes(&path.pattrs)?;

    if let Some(mp_reach) = attributes.mp_reach_nlri() {
        if mp_reach.family != family {
            return Err(DecodeError::MpReachFamilyMismatch {
                path: family,
                attribute: mp_reach.family,
            });
        }
        if let Some(foreign) = mp_reach
            .nlris
            .iter()
            .find(|nlri| !mp_reach.family.matches_prefix(nlri))
        {
            return Err(DecodeError::MpReachForeignNlri {
                family: mp_reach.family,
                prefix: *foreign,
            });
        }
        if !mp_reach.nlris.is_empty() && !mp_reach.nlris.contains(&prefix) {
            return Err(DecodeError::MpReachNlriMismatch(prefix));
        }
        if let Some(next_hop) = mp_reach.next_hops.iter().find(|nh| !same_version(nh, &prefix)) {
            return Err(DecodeError::NextHopFamilyMismatch {
                family,
                next_hop: *next_hop,
            });
        }
    }
    let next_hop = attributes.next_hop().ok_or(DecodeError::MissingNextHop)?;
    if !same_version(&next_hop, &prefix) {
        return Err(DecodeError::NextHopFamilyMismatch { family, next_hop });
    }

    Ok(Path::new(family, prefix, attributes, path.identifier, source))
}

/// Prefix and key of the API path to withdraw, attributes are ignored
pub fn decode_withdraw(path: &rpc::Path) -> Result<(IpNetwork, PathKey), DecodeError> {
    let prefix = match &path.nlri {
        Some(nlri) => decode_prefix(nlri)?,
        None => return Err(DecodeError::MissingNlri),
    };
    if !path.family.matches_prefix(&prefix) {
        return Err(DecodeError::PrefixFamilyMismatch {
            family: path.family,
            prefix,
        });
    }
    Ok((prefix, PathKey::new(PathSource::Api, path.identifier)))
}

fn same_version(addr: &IpAddr, prefix: &IpNetwork) -> bool {
    addr.is_ipv4() == prefix.is_ipv4()
}

pub fn encode_prefix(prefix: &IpNetwork) -> Result<Any, serde_json::Error> {
    Any::pack(&IpAddressPrefix {
        prefix: prefix.network().to_string(),
        prefix_len: prefix.prefix(),
    })
}

pub fn encode_attribute(attribute: &Attribute) -> Result<Any, serde_json::Error> {
    match attribute {
        Attribute::Origin(origin) => Any::pack(&OriginAttribute {
            origin: match origin {
                Origin::IGP => 0,
                Origin::EGP => 1,
                Origin::INCOMPLETE => 2,
            },
        }),
        Attribute::AsPath(as_path) => Any::pack(&AsPathAttribute {
            segments: as_path
                .segments
                .iter()
                .map(|segment| match segment {
                    Segment::AS_SET(asns) => AsSegment {
                        segment_type: AS_SET,
                        numbers: asns.clone(),
                    },
                    Segment::AS_SEQUENCE(asns) => AsSegment {
                        segment_type: AS_SEQUENCE,
                        numbers: asns.clone(),
                    },
                })
                .collect(),
        }),
        Attribute::NextHop(next_hop) => Any::pack(&NextHopAttribute {
            next_hop: next_hop.to_string(),
        }),
        Attribute::MultiExitDisc(med) => Any::pack(&MultiExitDiscAttribute { med: *med }),
        Attribute::LocalPref(local_pref) => Any::pack(&LocalPrefAttribute {
            local_pref: *local_pref,
        }),
        Attribute::Communities(communities) => Any::pack(&CommunitiesAttribute {
            communities: communities.values(),
        }),
        Attribute::MpReachNlri(mp_reach) => Any::pack(&MpReachNlriAttribute {
            family: mp_reach.family,
            next_hops: mp_reach.next_hops.iter().map(|nh| nh.to_string()).collect(),
            nlris: mp_reach
                .nlris
                .iter()
                .map(encode_prefix)
                .collect::<Result<Vec<_>, _>>()?,
        }),
        Attribute::Unknown { type_url, value } => Ok(Any {
            type_url: type_url.clone(),
            value: value.clone(),
        }),
    }
}

pub fn encode_path(path: &Path, best: bool) -> Result<rpc::Path, serde_json::Error> {
    let pattrs = path
        .attributes
        .iter()
        .map(encode_attribute)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rpc::Path {
        family: path.family,
        nlri: Some(encode_prefix(&path.prefix)?),
        pattrs,
        identifier: path.identifier,
        best,
        source: Some(path.source.to_string()),
        neighbor: path.source.neighbor(),
        received_at: Some(path.timestamp().timestamp()),
    })
}

/// Encode a destination snapshot, best paths first. Paths not matching the
/// filter's source are left out.
pub fn encode_destination(
    destination: &Destination,
    config: &GlobalConfig,
    filter: &PathFilter,
    best_path_only: bool,
) -> Result<rpc::Destination, serde_json::Error> {
    let paths = if best_path_only {
        destination.best_paths().to_vec()
    } else {
        destination.ranked(config)
    };
    let paths = paths
        .iter()
        .filter(|path| filter.matches_path(path))
        .map(|path| encode_path(path, destination.is_best(&path.key())))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rpc::Destination {
        prefix: destination.prefix().to_string(),
        paths,
    })
}

/// NEXT_HOP for IPv4, MP_REACH_NLRI otherwise
pub fn next_hop_attribute(family: Family, prefix: IpNetwork, next_hop: IpAddr) -> Attribute {
    match (prefix, next_hop) {
        (IpNetwork::V4(_), IpAddr::V4(_)) => Attribute::NextHop(next_hop),
        _ => Attribute::MpReachNlri(MpReachNlri {
            family,
            next_hops: vec![next_hop],
            nlris: vec![prefix],
        }),
    }
}
