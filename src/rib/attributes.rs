use std::fmt;
use std::net::IpAddr;

use bgp_rs::{ASPath, Origin, Segment};
use ipnetwork::IpNetwork;
use thiserror::Error;

use super::{CommunityList, Family};
use crate::utils::u32_to_dotted;

#[derive(Debug, Error, PartialEq)]
pub enum AttributeError {
    #[error("Duplicate {0} attribute")]
    Duplicate(AttributeKind),
}

/// Tag of an [`Attribute`], at most one attribute per tag on a path
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeKind {
    Origin,
    AsPath,
    NextHop,
    MultiExitDisc,
    LocalPref,
    Communities,
    MpReachNlri,
    Unknown(String),
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use AttributeKind::*;
        match self {
            Origin => write!(f, "ORIGIN"),
            AsPath => write!(f, "AS_PATH"),
            NextHop => write!(f, "NEXT_HOP"),
            MultiExitDisc => write!(f, "MULTI_EXIT_DISC"),
            LocalPref => write!(f, "LOCAL_PREF"),
            Communities => write!(f, "COMMUNITIES"),
            MpReachNlri => write!(f, "MP_REACH_NLRI"),
            Unknown(type_url) => write!(f, "UNKNOWN({})", type_url),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MpReachNlri {
    pub family: Family,
    pub next_hops: Vec<IpAddr>,
    pub nlris: Vec<IpNetwork>,
}

#[derive(Clone, Debug)]
pub enum Attribute {
    Origin(Origin),
    AsPath(ASPath),
    NextHop(IpAddr),
    MultiExitDisc(u32),
    LocalPref(u32),
    Communities(CommunityList),
    MpReachNlri(MpReachNlri),
    /// Attribute type this speaker doesn't interpret, kept as received
    Unknown { type_url: String, value: Vec<u8> },
}

impl Attribute {
    pub fn kind(&self) -> AttributeKind {
        match self {
            Attribute::Origin(_) => AttributeKind::Origin,
            Attribute::AsPath(_) => AttributeKind::AsPath,
            Attribute::NextHop(_) => AttributeKind::NextHop,
            Attribute::MultiExitDisc(_) => AttributeKind::MultiExitDisc,
            Attribute::LocalPref(_) => AttributeKind::LocalPref,
            Attribute::Communities(_) => AttributeKind::Communities,
            Attribute::MpReachNlri(_) => AttributeKind::MpReachNlri,
            Attribute::Unknown { type_url, .. } => AttributeKind::Unknown(type_url.clone()),
        }
    }
}

// bgp-rs doesn't implement PartialEq for Origin and ASPath
impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        use Attribute::*;
        match (self, other) {
            (Origin(a), Origin(b)) => origin_rank(a) == origin_rank(b),
            (AsPath(a), AsPath(b)) => as_path_eq(a, b),
            (NextHop(a), NextHop(b)) => a == b,
            (MultiExitDisc(a), MultiExitDisc(b)) => a == b,
            (LocalPref(a), LocalPref(b)) => a == b,
            (Communities(a), Communities(b)) => a == b,
            (MpReachNlri(a), MpReachNlri(b)) => a == b,
            (
                Unknown {
                    type_url: url_a,
                    value: value_a,
                },
                Unknown {
                    type_url: url_b,
                    value: value_b,
                },
            ) => url_a == url_b && value_a == value_b,
            _ => false,
        }
    }
}

/// Ordered attributes of a single path
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathAttributes(Vec<Attribute>);

impl PathAttributes {
    pub fn from_attributes(attributes: Vec<Attribute>) -> Result<Self, AttributeError> {
        let mut seen = Vec::with_capacity(attributes.len());
        for attr in &attributes {
            let kind = attr.kind();
            if seen.contains(&kind) {
                return Err(AttributeError::Duplicate(kind));
            }
            seen.push(kind);
        }
        Ok(Self(attributes))
    }

    pub fn iter(&self) -> std::slice::Iter<Attribute> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, kind: &AttributeKind) -> Option<&Attribute> {
        self.0.iter().find(|attr| &attr.kind() == kind)
    }

    /// Missing ORIGIN is treated as INCOMPLETE
    pub fn origin(&self) -> Origin {
        self.0
            .iter()
            .find_map(|attr| match attr {
                Attribute::Origin(origin) => Some(origin.clone()),
                _ => None,
            })
            .unwrap_or(Origin::INCOMPLETE)
    }

    pub fn as_path(&self) -> Option<&ASPath> {
        self.0.iter().find_map(|attr| match attr {
            Attribute::AsPath(as_path) => Some(as_path),
            _ => None,
        })
    }

    /// Next hop from MP_REACH_NLRI first, falling back to NEXT_HOP
    pub fn next_hop(&self) -> Option<IpAddr> {
        self.mp_reach_nlri()
            .and_then(|mp| mp.next_hops.first().copied())
            .or_else(|| {
                self.0.iter().find_map(|attr| match attr {
                    Attribute::NextHop(next_hop) => Some(*next_hop),
                    _ => None,
                })
            })
    }

    pub fn local_pref(&self) -> Option<u32> {
        self.0.iter().find_map(|attr| match attr {
            Attribute::LocalPref(local_pref) => Some(*local_pref),
            _ => None,
        })
    }

    pub fn multi_exit_disc(&self) -> Option<u32> {
        self.0.iter().find_map(|attr| match attr {
            Attribute::MultiExitDisc(med) => Some(*med),
            _ => None,
        })
    }

    pub fn communities(&self) -> Option<&CommunityList> {
        self.0.iter().find_map(|attr| match attr {
            Attribute::Communities(communities) => Some(communities),
            _ => None,
        })
    }

    pub fn mp_reach_nlri(&self) -> Option<&MpReachNlri> {
        self.0.iter().find_map(|attr| match attr {
            Attribute::MpReachNlri(mp) => Some(mp),
            _ => None,
        })
    }
}

/// Rank used by the decision process (IGP < EGP < INCOMPLETE)
pub fn origin_rank(origin: &Origin) -> u8 {
    match origin {
        Origin::IGP => 0,
        Origin::EGP => 1,
        Origin::INCOMPLETE => 2,
    }
}

/// AS_PATH length as counted by the decision process, an AS_SET counts as one
pub fn as_path_length(as_path: &ASPath) -> usize {
    as_path
        .segments
        .iter()
        .map(|segment| match segment {
            Segment::AS_SEQUENCE(asns) => asns.len(),
            Segment::AS_SET(asns) => usize::from(!asns.is_empty()),
        })
        .sum()
}

/// Same segment types holding the same ASNs, in order
pub fn as_path_eq(a: &ASPath, b: &ASPath) -> bool {
    a.segments.len() == b.segments.len()
        && a.segments
            .iter()
            .zip(b.segments.iter())
            .all(|pair| match pair {
                (Segment::AS_SEQUENCE(a), Segment::AS_SEQUENCE(b)) => a == b,
                (Segment::AS_SET(a), Segment::AS_SET(b)) => a == b,
                _ => false,
            })
}

/// Leftmost AS of the path (the neighboring AS)
pub fn as_path_neighbor(as_path: &ASPath) -> Option<u32> {
    match as_path.segments.first() {
        Some(Segment::AS_SEQUENCE(asns)) => asns.first().copied(),
        _ => None,
    }
}

pub fn as_path_to_string(as_path: &ASPath) -> String {
    as_path
        .segments
        .iter()
        .map(|segment| match segment {
            Segment::AS_SEQUENCE(asns) => asns
                .iter()
                .map(|asn| u32_to_dotted(*asn, '.'))
                .collect::<Vec<String>>()
                .join(" "),
            Segment::AS_SET(asns) => format!(
                "{{{}}}",
                asns.iter()
                    .map(|asn| u32_to_dotted(*asn, '.'))
                    .collect::<Vec<String>>()
                    .join(",")
            ),
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_attributes() {
        let attrs = vec![
            Attribute::Origin(Origin::IGP),
            Attribute::NextHop("1.1.1.1".parse().unwrap()),
            Attribute::Origin(Origin::EGP),
        ];
        assert_eq!(
            PathAttributes::from_attributes(attrs),
            Err(AttributeError::Duplicate(AttributeKind::Origin))
        );

        // Unknown attributes are only duplicates when the type matches
        let attrs = vec![
            Attribute::Unknown {
                type_url: "a".to_string(),
                value: vec![1],
            },
            Attribute::Unknown {
                type_url: "b".to_string(),
                value: vec![1],
            },
        ];
        assert!(PathAttributes::from_attributes(attrs).is_ok());
    }

    #[test]
    fn test_attribute_defaults() {
        let attrs = PathAttributes::default();
        assert_eq!(origin_rank(&attrs.origin()), 2);
        assert!(attrs.as_path().is_none());
        assert!(attrs.local_pref().is_none());
        assert!(attrs.next_hop().is_none());
    }

    #[test]
    fn test_next_hop_prefers_mp_reach() {
        let attrs = PathAttributes::from_attributes(vec![
            Attribute::NextHop("10.0.0.1".parse().unwrap()),
            Attribute::MpReachNlri(MpReachNlri {
                family: Family::IPV6_UNICAST,
                next_hops: vec!["2001:db8::1".parse().unwrap()],
                nlris: vec![],
            }),
        ])
        .unwrap();
        assert_eq!(attrs.next_hop(), Some("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_as_path_length() {
        let as_path = ASPath {
            segments: vec![
                Segment::AS_SEQUENCE(vec![100, 200, 300]),
                Segment::AS_SET(vec![400, 500]),
            ],
        };
        assert_eq!(as_path_length(&as_path), 4);
        assert_eq!(as_path_neighbor(&as_path), Some(100));
        assert_eq!(as_path_to_string(&as_path), "100 200 300 {400,500}");
        assert_eq!(as_path_length(&ASPath { segments: vec![] }), 0);
    }

    #[test]
    fn test_attribute_eq() {
        let seq = |asns: Vec<u32>| ASPath {
            segments: vec![Segment::AS_SEQUENCE(asns)],
        };
        let set = |asns: Vec<u32>| ASPath {
            segments: vec![Segment::AS_SET(asns)],
        };
        assert!(as_path_eq(&seq(vec![100, 200]), &seq(vec![100, 200])));
        assert!(!as_path_eq(&seq(vec![100, 200]), &set(vec![100, 200])));
        assert!(!as_path_eq(&seq(vec![100]), &seq(vec![100, 200])));

        assert_eq!(Attribute::Origin(Origin::IGP), Attribute::Origin(Origin::IGP));
        assert_ne!(Attribute::Origin(Origin::IGP), Attribute::Origin(Origin::EGP));
        assert_eq!(
            Attribute::AsPath(seq(vec![65100])),
            Attribute::AsPath(seq(vec![65100]))
        );
        assert_ne!(Attribute::LocalPref(100), Attribute::MultiExitDisc(100));
    }
}
