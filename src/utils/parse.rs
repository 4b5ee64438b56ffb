use std::error::Error;
use std::fmt;

use bgp_rs::{ASPath, Origin, Segment};

use crate::api::paths::next_hop_attribute;
use crate::api::RouteSpec;
use crate::rib::{
    Attribute, AttributeError, Community, CommunityList, Family, Path, PathAttributes, PathSource,
};

#[derive(Debug, PartialEq)]
pub struct ParseError {
    pub reason: String,
}

impl ParseError {
    pub fn new(reason: String) -> Self {
        ParseError { reason }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParseError: {}", self.reason)
    }
}

impl Error for ParseError {}

impl From<AttributeError> for ParseError {
    fn from(error: AttributeError) -> Self {
        ParseError::new(error.to_string())
    }
}

/// Convert an ASN string to a u32
/// E.g. "65000.100" -> 42598400100
pub fn asn_from_dotted(value: &str) -> Result<u32, ParseError> {
    // Parse to list of u32, since we should support 4 byte ASN as a single int
    // (E.g. "42598400100")
    let mut chunks = [0; 2];
    let check_for_overflow = value.contains('.');
    // Iterate through chunks in reverse, so if there's no dot (only one number),
    // it will be in the least significant position
    for (i, chunk) in value
        .splitn(2, '.')
        .collect::<Vec<&str>>()
        .into_iter()
        .rev()
        .enumerate()
    {
        let chunk: u32 = chunk
            .parse()
            .map_err(|err| ParseError::new(format!("{} '{}'", err, value)))?;
        if check_for_overflow && chunk > u32::from(u16::MAX) {
            return Err(ParseError::new(format!("Unsupported ASN '{}'", value)));
        }
        chunks[i] = chunk;
    }
    Ok((chunks[1] * 65536) + chunks[0])
}

pub fn parse_origin(value: &str) -> Result<Origin, ParseError> {
    match value.to_lowercase().as_str() {
        "igp" | "i" => Ok(Origin::IGP),
        "egp" | "e" => Ok(Origin::EGP),
        "incomplete" | "?" => Ok(Origin::INCOMPLETE),
        _ => Err(ParseError::new(format!("Invalid origin '{}'", value))),
    }
}

/// AS_SEQUENCE from a list of (possibly dotted) ASNs
pub fn parse_as_path(asns: &[String]) -> Result<ASPath, ParseError> {
    if asns.is_empty() {
        return Ok(ASPath { segments: vec![] });
    }
    let asns = asns
        .iter()
        .map(|asn| asn_from_dotted(asn))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ASPath {
        segments: vec![Segment::AS_SEQUENCE(asns)],
    })
}

/// Build a locally originated path from a route spec. The family follows the
/// prefix and the next hop has to be of the same IP version.
pub fn parse_route_spec(spec: &RouteSpec, source: PathSource) -> Result<Path, ParseError> {
    let family = Family::for_prefix(&spec.prefix);
    if spec.prefix.is_ipv4() != spec.next_hop.is_ipv4() {
        return Err(ParseError::new(format!(
            "Next hop {} can't be used for {}",
            spec.next_hop, spec.prefix
        )));
    }
    let attrs = &spec.attributes;
    let origin = match &attrs.origin {
        Some(origin) => parse_origin(origin)?,
        None => Origin::INCOMPLETE,
    };
    let mut attributes = vec![
        Attribute::Origin(origin),
        Attribute::AsPath(parse_as_path(&attrs.as_path)?),
        next_hop_attribute(family, spec.prefix, spec.next_hop),
    ];
    if let Some(local_pref) = attrs.local_pref {
        attributes.push(Attribute::LocalPref(local_pref));
    }
    if let Some(med) = attrs.multi_exit_disc {
        attributes.push(Attribute::MultiExitDisc(med));
    }
    if !attrs.communities.is_empty() {
        let communities = attrs
            .communities
            .iter()
            .map(|comm| comm.parse::<Community>())
            .collect::<Result<Vec<_>, _>>()?;
        attributes.push(Attribute::Communities(CommunityList(communities)));
    }
    Ok(Path::new(
        family,
        spec.prefix,
        PathAttributes::from_attributes(attributes)?,
        spec.identifier,
        source,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rib::attributes::as_path_eq;
    use crate::rib::MpReachNlri;
    use std::net::IpAddr;

    #[test]
    fn test_asn_from_dotted() {
        assert_eq!(asn_from_dotted("100").unwrap(), 100);
        assert_eq!(asn_from_dotted("65000.100").unwrap(), 4259840100);
        assert_eq!(asn_from_dotted("4259840100").unwrap(), 4259840100);
        assert!(asn_from_dotted("4259840100.200").is_err());
        assert!(asn_from_dotted("200.4259840100").is_err());
        assert!(asn_from_dotted("100.200300").is_err());
        assert!(asn_from_dotted("test").is_err());
    }

    #[test]
    fn test_parse_origin() {
        assert!(matches!(parse_origin("IGP"), Ok(Origin::IGP)));
        assert!(matches!(parse_origin("egp"), Ok(Origin::EGP)));
        assert!(matches!(parse_origin("?"), Ok(Origin::INCOMPLETE)));
        assert!(parse_origin("bgp").is_err());
    }

    #[test]
    fn test_parse_v4_route_spec() {
        let mut spec = RouteSpec::new("10.10.0.0/16".parse().unwrap(), "192.0.2.1".parse().unwrap());
        spec.attributes.as_path = vec!["65100".to_string(), "65000.100".to_string()];
        spec.attributes.local_pref = Some(300);
        spec.attributes.communities = vec!["65003:100".to_string(), "no-export".to_string()];
        let path = parse_route_spec(&spec, PathSource::Config).unwrap();

        assert_eq!(path.family, Family::IPV4_UNICAST);
        assert_eq!(path.source, PathSource::Config);
        assert!(matches!(path.attributes.origin(), Origin::INCOMPLETE));
        assert_eq!(path.attributes.local_pref(), Some(300));
        assert_eq!(
            path.attributes.next_hop(),
            Some("192.0.2.1".parse::<IpAddr>().unwrap())
        );
        assert_eq!(
            path.attributes.communities().unwrap().to_string(),
            "65003:100 no-export"
        );
        assert!(as_path_eq(
            path.attributes.as_path().unwrap(),
            &ASPath {
                segments: vec![Segment::AS_SEQUENCE(vec![65100, 4259840100])],
            }
        ));
    }

    #[test]
    fn test_parse_v6_route_spec() {
        let mut spec = RouteSpec::new(
            "2001:db8::/48".parse().unwrap(),
            "2001:db8::1".parse().unwrap(),
        );
        spec.identifier = 100;
        spec.attributes.origin = Some("igp".to_string());
        let path = parse_route_spec(&spec, PathSource::Api).unwrap();
        assert_eq!(path.identifier, 100);
        assert_eq!(
            path.attributes.mp_reach_nlri(),
            Some(&MpReachNlri {
                family: Family::IPV6_UNICAST,
                next_hops: vec!["2001:db8::1".parse().unwrap()],
                nlris: vec!["2001:db8::/48".parse().unwrap()],
            })
        );
    }

    #[test]
    fn test_invalid_route_spec() {
        let spec = RouteSpec::new(
            "2001:db8::/48".parse().unwrap(),
            "192.0.2.1".parse().unwrap(),
        );
        assert!(parse_route_spec(&spec, PathSource::Api).is_err());

        let mut spec = RouteSpec::new("10.0.0.0/8".parse().unwrap(), "192.0.2.1".parse().unwrap());
        spec.attributes.communities = vec!["65536:1".to_string()];
        assert!(parse_route_spec(&spec, PathSource::Api).is_err());
    }
}
