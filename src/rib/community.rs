use std::fmt;
use std::slice::Iter;
use std::str::FromStr;

use crate::utils::ParseError;

const NO_EXPORT: u32 = 0xFFFF_FF01;
const NO_ADVERTISE: u32 = 0xFFFF_FF02;
const NO_EXPORT_SUBCONFED: u32 = 0xFFFF_FF03;

/// RFC 1997 community, displayed as `asn:value`
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Community(pub u32);

impl fmt::Display for Community {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            NO_EXPORT => write!(f, "no-export"),
            NO_ADVERTISE => write!(f, "no-advertise"),
            NO_EXPORT_SUBCONFED => write!(f, "no-export-subconfed"),
            value => write!(f, "{}:{}", value >> 16, value & 0xffff),
        }
    }
}

impl FromStr for Community {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::new(format!("Invalid community '{}'", value));
        match value.to_lowercase().as_str() {
            "no-export" => return Ok(Community(NO_EXPORT)),
            "no-advertise" => return Ok(Community(NO_ADVERTISE)),
            "no-export-subconfed" => return Ok(Community(NO_EXPORT_SUBCONFED)),
            _ => (),
        }
        // A single number is the full 32 bit value (E.g. "4259840100")
        let chunks: Vec<_> = value.split(':').collect();
        match chunks.len() {
            1 => chunks[0].parse().map(Community).map_err(|_| invalid()),
            2 => {
                let high: u16 = chunks[0].parse().map_err(|_| invalid())?;
                let low: u16 = chunks[1].parse().map_err(|_| invalid())?;
                Ok(Community((u32::from(high) << 16) + u32::from(low)))
            }
            _ => Err(invalid()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommunityList(pub Vec<Community>);

impl CommunityList {
    pub fn iter(&self) -> Iter<Community> {
        self.0.iter()
    }

    pub fn values(&self) -> Vec<u32> {
        self.0.iter().map(|c| c.0).collect()
    }
}

impl From<Vec<u32>> for CommunityList {
    fn from(values: Vec<u32>) -> Self {
        Self(values.into_iter().map(Community).collect())
    }
}

impl fmt::Display for CommunityList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let communities = self
            .0
            .iter()
            .map(std::string::ToString::to_string)
            .collect::<Vec<String>>()
            .join(" ");
        write!(f, "{}", communities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_community_list_display() {
        assert_eq!(
            CommunityList::from(vec![100, (65000 << 16) + 200]).to_string(),
            "0:100 65000:200"
        );
        assert_eq!(
            CommunityList(vec![Community(NO_EXPORT)]).to_string(),
            "no-export"
        );
    }

    #[test]
    fn test_parse_community() {
        assert_eq!(
            "65000:100".parse::<Community>().unwrap(),
            Community((65000 << 16) + 100)
        );
        assert_eq!("4259840100".parse::<Community>().unwrap(), Community(4259840100));
        assert_eq!(
            "NO-ADVERTISE".parse::<Community>().unwrap(),
            Community(NO_ADVERTISE)
        );
        assert!("65536:1".parse::<Community>().is_err());
        assert!("1:2:3".parse::<Community>().is_err());
    }
}
