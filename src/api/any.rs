//! Self-describing attribute containers.
//!
//! Every NLRI and path attribute crosses the API as an [`Any`]: a type name
//! and the serialized payload of that type. New attribute types can be added
//! without changing the shape of [`Path`](super::rpc::Path), and types a
//! receiver doesn't know are kept as opaque bytes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::rib::Family;

pub const TYPE_URL_PREFIX: &str = "ribd.api.";

/// Payload type that can be packed into an [`Any`]
pub trait TypedMessage: Serialize + DeserializeOwned {
    const TYPE_NAME: &'static str;

    fn type_url() -> String {
        format!("{}{}", TYPE_URL_PREFIX, Self::TYPE_NAME)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Any {
    pub type_url: String,
    #[serde(default)]
    pub value: Vec<u8>,
}

impl Any {
    pub fn pack<T: TypedMessage>(message: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            type_url: T::type_url(),
            value: serde_json::to_vec(message)?,
        })
    }

    pub fn is<T: TypedMessage>(&self) -> bool {
        self.type_url == T::type_url()
    }

    /// `None` if this container holds some other type
    pub fn unpack<T: TypedMessage>(&self) -> Option<Result<T, serde_json::Error>> {
        if self.is::<T>() {
            Some(serde_json::from_slice(&self.value))
        } else {
            None
        }
    }

    /// Type name without the URL prefix (E.g. "OriginAttribute")
    pub fn type_name(&self) -> &str {
        self.type_url
            .strip_prefix(TYPE_URL_PREFIX)
            .unwrap_or(&self.type_url)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct IpAddressPrefix {
    pub prefix: String,
    pub prefix_len: u8,
}

impl TypedMessage for IpAddressPrefix {
    const TYPE_NAME: &'static str = "IPAddressPrefix";
}

/// 0 = IGP, 1 = EGP, 2 = INCOMPLETE
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct OriginAttribute {
    pub origin: u32,
}

impl TypedMessage for OriginAttribute {
    const TYPE_NAME: &'static str = "OriginAttribute";
}

pub const AS_SET: u32 = 1;
pub const AS_SEQUENCE: u32 = 2;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct AsSegment {
    /// 1 = AS_SET, 2 = AS_SEQUENCE
    #[serde(rename = "type")]
    pub segment_type: u32,
    pub numbers: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct AsPathAttribute {
    #[serde(default)]
    pub segments: Vec<AsSegment>,
}

impl TypedMessage for AsPathAttribute {
    const TYPE_NAME: &'static str = "AsPathAttribute";
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct NextHopAttribute {
    pub next_hop: String,
}

impl TypedMessage for NextHopAttribute {
    const TYPE_NAME: &'static str = "NextHopAttribute";
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct MultiExitDiscAttribute {
    pub med: u32,
}

impl TypedMessage for MultiExitDiscAttribute {
    const TYPE_NAME: &'static str = "MultiExitDiscAttribute";
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct LocalPrefAttribute {
    pub local_pref: u32,
}

impl TypedMessage for LocalPrefAttribute {
    const TYPE_NAME: &'static str = "LocalPrefAttribute";
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct CommunitiesAttribute {
    #[serde(default)]
    pub communities: Vec<u32>,
}

impl TypedMessage for CommunitiesAttribute {
    const TYPE_NAME: &'static str = "CommunitiesAttribute";
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct MpReachNlriAttribute {
    pub family: Family,
    #[serde(default)]
    pub next_hops: Vec<String>,
    /// [`IpAddressPrefix`] containers
    #[serde(default)]
    pub nlris: Vec<Any>,
}

impl TypedMessage for MpReachNlriAttribute {
    const TYPE_NAME: &'static str = "MpReachNLRIAttribute";
}
