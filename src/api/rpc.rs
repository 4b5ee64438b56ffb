use std::fmt;
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use jsonrpsee::core::{RpcResult, SubscriptionResult};
use jsonrpsee::proc_macros::rpc;
use serde::{self, Deserialize, Serialize};

use super::any::Any;
use crate::rib::Family;

#[rpc(client, server)]
pub trait Api {
    #[method(name = "start_bgp")]
    async fn start_bgp(&self, global: Global) -> RpcResult<()>;
    #[method(name = "stop_bgp")]
    async fn stop_bgp(&self) -> RpcResult<()>;
    #[method(name = "get_bgp")]
    async fn get_bgp(&self) -> RpcResult<Global>;
    #[method(name = "add_path")]
    async fn add_path(&self, request: AddPathRequest) -> RpcResult<AddPathResponse>;
    #[method(name = "delete_path")]
    async fn delete_path(&self, request: DeletePathRequest) -> RpcResult<DeletePathResponse>;
    #[method(name = "get_table")]
    async fn get_table(&self, request: GetTableRequest) -> RpcResult<TableInfo>;
    /// One message per destination, then [`ListPathResponse::End`]
    #[subscription(name = "list_path", unsubscribe = "cancel_list_path", item = ListPathResponse)]
    async fn list_path(&self, request: ListPathRequest) -> SubscriptionResult;
}

struct Defaults {}

impl Defaults {
    fn listen_port() -> i32 {
        0
    }
}

/// Process-wide BGP identity given to `start_bgp`
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Global {
    pub asn: u32,
    pub router_id: String,
    /// Peer listener port, -1 to not listen for peers at all (0 uses 179)
    #[serde(default = "Defaults::listen_port")]
    pub listen_port: i32,
    #[serde(default = "Vec::new")]
    pub listen_addresses: Vec<String>,
    /// Empty enables IPv4 and IPv6 unicast
    #[serde(default = "Vec::new")]
    pub families: Vec<Family>,
    #[serde(default)]
    pub use_multiple_paths: bool,
    pub default_local_pref: Option<u32>,
}

impl Global {
    pub fn new(asn: u32, router_id: String) -> Self {
        Self {
            asn,
            router_id,
            listen_port: Defaults::listen_port(),
            listen_addresses: vec![],
            families: vec![],
            use_multiple_paths: false,
            default_local_pref: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    /// Selected and locally originated paths
    Global,
    /// Paths received from one neighbor
    AdjIn,
}

impl Default for TableType {
    fn default() -> Self {
        TableType::Global
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TableType::Global => write!(f, "Global"),
            TableType::AdjIn => write!(f, "Adj-RIB-In"),
        }
    }
}

/// A path as seen by API clients
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Path {
    pub family: Family,
    /// [`IpAddressPrefix`](super::any::IpAddressPrefix) container
    pub nlri: Option<Any>,
    #[serde(default = "Vec::new")]
    pub pattrs: Vec<Any>,
    #[serde(default)]
    pub identifier: u32,
    // Output only, ignored by add_path and delete_path
    #[serde(default)]
    pub best: bool,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub neighbor: Option<IpAddr>,
    #[serde(default)]
    pub received_at: Option<i64>,
}

impl Path {
    pub fn new(family: Family, nlri: Any, pattrs: Vec<Any>, identifier: u32) -> Self {
        Self {
            family,
            nlri: Some(nlri),
            pattrs,
            identifier,
            best: false,
            source: None,
            neighbor: None,
            received_at: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Destination {
    pub prefix: String,
    /// Best paths first
    pub paths: Vec<Path>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AddPathRequest {
    #[serde(default)]
    pub table_type: TableType,
    pub path: Path,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AddPathResponse {
    /// The destination after the path was added
    pub destination: Destination,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DeletePathRequest {
    #[serde(default)]
    pub table_type: TableType,
    pub family: Family,
    /// Every API path of the family when not given
    pub path: Option<Path>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DeletePathResponse {
    pub withdrawn: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupOption {
    Exact,
    /// This prefix and more specifics
    Longer,
    /// This prefix and less specifics
    Shorter,
}

impl Default for LookupOption {
    fn default() -> Self {
        LookupOption::Exact
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TableLookupPrefix {
    pub prefix: IpNetwork,
    #[serde(default)]
    pub lookup: LookupOption,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ListPathRequest {
    #[serde(default)]
    pub table_type: TableType,
    /// Required for the AdjIn table
    pub neighbor: Option<IpAddr>,
    pub family: Family,
    #[serde(default = "Vec::new")]
    pub prefixes: Vec<TableLookupPrefix>,
    #[serde(default)]
    pub best_path_only: bool,
}

impl ListPathRequest {
    pub fn new(family: Family) -> Self {
        Self {
            table_type: TableType::Global,
            neighbor: None,
            family,
            prefixes: vec![],
            best_path_only: false,
        }
    }
}

/// Items of the `list_path` subscription
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ListPathResponse {
    Destination { destination: Destination },
    /// No more destinations
    End,
    /// The stream was aborted, destinations already sent remain valid
    Error { message: String },
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GetTableRequest {
    #[serde(default)]
    pub table_type: TableType,
    pub neighbor: Option<IpAddr>,
    pub family: Family,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TableInfo {
    pub family: Family,
    pub num_destination: u64,
    pub num_path: u64,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SpecAttributes {
    pub origin: Option<String>,
    #[serde(default = "Vec::new")]
    pub as_path: Vec<String>,
    pub local_pref: Option<u32>,
    #[serde(alias = "med")]
    pub multi_exit_disc: Option<u32>,
    #[serde(default = "Vec::new")]
    pub communities: Vec<String>,
}

/// Human friendly route (config file static routes, CLI advertise)
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RouteSpec {
    /// Prefix to advertise (E.g. "100.1.0.0/16" or "2620:100:ab::/64")
    pub prefix: IpNetwork,
    /// Next-hop to reach this prefix
    pub next_hop: IpAddr,
    #[serde(default)]
    pub identifier: u32,
    #[serde(flatten, default = "SpecAttributes::default")]
    pub attributes: SpecAttributes,
}

impl RouteSpec {
    pub fn new(prefix: IpNetwork, next_hop: IpAddr) -> Self {
        Self {
            prefix,
            next_hop,
            identifier: 0,
            attributes: SpecAttributes::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_defaults() {
        let global: Global =
            serde_json::from_str(r#"{"asn": 65003, "router_id": "10.0.255.254"}"#).unwrap();
        assert_eq!(global, Global::new(65003, "10.0.255.254".to_string()));
    }

    #[test]
    fn test_list_path_response_tagging() {
        let end = serde_json::to_string(&ListPathResponse::End).unwrap();
        assert_eq!(end, r#"{"type":"end"}"#);
        let error: ListPathResponse =
            serde_json::from_str(r#"{"type":"error","message":"boom"}"#).unwrap();
        assert_eq!(
            error,
            ListPathResponse::Error {
                message: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_list_path_request_defaults() {
        let request: ListPathRequest = serde_json::from_str(
            r#"{"family": "ipv6 unicast", "prefixes": [{"prefix": "2001:db8::/32"}]}"#,
        )
        .unwrap();
        assert_eq!(request.table_type, TableType::Global);
        assert_eq!(request.family, Family::IPV6_UNICAST);
        assert_eq!(request.prefixes[0].lookup, LookupOption::Exact);
        assert!(!request.best_path_only);
    }
}
