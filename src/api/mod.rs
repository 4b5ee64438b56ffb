pub mod any;
pub mod client;
mod handler;
pub mod paths;
pub mod rpc;

use std::io;

use jsonrpsee::types::error::{INTERNAL_ERROR_CODE, INVALID_PARAMS_CODE};
use jsonrpsee::types::ErrorObjectOwned;
use thiserror::Error;

pub use paths::DecodeError;
pub use rpc::{
    AddPathRequest, AddPathResponse, ApiClient, ApiServer, DeletePathRequest, DeletePathResponse,
    Destination, GetTableRequest, Global, ListPathRequest, ListPathResponse, LookupOption, Path,
    RouteSpec, SpecAttributes, TableInfo, TableLookupPrefix, TableType,
};

use crate::config::ConfigError;
use crate::rib::{Family, RibError};

pub const NOT_STARTED_CODE: i32 = -32001;
pub const ALREADY_STARTED_CODE: i32 = -32002;
pub const UNSUPPORTED_FAMILY_CODE: i32 = -32003;
pub const INVALID_TABLE_CODE: i32 = -32004;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("BGP is not started")]
    NotStarted,
    #[error("BGP is already started")]
    AlreadyStarted,
    #[error("{0} table doesn't accept paths")]
    ReadOnlyTable(TableType),
    #[error("{0} table needs a neighbor")]
    MissingNeighbor(TableType),
    #[error("Request family {request} doesn't match path family {path}")]
    FamilyMismatch { request: Family, path: Family },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Rib(#[from] RibError),
    #[error("Error encoding response: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Peer listener: {0}")]
    Listener(#[from] io::Error),
}

impl ApiError {
    pub fn code(&self) -> i32 {
        use ApiError::*;
        match self {
            NotStarted => NOT_STARTED_CODE,
            AlreadyStarted => ALREADY_STARTED_CODE,
            ReadOnlyTable(_) | MissingNeighbor(_) => INVALID_TABLE_CODE,
            Rib(RibError::UnsupportedFamily(_)) => UNSUPPORTED_FAMILY_CODE,
            FamilyMismatch { .. } | Config(_) | Decode(_) | Rib(_) => INVALID_PARAMS_CODE,
            Encode(_) | Listener(_) => INTERNAL_ERROR_CODE,
        }
    }
}

impl From<ApiError> for ErrorObjectOwned {
    fn from(err: ApiError) -> Self {
        ErrorObjectOwned::owned(err.code(), err.to_string(), None::<()>)
    }
}
