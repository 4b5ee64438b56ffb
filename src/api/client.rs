use std::net::SocketAddr;

use jsonrpsee::core::ClientError;
use jsonrpsee::ws_client::{WsClient, WsClientBuilder};
use log::trace;
use thiserror::Error;

use super::rpc::{ApiClient, Destination, ListPathRequest, ListPathResponse};

#[derive(Debug, Error)]
pub enum ListPathError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("Malformed list_path item: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("list_path aborted: {0}")]
    Aborted(String),
    #[error("list_path closed before the end of the table")]
    Closed,
}

pub async fn connect(addr: &SocketAddr) -> Result<WsClient, ClientError> {
    let url = format!("ws://{}", addr);
    trace!("Connecting to {}", url);
    WsClientBuilder::default().build(&url).await
}

/// Read a `list_path` subscription until its end marker
pub async fn list_destinations(
    client: &WsClient,
    request: ListPathRequest,
) -> Result<Vec<Destination>, ListPathError> {
    let mut subscription = client.list_path(request).await?;
    let mut destinations = vec![];
    while let Some(item) = subscription.next().await {
        match item? {
            ListPathResponse::Destination { destination } => destinations.push(destination),
            ListPathResponse::End => return Ok(destinations),
            ListPathResponse::Error { message } => return Err(ListPathError::Aborted(message)),
        }
    }
    Err(ListPathError::Closed)
}
