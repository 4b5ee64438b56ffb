use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use jsonrpsee::core::{RpcResult, SubscriptionResult};
use jsonrpsee::server::{PendingSubscriptionSink, ServerHandle, SubscriptionMessage};
use jsonrpsee::types::ErrorObjectOwned;
use log::{debug, error, info};

use super::paths::{decode_path, decode_withdraw, encode_destination};
use super::rpc::{
    AddPathRequest, AddPathResponse, ApiServer, DeletePathRequest, DeletePathResponse,
    GetTableRequest, Global, ListPathRequest, ListPathResponse, LookupOption, TableInfo,
    TableType,
};
use super::ApiError;
use crate::rib::{
    normalize_prefix, LookupKind, PathFilter, PathSource, PrefixLookup, Rib, RibSnapshot,
};
use crate::server::Server;

impl Server {
    async fn handle_add_path(&self, request: AddPathRequest) -> Result<AddPathResponse, ApiError> {
        if request.table_type != TableType::Global {
            return Err(ApiError::ReadOnlyTable(request.table_type));
        }
        let rib = self.rib().await?;
        let path = decode_path(&request.path, PathSource::Api)?;
        let destination = rib.add_path(path).await?;
        let destination =
            encode_destination(&destination, rib.config(), &PathFilter::default(), false)?;
        Ok(AddPathResponse { destination })
    }

    async fn handle_delete_path(
        &self,
        request: DeletePathRequest,
    ) -> Result<DeletePathResponse, ApiError> {
        if request.table_type != TableType::Global {
            return Err(ApiError::ReadOnlyTable(request.table_type));
        }
        let rib = self.rib().await?;
        let withdrawn = match &request.path {
            Some(path) => {
                if path.family != request.family {
                    return Err(ApiError::FamilyMismatch {
                        request: request.family,
                        path: path.family,
                    });
                }
                let (prefix, key) = decode_withdraw(path)?;
                let removed = rib.delete_path(path.family, prefix, &key).await?;
                u64::from(removed.is_some())
            }
            None => rib.delete_source(request.family, PathSource::Api).await? as u64,
        };
        Ok(DeletePathResponse { withdrawn })
    }

    async fn handle_get_table(&self, request: GetTableRequest) -> Result<TableInfo, ApiError> {
        let rib = self.rib().await?;
        let info = match request.table_type {
            TableType::Global => rib.table_info(request.family).await?,
            TableType::AdjIn => {
                let filter = table_filter(&request.table_type, request.neighbor, vec![])?;
                let mut info = crate::rib::TableInfo::default();
                for destination in rib.list_paths(request.family, &filter).await? {
                    info.destinations += 1;
                    info.paths += destination
                        .candidates()
                        .iter()
                        .filter(|path| filter.matches_path(path))
                        .count() as u64;
                }
                info
            }
        };
        Ok(TableInfo {
            family: request.family,
            num_destination: info.destinations,
            num_path: info.paths,
        })
    }

    async fn list_path_snapshot(
        &self,
        request: &ListPathRequest,
    ) -> Result<(Arc<Rib>, PathFilter, RibSnapshot), ApiError> {
        let rib = self.rib().await?;
        let prefixes = request
            .prefixes
            .iter()
            .map(|lookup| PrefixLookup {
                prefix: normalize_prefix(lookup.prefix),
                kind: match lookup.lookup {
                    LookupOption::Exact => LookupKind::Exact,
                    LookupOption::Longer => LookupKind::Longer,
                    LookupOption::Shorter => LookupKind::Shorter,
                },
            })
            .collect();
        let filter = table_filter(&request.table_type, request.neighbor, prefixes)?;
        let snapshot = rib.list_paths(request.family, &filter).await?;
        Ok((rib, filter, snapshot))
    }
}

fn table_filter(
    table_type: &TableType,
    neighbor: Option<IpAddr>,
    prefixes: Vec<PrefixLookup>,
) -> Result<PathFilter, ApiError> {
    let neighbor = match table_type {
        TableType::Global => None,
        TableType::AdjIn => Some(neighbor.ok_or(ApiError::MissingNeighbor(*table_type))?),
    };
    Ok(PathFilter { prefixes, neighbor })
}

#[async_trait::async_trait]
impl ApiServer for Server {
    async fn start_bgp(&self, global: Global) -> RpcResult<()> {
        Ok(Server::start_bgp(self, &global).await?)
    }

    async fn stop_bgp(&self) -> RpcResult<()> {
        if !Server::stop_bgp(self).await {
            debug!("stop_bgp: BGP wasn't running");
        }
        Ok(())
    }

    async fn get_bgp(&self) -> RpcResult<Global> {
        Ok(Server::get_bgp(self).await?)
    }

    async fn add_path(&self, request: AddPathRequest) -> RpcResult<AddPathResponse> {
        Ok(self.handle_add_path(request).await?)
    }

    async fn delete_path(&self, request: DeletePathRequest) -> RpcResult<DeletePathResponse> {
        Ok(self.handle_delete_path(request).await?)
    }

    async fn get_table(&self, request: GetTableRequest) -> RpcResult<TableInfo> {
        Ok(self.handle_get_table(request).await?)
    }

    async fn list_path(
        &self,
        pending: PendingSubscriptionSink,
        request: ListPathRequest,
    ) -> SubscriptionResult {
        let (rib, filter, snapshot) = match self.list_path_snapshot(&request).await {
            Ok(listing) => listing,
            Err(err) => {
                pending.reject(ErrorObjectOwned::from(err)).await;
                return Ok(());
            }
        };
        let sink = pending.accept().await?;

        // Destinations are encoded one at a time as the client consumes them
        for destination in snapshot {
            let item = match encode_destination(
                &destination,
                rib.config(),
                &filter,
                request.best_path_only,
            ) {
                Ok(encoded) if encoded.paths.is_empty() => continue,
                Ok(encoded) => ListPathResponse::Destination {
                    destination: encoded,
                },
                Err(err) => {
                    error!("Error encoding {}: {}", destination, err);
                    let item = ListPathResponse::Error {
                        message: ApiError::from(err).to_string(),
                    };
                    sink.send(SubscriptionMessage::from_json(&item)?).await?;
                    return Ok(());
                }
            };
            if sink.send(SubscriptionMessage::from_json(&item)?).await.is_err() {
                debug!("list_path subscription closed by client");
                return Ok(());
            }
        }
        sink.send(SubscriptionMessage::from_json(&ListPathResponse::End)?)
            .await?;
        Ok(())
    }
}

impl Server {
    /// Serve the administrative API, returns the bound address and the
    /// handle that stops the API server
    pub async fn serve_rpc_api(&self, socket: SocketAddr) -> io::Result<(SocketAddr, ServerHandle)> {
        let rpc_server = jsonrpsee::server::Server::builder().build(socket).await?;
        let local_addr = rpc_server.local_addr()?;
        info!("Starting JSON-RPC server on {}...", local_addr);
        let handle = rpc_server.start(self.clone().into_rpc());
        Ok((local_addr, handle))
    }
}
