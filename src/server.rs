use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::RwLock;

use crate::api::{ApiError, Global, RouteSpec};
use crate::config::{ConfigError, GlobalConfig};
use crate::rib::{PathSource, Rib};
use crate::session::PeerListener;
use crate::utils::parse_route_spec;

/// A started BGP instance, everything here lives from StartBgp until StopBgp
struct Instance {
    rib: Arc<Rib>,
    listener: Option<PeerListener>,
}

/// Daemon context shared by the API handlers
#[derive(Clone, Default)]
pub struct Server {
    inner: Arc<RwLock<Option<Instance>>>,
}

impl Server {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn start_bgp(&self, global: &Global) -> Result<(), ApiError> {
        let config = Arc::new(GlobalConfig::from_global(global)?);
        let mut inner = self.inner.write().await;
        if inner.is_some() {
            return Err(ApiError::AlreadyStarted);
        }
        let listener = match config.peer_listen_port() {
            Some(port) => Some(PeerListener::bind(&config.listen_addresses, port).await?),
            None => {
                debug!("Not listening for BGP peers");
                None
            }
        };
        info!(
            "Started BGP AS{} router-id {} [{}]",
            config.asn,
            config.router_id,
            config
                .families
                .sorted()
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        );
        *inner = Some(Instance {
            rib: Arc::new(Rib::new(config)),
            listener,
        });
        Ok(())
    }

    /// Stop BGP, returns false if it wasn't running
    pub async fn stop_bgp(&self) -> bool {
        let instance = self.inner.write().await.take();
        match instance {
            Some(instance) => {
                if let Some(listener) = instance.listener {
                    listener.shutdown();
                }
                info!("Stopped BGP AS{}", instance.rib.config().asn);
                true
            }
            None => false,
        }
    }

    pub async fn get_bgp(&self) -> Result<Global, ApiError> {
        let inner = self.inner.read().await;
        inner
            .as_ref()
            .map(|instance| instance.rib.config().to_global())
            .ok_or(ApiError::NotStarted)
    }

    /// The running RIB. The context lock is released on return, so a StopBgp
    /// racing with a request lets the request finish against the old RIB.
    pub async fn rib(&self) -> Result<Arc<Rib>, ApiError> {
        let inner = self.inner.read().await;
        inner
            .as_ref()
            .map(|instance| Arc::clone(&instance.rib))
            .ok_or(ApiError::NotStarted)
    }

    pub async fn peer_listener_addrs(&self) -> Vec<SocketAddr> {
        let inner = self.inner.read().await;
        inner
            .as_ref()
            .and_then(|instance| instance.listener.as_ref())
            .map(|listener| listener.local_addrs().to_vec())
            .unwrap_or_default()
    }

    /// Originate static routes from the daemon config
    pub async fn add_static_routes(&self, routes: &[RouteSpec]) -> Result<usize, ApiError> {
        let rib = self.rib().await?;
        let mut added = 0;
        for spec in routes {
            let path = parse_route_spec(spec, PathSource::Config).map_err(ConfigError::from)?;
            match rib.add_path(path).await {
                Ok(destination) => {
                    debug!("Static route {}", destination);
                    added += 1;
                }
                // Routes of families BGP wasn't started with are skipped
                Err(err) => warn!("Static route {} not added: {}", spec.prefix, err),
            }
        }
        Ok(added)
    }
}
