use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use bgp_rs::{Message, Notification};
use bytes::{BufMut, BytesMut};
use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Cease
const CEASE: u8 = 6;
/// Cease subcode: Connection Rejected
const CONNECTION_REJECTED: u8 = 5;

const MIN_ACCEPT_BACKOFF: Duration = Duration::from_millis(10);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// TCP listener for BGP peers.
///
/// There are no configured neighbors, so every connection is answered with a
/// NOTIFICATION (Cease / Connection Rejected) and closed.
pub struct PeerListener {
    local_addrs: Vec<SocketAddr>,
    tasks: Vec<JoinHandle<()>>,
}

impl PeerListener {
    pub async fn bind(addresses: &[IpAddr], port: u16) -> io::Result<Self> {
        let mut local_addrs = Vec::with_capacity(addresses.len());
        let mut tasks = Vec::with_capacity(addresses.len());
        for addr in addresses {
            let listener = TcpListener::bind(SocketAddr::new(*addr, port)).await?;
            let local_addr = listener.local_addr()?;
            info!("Listening for BGP peers on {}", local_addr);
            local_addrs.push(local_addr);
            tasks.push(tokio::spawn(accept_connections(listener)));
        }
        Ok(Self { local_addrs, tasks })
    }

    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    pub fn shutdown(mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        debug!("Closed peer listener on {:?}", self.local_addrs);
    }
}

impl Drop for PeerListener {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn accept_connections(listener: TcpListener) {
    let mut errors: u32 = 0;
    loop {
        match listener.accept().await {
            Ok((stream, remote)) => {
                errors = 0;
                warn!("Unexpected connection from {}, no neighbors configured", remote);
                tokio::spawn(async move {
                    if let Err(err) = reject(stream).await {
                        debug!("Error rejecting {}: {}", remote, err);
                    }
                });
            }
            Err(err) => {
                // E.g. out of file descriptors, retrying right away would spin
                let backoff = accept_backoff(errors);
                errors = errors.saturating_add(1);
                warn!(
                    "Error accepting BGP connection: {}, retrying in {:?}",
                    err, backoff
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Doubles with every consecutive accept error, up to a second
fn accept_backoff(errors: u32) -> Duration {
    MIN_ACCEPT_BACKOFF
        .checked_mul(1u32.checked_shl(errors).unwrap_or(u32::MAX))
        .map_or(MAX_ACCEPT_BACKOFF, |backoff| backoff.min(MAX_ACCEPT_BACKOFF))
}

async fn reject(mut stream: TcpStream) -> io::Result<()> {
    let notification = Message::Notification(Notification {
        major_err_code: CEASE,
        minor_err_code: CONNECTION_REJECTED,
        data: vec![],
    });
    let mut writer = BytesMut::with_capacity(21).writer();
    notification.encode(&mut writer)?;
    stream.write_all(&writer.into_inner()).await?;
    stream.shutdown().await
}
