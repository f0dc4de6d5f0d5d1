//! Best-effort OSC forwarding to the rendering engine.
//!
//! Nothing here returns an error to the caller: a missing or unreachable
//! renderer must never stall ingestion.

use crate::error::TransportError;
use crate::osc;
use crate::sensor::Reading;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::{UdpSocket, lookup_host};
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct Forwarder {
    host: String,
    port: u16,
    socket: Option<Arc<UdpSocket>>,
}

impl Forwarder {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            socket: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Bind the outbound socket. Idempotent; failures are logged only.
    ///
    /// The destination is resolved on every send, so an unresolvable host
    /// only costs the frames sent while it stays unresolvable.
    pub async fn connect(&mut self) {
        if self.socket.is_some() {
            return;
        }
        match self.open().await {
            Ok(socket) => {
                info!(host = %self.host, port = self.port, "OSC socket ready");
                self.socket = Some(Arc::new(socket));
            }
            Err(err) => {
                error!(
                    host = %self.host,
                    port = self.port,
                    error = %err,
                    "Failed to create OSC socket"
                );
            }
        }
    }

    async fn open(&self) -> Result<UdpSocket, TransportError> {
        let local = match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => SocketAddr::from(([0u16; 8], 0)),
            _ => SocketAddr::from(([0, 0, 0, 0], 0)),
        };
        UdpSocket::bind(local).await.map_err(TransportError::Socket)
    }

    /// Encode and transmit `reading` without waiting for the send.
    pub fn send(&self, reading: &Reading) {
        let Some(socket) = self.socket.as_ref() else {
            warn!("OSC forwarder not connected, dropping reading");
            return;
        };

        let address = reading.osc_address();
        let args = reading.osc_args();
        let frame = match osc::encode_message(&address, &args) {
            Ok(frame) => frame,
            Err(err) => {
                error!(address = %address, error = %err, "Failed to encode OSC message");
                return;
            }
        };
        debug!(address = %address, args = ?args, bytes = frame.len(), "Sending OSC message");

        let socket = Arc::clone(socket);
        let host = self.host.clone();
        let port = self.port;
        tokio::spawn(async move {
            if let Err(err) = transmit(&socket, &host, port, frame.as_bytes()).await {
                error!(address = %address, error = %err, "Error sending OSC message");
            }
        });
    }

    /// Release the socket. Idempotent.
    pub fn disconnect(&mut self) {
        if self.socket.take().is_some() {
            info!("Disconnected from OSC receiver");
        }
    }
}

async fn transmit(
    socket: &UdpSocket,
    host: &str,
    port: u16,
    bytes: &[u8],
) -> Result<(), TransportError> {
    let destination = resolve(socket, host, port).await?;
    socket
        .send_to(bytes, destination)
        .await
        .map_err(TransportError::Send)?;
    Ok(())
}

/// First address of `host` in the socket's address family.
async fn resolve(
    socket: &UdpSocket,
    host: &str,
    port: u16,
) -> Result<SocketAddr, TransportError> {
    let want_ipv4 = socket.local_addr().map(|local| local.is_ipv4()).unwrap_or(true);
    lookup_host((host, port))
        .await
        .map_err(|source| TransportError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?
        .find(|candidate| candidate.is_ipv4() == want_ipv4)
        .ok_or_else(|| TransportError::NoAddress {
            host: host.to_string(),
            port,
        })
}
