//! WebSocket Server
//!
//! Streams live positions, zone transitions and alerts to map clients and
//! accepts control commands from them.
//!
//! # Architecture
//!
//! ```text
//! client ──ws──► connection task ──► TrackingController ──► TrackingSession
//!    ▲                 │                     │
//!    └──── JSON ◄──────┴──── broadcast<SessionEvent> ◄──────┘
//! ```
//!
//! Each connection runs on its own task. All connections share one
//! [`TrackingController`], which allows a single session at a time.
//!
//! # Example
//!
//! ```ignore
//! let controller = Arc::new(TrackingController::new(config, registry, source, dispatcher));
//! let server = TrackingServer::bind("127.0.0.1:8765", controller).await?;
//! server.run(cancel).await?;
//! ```

mod connection;
mod controller;
mod protocol;

pub use controller::{StartOutcome, TrackingController};
pub use protocol::{
    ClientCommand, CommandResponse, ConfigPayload, ResponseStatus, ServerMessage, StatusPayload,
    ZoneOverlay,
};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::session::SessionError;
use crate::source::SourceError;

/// Errors from the WebSocket server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Cannot open frame source: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Accepts WebSocket clients.
#[derive(Debug)]
pub struct TrackingServer {
    listener: TcpListener,
    controller: Arc<TrackingController>,
    clients: Arc<AtomicUsize>,
}

impl TrackingServer {
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address is unavailable.
    pub async fn bind(addr: &str, controller: Arc<TrackingController>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self {
            listener,
            controller,
            clients: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Actual listening address, useful after binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn controller(&self) -> &Arc<TrackingController> {
        &self.controller
    }

    /// Shared count of connected clients.
    pub fn clients(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.clients)
    }

    /// Serves clients until `cancel` fires, then stops tracking and closes
    /// every connection.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ServerError> {
        let addr = self.local_addr()?;
        info!(%addr, "WebSocket server listening");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "Incoming connection");
                        let controller = Arc::clone(&self.controller);
                        let clients = Arc::clone(&self.clients);
                        let cancel = cancel.child_token();
                        tokio::spawn(async move {
                            if let Err(e) = connection::serve_connection(
                                stream, peer, controller, clients, cancel,
                            )
                            .await
                            {
                                warn!(%peer, error = %e, "Client connection ended with error");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "Accept failed"),
                },
            }
        }

        self.controller.shutdown();
        info!(
            clients = self.clients.load(Ordering::SeqCst),
            "WebSocket server stopped"
        );
        Ok(())
    }
}
