//! WebTransport server implementation
//!
//! Every client (phone, registration studio, arena display) opens one
//! bidirectional stream. Frames read from it become `SessionCommand`s; the
//! connection's outbox is drained into the send half by a writer task.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::metrics::Metrics;
use crate::net::framing::{read_client_message, write_encoded, FramingError};
use crate::net::game_session::{SessionError, SessionHandle};
use crate::net::gateway::ConnectionId;
use crate::net::protocol::ServerMessage;
use crate::net::tls::TlsConfig;

/// WebTransport server
pub struct WebTransportServer {
    config: ServerConfig,
    tls_config: TlsConfig,
    session: SessionHandle,
    metrics: Arc<Metrics>,
}

impl WebTransportServer {
    /// Create a new WebTransport server
    pub async fn new(config: ServerConfig, session: SessionHandle, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let tls_config = TlsConfig::load(&config).await?;

        Ok(Self {
            config,
            tls_config,
            session,
            metrics,
        })
    }

    /// Get the certificate hash for client configuration
    pub fn cert_hash(&self) -> &str {
        self.tls_config.cert_hash()
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.config.bind_address, self.config.port)
    }

    /// Run the server
    pub async fn run(self) -> anyhow::Result<()> {
        use wtransport::Endpoint;
        use wtransport::ServerConfig;

        let bind_addr = self.bind_addr();

        // An unspecified address binds dual-stack (IPv4 + IPv6)
        let builder = ServerConfig::builder();
        let builder = if self.config.bind_address.is_unspecified() {
            builder.with_bind_default(self.config.port)
        } else {
            builder.with_bind_address(bind_addr)
        };
        let server_config = builder.with_identity(self.tls_config.identity).build();

        let server = Endpoint::server(server_config).context("Failed to bind WebTransport endpoint")?;

        info!("WebTransport server listening on {}", bind_addr);
        info!("Certificate hash: {}", self.tls_config.cert_hash);

        loop {
            let incoming = server.accept().await;
            let session = self.session.clone();
            let metrics = self.metrics.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(incoming, session, metrics).await {
                    warn!("Connection error: {:#}", e);
                }
            });
        }
    }
}

/// Handle a single WebTransport connection
async fn handle_connection(
    incoming: wtransport::endpoint::IncomingSession,
    session: SessionHandle,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    let session_request = incoming.await?;

    debug!(
        "New connection from: {:?}, path: {}",
        session_request.authority(),
        session_request.path()
    );

    let connection = session_request.accept().await?;
    let (send, recv) = connection
        .accept_bi()
        .await
        .context("Client closed before opening a stream")?;

    let conn_id = Uuid::new_v4();
    metrics.connections_active.fetch_add(1, Ordering::Relaxed);
    serve_stream(conn_id, recv, send, &session, &metrics).await;
    metrics.connections_active.fetch_sub(1, Ordering::Relaxed);

    Ok(())
}

/// Pump one client stream until it closes, then tell the session
pub async fn serve_stream<R, W>(conn_id: ConnectionId, mut recv: R, mut send: W, session: &SessionHandle, metrics: &Metrics)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outbox, outbox_rx) = mpsc::unbounded_channel::<ServerMessage>();
    if let Err(e) = session.connect(conn_id, outbox) {
        warn!("Connection {} refused: {}", conn_id, e);
        return;
    }

    let writer = tokio::spawn(write_outbox(conn_id, send, outbox_rx));

    debug!("Connection {} ready", conn_id);

    loop {
        let message = match read_client_message(&mut recv).await {
            Ok(message) => message,
            Err(FramingError::ConnectionClosed) => break,
            Err(e) if !e.is_fatal() => {
                warn!("Failed to decode message from {}: {}", conn_id, e);
                metrics.messages_rejected.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            Err(e) => {
                warn!("Closing stream for {}: {}", conn_id, e);
                break;
            }
        };

        metrics.messages_received.fetch_add(1, Ordering::Relaxed);
        match session.client_message(conn_id, message) {
            Ok(()) => {}
            Err(SessionError::Full) => {
                warn!("Session queue full, dropping message from {}", conn_id);
                metrics.messages_rejected.fetch_add(1, Ordering::Relaxed);
            }
            Err(SessionError::Closed) => break,
        }
    }

    // The session drops the outbox on disconnect, which ends the writer
    session.disconnect(conn_id).await;
    if let Err(e) = writer.await {
        debug!("Writer task for {} ended abnormally: {}", conn_id, e);
    }
    debug!("Connection closed (conn_id: {})", conn_id);
}

/// Drain a connection's outbox into its send half.
///
/// A message that cannot be framed is skipped; only stream errors end the
/// writer.
async fn write_outbox<W>(conn_id: ConnectionId, mut send: W, mut outbox_rx: mpsc::UnboundedReceiver<ServerMessage>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outbox_rx.recv().await {
        match write_encoded(&mut send, &message).await {
            Ok(()) => {}
            Err(e @ (FramingError::MessageTooLarge(..) | FramingError::Encode(_))) => {
                warn!("Skipping message to {}: {}", conn_id, e);
            }
            Err(e) => {
                debug!("Write to {} failed: {}", conn_id, e);
                break;
            }
        }
    }
}
