//! WebSocket accept loop: turns each accepted connection into a session with
//! its own reader and writer tasks.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::registry::Registry;
use crate::session::{run_reader, run_writer};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

/// Room server bound to a listening socket
pub struct Server {
    listener: TcpListener,
    registry: Registry,
    ws_path: Arc<str>,
}

impl Server {
    /// Validates `config` and binds the listener.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let listener = TcpListener::bind(&config.listen_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.listen_addr.clone(),
                source,
            })?;
        info!(
            "Server listening on {} (path {}, tick {:?})",
            listener.local_addr()?,
            config.ws_path,
            config.tick_period
        );

        Ok(Self {
            listener,
            registry: Registry::new(&config),
            ws_path: Arc::from(config.ws_path.as_str()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Accepts connections until the listener fails. Each connection is
    /// served on its own task, so one client's failure never touches another.
    pub async fn run(self) -> Result<(), ServerError> {
        info!("Server started successfully");

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let registry = self.registry.clone();
                    let ws_path = Arc::clone(&self.ws_path);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, registry, ws_path).await {
                            warn!("Connection from {} ended early: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

/// Upgrades one TCP connection and runs its session to completion.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Registry,
    ws_path: Arc<str>,
) -> Result<(), ServerError> {
    let check_path = move |request: &Request, response: Response| {
        if request.uri().path() == &*ws_path {
            Ok(response)
        } else {
            let body = format!("no websocket endpoint at {}", request.uri().path());
            let mut refusal = ErrorResponse::new(Some(body));
            *refusal.status_mut() = StatusCode::NOT_FOUND;
            Err(refusal)
        }
    };

    let socket = accept_hdr_async(stream, check_path).await?;
    let (sink, stream) = socket.split();

    let (id, outbound) = registry.register(addr).await;
    let writer = tokio::spawn(run_writer(id, outbound, sink));

    run_reader(id, registry, stream).await;

    if let Err(e) = writer.await {
        error!("Writer task for session {} failed: {}", id, e);
    }
    debug!("Connection {} from {} closed", id, addr);
    Ok(())
}
