//! Plugin-side RPC server: accept loop and per-connection handler.
//!
//! Hosts a [`CostSource`] behind the wire protocol so a plugin binary only
//! implements the trait. Requests on one connection are served concurrently;
//! responses may leave in any order and are matched by id on the client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::ipc::codec::{
    decode_msgpack, encode_msgpack, read_frame, write_frame, RequestEnvelope, ResponseEnvelope,
    MSG_REQUEST,
};
use crate::ipc::router;
use crate::plugin::CostSource;
use crate::types::{Error, IpcConfig, Result};

/// Environment variable carrying the port a plugin must listen on.
///
/// Deliberately not `PORT`, which hosting platforms set for their own use.
pub const PORT_ENV: &str = "CLOUDCOST_PLUGIN_PORT";

/// Resolve the listen port from `--port=N` / `--port N` arguments, falling
/// back to [`PORT_ENV`]. Arguments win over the environment.
pub fn resolve_port<I, S>(args: I, env_port: Option<String>) -> Result<u16>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let arg = arg.as_ref();
        let raw = if let Some(value) = arg.strip_prefix("--port=") {
            Some(value.to_string())
        } else if arg == "--port" {
            args.next().map(|v| v.as_ref().to_string())
        } else {
            None
        };
        if let Some(raw) = raw {
            return parse_port(&raw);
        }
    }
    match env_port {
        Some(raw) => parse_port(&raw),
        None => Err(Error::validation(format!(
            "no port given: pass --port=N or set {}",
            PORT_ENV
        ))),
    }
}

fn parse_port(raw: &str) -> Result<u16> {
    raw.trim()
        .parse::<u16>()
        .map_err(|_| Error::validation(format!("invalid port {:?}", raw)))
}

/// RPC server hosting one cost source.
pub struct PluginServer {
    source: Arc<dyn CostSource>,
    cancel: CancellationToken,
    ipc_config: IpcConfig,
}

impl std::fmt::Debug for PluginServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginServer")
            .field("source", &self.source.name())
            .field("ipc_config", &self.ipc_config)
            .finish()
    }
}

impl PluginServer {
    pub fn new(source: Arc<dyn CostSource>, ipc_config: IpcConfig) -> Self {
        Self {
            source,
            cancel: CancellationToken::new(),
            ipc_config,
        }
    }

    /// Bind `127.0.0.1:port` and serve until shut down.
    pub async fn serve_port(&self, port: u16) -> Result<()> {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port))).await?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener until shut down.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let conn_semaphore = Arc::new(Semaphore::new(self.ipc_config.max_connections));
        tracing::info!(
            "Plugin {} listening on {} (max_connections={})",
            self.source.name(),
            listener.local_addr()?,
            self.ipc_config.max_connections,
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Plugin server shutting down");
                    break;
                }
                accept = listener.accept() => {
                    let (stream, peer) = accept?;

                    let permit = match conn_semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            tracing::warn!(
                                "Connection from {} rejected: at max_connections ({})",
                                peer,
                                self.ipc_config.max_connections,
                            );
                            drop(stream);
                            continue;
                        }
                    };

                    tracing::debug!("RPC connection from {}", peer);
                    let source = Arc::clone(&self.source);
                    let cancel = self.cancel.clone();
                    let ipc_config = self.ipc_config.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, source, cancel, ipc_config, permit).await {
                            tracing::warn!("Connection from {} error: {}", peer, e);
                        }
                    });
                }
            }
        }
        Ok(())
    }

    /// Token that stops the accept loop and open connections.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn handle_connection(
    stream: TcpStream,
    source: Arc<dyn CostSource>,
    cancel: CancellationToken,
    ipc_config: IpcConfig,
    _permit: OwnedSemaphorePermit,
) -> std::io::Result<()> {
    let (mut reader, writer) = stream.into_split();
    let writer = Arc::new(Mutex::new(writer));
    let read_timeout = Duration::from_secs(ipc_config.read_timeout_secs);
    let write_timeout = Duration::from_secs(ipc_config.write_timeout_secs);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame_result = tokio::time::timeout(read_timeout, read_frame(&mut reader, ipc_config.max_frame_bytes)) => {
                let (msg_type, payload_bytes) = match frame_result {
                    Err(_elapsed) => {
                        tracing::debug!("Read timeout ({}s), dropping connection", ipc_config.read_timeout_secs);
                        break;
                    }
                    Ok(result) => match result? {
                        Some(frame) => frame,
                        None => break,
                    },
                };

                if msg_type != MSG_REQUEST {
                    let response = ResponseEnvelope::failure(
                        "",
                        "INVALID_ARGUMENT",
                        format!("Unexpected message type: 0x{:02X}", msg_type),
                    );
                    send(&writer, &response, write_timeout).await?;
                    continue;
                }

                let request: RequestEnvelope = match decode_msgpack(&payload_bytes) {
                    Ok(request) => request,
                    Err(e) => {
                        let response = ResponseEnvelope::failure("", "INVALID_ARGUMENT", e.to_string());
                        send(&writer, &response, write_timeout).await?;
                        continue;
                    }
                };

                let source = Arc::clone(&source);
                let writer = Arc::clone(&writer);
                tokio::spawn(async move {
                    let id = request.id.clone();
                    let response = match router::route_request(source.as_ref(), &request.service, &request.method, request.body).await {
                        Ok(body) => ResponseEnvelope::success(id, body),
                        Err(e) => {
                            tracing::debug!("{} failed: {}", request.method, e);
                            ResponseEnvelope::failure(id, e.to_ipc_error_code(), e.to_string())
                        }
                    };
                    if let Err(e) = send(&writer, &response, write_timeout).await {
                        tracing::warn!("Failed to write {} response: {}", request.method, e);
                    }
                });
            }
        }
    }

    Ok(())
}

async fn send(
    writer: &Mutex<OwnedWriteHalf>,
    response: &ResponseEnvelope,
    timeout: Duration,
) -> std::io::Result<()> {
    let encoded = encode_msgpack(response)?;
    let mut guard = writer.lock().await;
    timed_write(&mut *guard, response.msg_type(), &encoded, timeout).await
}

/// Write a frame with a timeout. Slow consumers lose the connection.
async fn timed_write<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg_type: u8,
    payload: &[u8],
    timeout: Duration,
) -> std::io::Result<()> {
    tokio::time::timeout(timeout, write_frame(writer, msg_type, payload))
        .await
        .map_err(|_| {
            tracing::warn!("Write timeout ({}s), dropping connection", timeout.as_secs());
            std::io::Error::new(std::io::ErrorKind::TimedOut, "write timeout")
        })?
}
