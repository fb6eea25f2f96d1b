//! Multiplexed RPC client over one TCP connection.
//!
//! Requests carry a fresh id; a background reader task routes each response
//! frame to the caller waiting on that id. Many calls may be in flight on the
//! same connection at once.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ipc::codec::{
    decode_msgpack, encode_msgpack, read_frame, write_frame, RequestEnvelope, ResponseEnvelope,
    MSG_ERROR, MSG_REQUEST, MSG_RESPONSE,
};
use crate::plugin::protocol::SERVICE;
use crate::types::{Error, IpcConfig, RequestId, Result};

type Reply = Result<serde_json::Value>;

/// Pending calls keyed by request id. `None` once the connection is gone.
type PendingTable = Arc<StdMutex<Option<HashMap<String, oneshot::Sender<Reply>>>>>;

/// Client half of the plugin RPC protocol.
#[derive(Debug)]
pub struct RpcClient {
    peer: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
    pending: PendingTable,
    reader: JoinHandle<()>,
    write_timeout: Duration,
}

impl RpcClient {
    /// Connect to a listening plugin.
    pub async fn connect(addr: SocketAddr, config: &IpcConfig) -> Result<Self> {
        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::timeout(format!("connecting to {} after {:?}", addr, connect_timeout)))?
            .map_err(|e| Error::launch(format!("connecting to {}: {}", addr, e)))?;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream, config))
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: TcpStream, config: &IpcConfig) -> Self {
        let peer = stream
            .peer_addr()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 0)));
        let (reader, writer) = stream.into_split();
        let pending: PendingTable = Arc::new(StdMutex::new(Some(HashMap::new())));
        let reader = tokio::spawn(read_loop(
            reader,
            Arc::clone(&pending),
            config.max_frame_bytes,
            peer,
        ));
        Self {
            peer,
            writer: Mutex::new(writer),
            pending,
            reader,
            write_timeout: Duration::from_secs(config.write_timeout_secs),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Whether the connection has been closed by the peer.
    pub fn is_closed(&self) -> bool {
        lock(&self.pending).is_none()
    }

    /// Invoke `method` and decode its response body.
    ///
    /// Fails with [`Error::Timeout`] after `timeout` and with
    /// [`Error::Cancelled`] when `cancel` fires; either way the pending entry
    /// is released and a late response is discarded.
    pub async fn call<Req, Resp>(
        &self,
        method: &str,
        request: &Req,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let id = RequestId::new().to_string();
        let envelope = RequestEnvelope {
            id: id.clone(),
            service: SERVICE.to_string(),
            method: method.to_string(),
            body: serde_json::to_value(request)?,
        };
        let payload = encode_msgpack(&envelope)?;

        let (tx, rx) = oneshot::channel();
        match lock(&self.pending).as_mut() {
            Some(table) => {
                table.insert(id.clone(), tx);
            }
            None => {
                return Err(Error::launch(format!("connection to {} is closed", self.peer)));
            }
        }
        let _guard = PendingGuard {
            pending: &self.pending,
            id: &id,
        };

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::cancelled(format!("{} cancelled", method)));
            }
            outcome = tokio::time::timeout(timeout, self.exchange(method, &payload, rx)) => {
                outcome.map_err(|_| Error::timeout(format!("{} after {:?}", method, timeout)))??
            }
        };
        Ok(serde_json::from_value(body)?)
    }

    async fn exchange(
        &self,
        method: &str,
        payload: &[u8],
        rx: oneshot::Receiver<Reply>,
    ) -> Result<serde_json::Value> {
        {
            let mut writer = self.writer.lock().await;
            tokio::time::timeout(self.write_timeout, write_frame(&mut *writer, MSG_REQUEST, payload))
                .await
                .map_err(|_| Error::timeout(format!("writing {} to {}", method, self.peer)))??;
        }
        rx.await
            .map_err(|_| Error::protocol(format!("connection to {} dropped {}", self.peer, method)))?
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Removes a pending entry when the call finishes, times out, or is dropped.
struct PendingGuard<'a> {
    pending: &'a PendingTable,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Some(table) = lock(self.pending).as_mut() {
            table.remove(self.id);
        }
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    pending: PendingTable,
    max_frame_bytes: u32,
    peer: SocketAddr,
) {
    let reason = loop {
        let (msg_type, payload) = match read_frame(&mut reader, max_frame_bytes).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break "connection closed by plugin".to_string(),
            Err(e) => break format!("read failed: {}", e),
        };
        if msg_type != MSG_RESPONSE && msg_type != MSG_ERROR {
            tracing::warn!("Ignoring frame type 0x{:02X} from {}", msg_type, peer);
            continue;
        }
        let envelope: ResponseEnvelope = match decode_msgpack(&payload) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!("Malformed response from {}: {}", peer, e);
                continue;
            }
        };
        let waiter = lock(&pending)
            .as_mut()
            .and_then(|table| table.remove(&envelope.id));
        match waiter {
            Some(tx) => {
                let _ = tx.send(into_reply(envelope));
            }
            None => tracing::debug!("Discarding late response {} from {}", envelope.id, peer),
        }
    };

    tracing::debug!("RPC reader for {} stopped: {}", peer, reason);
    let drained = lock(&pending).take().unwrap_or_default();
    for (_, tx) in drained {
        let _ = tx.send(Err(Error::protocol(format!("{}: {}", peer, reason))));
    }
}

fn into_reply(envelope: ResponseEnvelope) -> Reply {
    if envelope.ok {
        return Ok(envelope.body.unwrap_or(serde_json::Value::Null));
    }
    match envelope.error {
        Some(err) => Err(Error::from_wire(&err.code, err.message)),
        None => Err(Error::protocol("error response without error body")),
    }
}
