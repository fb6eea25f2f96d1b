//! Plugin process supervisor.
//!
//! Spawns plugin executables on an ephemeral loopback port, waits for them to
//! accept connections, and owns the process table. Every child is spawned
//! with `kill_on_drop`, so dropping the supervisor reaps whatever is left.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::ipc::PORT_ENV;
use crate::types::{Error, PluginConfig, PluginName, Result, SessionId};

/// A running plugin process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginProcess {
    pub session: SessionId,
    pub name: PluginName,
    pub path: PathBuf,
    pub addr: SocketAddr,
    pub pid: Option<u32>,
}

#[derive(Debug)]
struct ChildEntry {
    name: PluginName,
    child: Child,
}

/// Launches plugins and tracks them until shutdown.
#[derive(Debug)]
pub struct Supervisor {
    config: PluginConfig,
    table: Mutex<HashMap<SessionId, ChildEntry>>,
}

impl Supervisor {
    pub fn new(config: PluginConfig) -> Self {
        Self {
            config,
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Launch one plugin executable.
    ///
    /// Returns the process handle and the first connection that reached the
    /// plugin, which becomes its RPC channel. Any failure leaves no child
    /// behind.
    pub async fn launch(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(PluginProcess, TcpStream)> {
        let name = PluginName::from_executable(path)
            .map_err(|e| Error::launch(format!("{}: {}", path.display(), e)))?;
        let addr = allocate_port()?;

        let mut command = Command::new(path);
        command
            .arg(format!("--port={}", addr.port()))
            .env(PORT_ENV, addr.port().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::launch(format!("plugin executable not found: {}", path.display()))
            } else {
                Error::launch(format!("failed to start {}: {}", path.display(), e))
            }
        })?;
        let pid = child.id();
        if let Some(stderr) = child.stderr.take() {
            forward_stderr(name.clone(), stderr);
        }

        let bind_timeout = self.config.bind_timeout_for(name.as_str());
        tracing::debug!(
            "Waiting up to {:?} for plugin {} (pid {:?}) to bind {}",
            bind_timeout,
            name,
            pid,
            addr
        );
        let stream = match self
            .wait_for_bind(&mut child, &name, addr, bind_timeout, cancel)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                reap(&mut child, self.config.shutdown_timeout).await;
                return Err(e);
            }
        };

        let process = PluginProcess {
            session: SessionId::new(),
            name: name.clone(),
            path: path.to_path_buf(),
            addr,
            pid,
        };
        self.table
            .lock()
            .await
            .insert(process.session.clone(), ChildEntry { name, child });
        tracing::info!("Plugin {} listening on {}", process.name, addr);
        Ok((process, stream))
    }

    async fn wait_for_bind(
        &self,
        child: &mut Child,
        name: &PluginName,
        addr: SocketAddr,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<TcpStream> {
        let deadline = Instant::now() + timeout;
        let poll = self.config.bind_poll_interval;
        loop {
            if let Some(status) = child.try_wait()? {
                return Err(Error::launch(format!(
                    "plugin {} exited before binding {} ({})",
                    name, addr, status
                )));
            }
            if let Ok(Ok(stream)) = tokio::time::timeout(poll, TcpStream::connect(addr)).await {
                return Ok(stream);
            }
            if Instant::now() >= deadline {
                return Err(Error::launch(format!(
                    "plugin {} did not accept connections on {} within {:?}; the binary may be \
                     out of date and not support the --port={} startup protocol (reinstall or \
                     update the plugin)",
                    name,
                    addr,
                    timeout,
                    addr.port()
                )));
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(Error::cancelled(format!("launch of plugin {}", name)));
                }
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }

    /// Terminate one plugin. Safe to call for a process that already exited
    /// or was already shut down.
    pub async fn shutdown(&self, session: &SessionId) {
        let entry = self.table.lock().await.remove(session);
        if let Some(mut entry) = entry {
            tracing::debug!("Shutting down plugin {}", entry.name);
            reap(&mut entry.child, self.config.shutdown_timeout).await;
        }
    }

    /// Terminate every live plugin.
    pub async fn shutdown_all(&self) {
        let entries: Vec<ChildEntry> = self.table.lock().await.drain().map(|(_, e)| e).collect();
        for mut entry in entries {
            tracing::debug!("Shutting down plugin {}", entry.name);
            reap(&mut entry.child, self.config.shutdown_timeout).await;
        }
    }

    /// Number of plugins in the process table.
    pub async fn live_count(&self) -> usize {
        self.table.lock().await.len()
    }
}

/// Reserve an ephemeral loopback port. The listener is released before the
/// plugin starts so the plugin can bind it.
fn allocate_port() -> Result<SocketAddr> {
    let listener = StdTcpListener::bind("127.0.0.1:0")
        .map_err(|e| Error::launch(format!("could not allocate a port: {}", e)))?;
    Ok(listener.local_addr()?)
}

/// Kill a child if it is still running and wait for it to exit.
async fn reap(child: &mut Child, grace: Duration) {
    match child.try_wait() {
        Ok(Some(_)) => return,
        Ok(None) => {}
        Err(e) => tracing::debug!("try_wait failed: {}", e),
    }
    if let Err(e) = child.start_kill() {
        tracing::debug!("kill failed (process likely gone): {}", e);
    }
    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        tracing::warn!("Plugin pid {:?} did not exit within {:?}", child.id(), grace);
    }
}

fn forward_stderr(name: PluginName, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(plugin = %name, "{}", line);
        }
    });
}
