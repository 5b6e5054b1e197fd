// Numan Thabit 2025
//! Accept loop and per-connection tasks for the reflector.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use bytes::{Buf, BytesMut};
use fling_wire::decode_frame_from_slice;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::reflector::{ReflectError, Reflector};

/// Running server handle, used to initiate shutdown.
pub struct ServerHandle {
    local_addr: SocketAddr,
    canceller: CancellationToken,
    accept_task: Option<JoinHandle<()>>,
    connections: TaskTracker,
}

impl ServerHandle {
    /// Address the listener actually bound, useful with port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, close every connection and wait for their tasks.
    pub async fn shutdown(mut self) -> Result<()> {
        self.canceller.cancel();
        if let Some(task) = self.accept_task.take() {
            task.await.context("accept loop panicked")?;
        }
        self.connections.close();
        self.connections.wait().await;
        info!(addr = %self.local_addr, "fling server stopped");
        Ok(())
    }
}

/// Bind the listener and start serving in the current tokio runtime.
pub async fn launch_server(config: ServerConfig) -> Result<ServerHandle> {
    config.validate()?;
    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "fling server listening");

    let canceller = CancellationToken::new();
    let connections = TaskTracker::new();
    let accept_task = tokio::spawn(accept_loop(
        listener,
        config,
        canceller.clone(),
        connections.clone(),
    ));

    Ok(ServerHandle {
        local_addr,
        canceller,
        accept_task: Some(accept_task),
        connections,
    })
}

async fn accept_loop(
    listener: TcpListener,
    config: ServerConfig,
    shutdown: CancellationToken,
    connections: TaskTracker,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("accept loop exiting");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let config = config.clone();
                        let shutdown = shutdown.child_token();
                        connections.spawn(async move {
                            match serve_connection(stream, &config, shutdown).await {
                                Ok(()) => debug!(%peer, "connection closed"),
                                Err(err) => warn!(%peer, error = %err, "connection failed"),
                            }
                        });
                    }
                    Err(err) => warn!(error = %err, "accept failed"),
                }
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    config: &ServerConfig,
    shutdown: CancellationToken,
) -> Result<(), ReflectError> {
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();
    let mut reflector = Reflector::new(config.max_calls_per_connection);
    let mut inbound = BytesMut::with_capacity(config.io_buffer);
    let mut outbound = Vec::with_capacity(config.io_buffer);

    loop {
        while let Some((frame, used)) = decode_frame_from_slice(&inbound)? {
            inbound.advance(used);
            reflector.handle(frame, &mut outbound)?;
        }
        // Flush only once every complete frame has been answered.
        if !outbound.is_empty() {
            writer.write_all(&outbound).await?;
            outbound.clear();
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            read = reader.read_buf(&mut inbound) => {
                if read? == 0 {
                    break;
                }
            }
        }
    }

    let stats = reflector.stats();
    debug!(
        calls = stats.calls_opened,
        rejected = stats.calls_rejected,
        echoed = stats.messages_echoed,
        abandoned = reflector.live_calls(),
        "connection finished"
    );
    Ok(())
}
