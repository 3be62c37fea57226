// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! TCP front end of the clip service
//!
//! One JSON request per line, one JSON response per line. Connections are
//! independent; the service mutex serializes the actual clip work.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{IpcError, Result};
use crate::protocol::{IpcRequest, IpcResponse};
use crate::service::ClipService;

pub struct ClipServer {
    service: Arc<ClipService>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ClipServer {
    /// Bind the listening socket. Failing here is fatal for the caller.
    pub async fn bind(address: &str, service: Arc<ClipService>) -> Result<Self> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| IpcError::Bind {
                address: address.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!("[CLIP-SERVER] Listening on {}", local_addr);

        Ok(Self {
            service,
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("[CLIP-SERVER] Connection from {}", peer);
                        let service = self.service.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, service, shutdown).await {
                                warn!("[CLIP-SERVER] Connection {} closed with error: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("[CLIP-SERVER] Accept error: {}", e);
                    }
                }
            }
        }

        info!("[CLIP-SERVER] Stopped");
        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    service: Arc<ClipService>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = respond(&line, &service).await;
        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
        writer.flush().await?;
    }
}

async fn respond(line: &str, service: &Arc<ClipService>) -> IpcResponse {
    let request: IpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!("[CLIP-SERVER] Rejecting malformed request: {}", e);
            return IpcResponse::failure(&IpcError::from(e));
        }
    };

    match request {
        IpcRequest::Status => IpcResponse::status(service.status()),
        IpcRequest::GetClip { max_duration } => {
            let service = service.clone();
            let outcome = tokio::task::spawn_blocking(move || service.get_clip(max_duration))
                .await
                .map_err(|e| IpcError::Worker(e.to_string()))
                .and_then(|result| result);
            match outcome {
                Ok(clip) => IpcResponse::clip(&clip),
                Err(e) => IpcResponse::failure(&e),
            }
        }
    }
}
