// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Single-connection emulator socket
//!
//! The link accepts one emulator at a time; additional connections are
//! refused while one is active. Each accepted connection gets a fresh
//! [`ConnectionId`], and everything that happens on it reaches the consumer
//! as [`LinkEvent`]s in arrival order. A socket error on either direction
//! tears the connection down and the link goes back to waiting.

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::command::OutboundCommand;
use crate::error::{LinkError, Result};
use crate::guard::ProtocolGuard;
use crate::message::EmulatorMessage;

pub type ConnectionId = u64;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Connected {
        connection: ConnectionId,
        peer: SocketAddr,
    },
    Message {
        connection: ConnectionId,
        message: EmulatorMessage,
    },
    Disconnected {
        connection: ConnectionId,
        reason: Option<String>,
    },
}

struct ActiveConnection {
    id: ConnectionId,
    outgoing: mpsc::UnboundedSender<String>,
}

type ActiveSlot = Arc<Mutex<Option<ActiveConnection>>>;

/// Sending side of the link, cheap to clone.
#[derive(Clone)]
pub struct LinkHandle {
    active: ActiveSlot,
}

impl LinkHandle {
    /// Queue a command for the active connection.
    pub fn send(&self, command: &OutboundCommand) -> Result<()> {
        let active = self.active.lock();
        let connection = active.as_ref().ok_or(LinkError::NotConnected)?;
        let line = command.to_line();
        debug!("[EMU-LINK] -> #{} {}", connection.id, line);
        connection
            .outgoing
            .send(line)
            .map_err(|_| LinkError::NotConnected)
    }

    /// Queue a command only if `connection` is still the active one.
    pub fn send_to(&self, connection: ConnectionId, command: &OutboundCommand) -> Result<()> {
        if self.connection() != Some(connection) {
            return Err(LinkError::NotConnected);
        }
        self.send(command)
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.active.lock().as_ref().map(|c| c.id)
    }

    pub fn is_connected(&self) -> bool {
        self.active.lock().is_some()
    }
}

pub struct EmulatorLink {
    listener: TcpListener,
    local_addr: SocketAddr,
    guard: Arc<ProtocolGuard>,
}

impl EmulatorLink {
    /// Bind the emulator socket. Failing here is fatal for the caller.
    pub async fn bind(address: &str, guard: Arc<ProtocolGuard>) -> Result<Self> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| LinkError::Bind {
                address: address.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!("[EMU-LINK] Waiting for emulator on {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
            guard,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn guard(&self) -> &Arc<ProtocolGuard> {
        &self.guard
    }

    /// Run the accept loop in the background until `shutdown` flips to true.
    pub fn spawn(
        self,
        shutdown: watch::Receiver<bool>,
    ) -> (LinkHandle, mpsc::Receiver<LinkEvent>, JoinHandle<()>) {
        let active: ActiveSlot = Arc::new(Mutex::new(None));
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let handle = LinkHandle {
            active: active.clone(),
        };
        let task = tokio::spawn(self.accept_loop(active, events_tx, shutdown));
        (handle, events_rx, task)
    }

    async fn accept_loop(
        self,
        active: ActiveSlot,
        events: mpsc::Sender<LinkEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let next_id = AtomicU64::new(1);

        loop {
            let (stream, peer) = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("[EMU-LINK] Accept error: {}", e);
                        continue;
                    }
                }
            };

            let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
            let id = {
                let mut slot = active.lock();
                if let Some(current) = slot.as_ref() {
                    warn!(
                        "[EMU-LINK] Refusing {}: connection #{} is still active",
                        peer, current.id
                    );
                    continue;
                }
                let id = next_id.fetch_add(1, Ordering::Relaxed);
                *slot = Some(ActiveConnection {
                    id,
                    outgoing: outgoing_tx,
                });
                id
            };
            info!("[EMU-LINK] Emulator #{} connected from {}", id, peer);

            if events
                .send(LinkEvent::Connected {
                    connection: id,
                    peer,
                })
                .await
                .is_err()
            {
                debug!("[EMU-LINK] Event consumer gone, stopping");
                break;
            }

            let (reader, writer) = stream.into_split();
            tokio::spawn(serve_connection(
                id,
                reader,
                writer,
                outgoing_rx,
                self.guard.clone(),
                active.clone(),
                events.clone(),
                shutdown.clone(),
            ));
        }

        active.lock().take();
        info!("[EMU-LINK] Stopped");
    }
}

async fn serve_connection<R, W>(
    id: ConnectionId,
    reader: R,
    mut writer: W,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    guard: Arc<ProtocolGuard>,
    active: ActiveSlot,
    events: mpsc::Sender<LinkEvent>,
    mut shutdown: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    // Finishes with the write error, or `None` once the slot drops its sender.
    let mut writer_task = tokio::spawn(async move {
        while let Some(mut line) = outgoing.recv().await {
            line.push('\n');
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                return Some(e.to_string());
            }
            if let Err(e) = writer.flush().await {
                return Some(e.to_string());
            }
        }
        None
    });

    let mut lines = BufReader::new(reader).lines();
    let reason = loop {
        let next = tokio::select! {
            _ = shutdown.changed() => break Some("shutdown".to_string()),
            written = &mut writer_task => break Some(match written {
                Ok(Some(e)) => format!("write failed: {e}"),
                Ok(None) => "outgoing queue closed".to_string(),
                Err(e) => format!("writer task failed: {e}"),
            }),
            next = lines.next_line() => next,
        };
        match next {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let message = EmulatorMessage::parse(&line);
                guard.inspect(&line, &message);
                debug!("[EMU-LINK] <- #{} {}", id, message.kind());
                if events
                    .send(LinkEvent::Message {
                        connection: id,
                        message,
                    })
                    .await
                    .is_err()
                {
                    break Some("event consumer gone".to_string());
                }
            }
            Ok(None) => break None,
            Err(e) => break Some(e.to_string()),
        }
    };

    {
        let mut slot = active.lock();
        if slot.as_ref().is_some_and(|c| c.id == id) {
            slot.take();
        }
    }
    writer_task.abort();

    match &reason {
        Some(reason) => warn!("[EMU-LINK] Emulator #{} disconnected: {}", id, reason),
        None => info!("[EMU-LINK] Emulator #{} closed the connection", id),
    }
    let _ = events
        .send(LinkEvent::Disconnected {
            connection: id,
            reason,
        })
        .await;
}
