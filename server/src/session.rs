//! One connected participant and the two loops bound to its WebSocket.
//!
//! The reader loop feeds decoded client messages to the [`Registry`]; the
//! writer loop drains the session's outbound queue onto the socket. The two
//! run as separate tasks so a slow socket only ever backs up its own queue.

use crate::registry::Registry;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientMessage, ServerMessage, Slot};
use std::fmt::Display;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

pub type SessionId = u32;

/// Where a session plays once it has created or joined a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub code: String,
    pub slot: Slot,
    /// Identity reported as winner if this player survives
    pub identity: String,
}

/// Registry-side record of a connected client
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub addr: SocketAddr,
    pub connected_at: Instant,
    assignment: Option<Assignment>,
    outbound: mpsc::Sender<ServerMessage>,
}

impl Session {
    pub fn new(id: SessionId, addr: SocketAddr, outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            assignment: None,
            outbound,
        }
    }

    /// Binds the session to a room slot. An assignment is permanent, so a
    /// second call leaves the first in place and returns false.
    pub fn assign(&mut self, assignment: Assignment) -> bool {
        if self.assignment.is_some() {
            return false;
        }
        self.assignment = Some(assignment);
        true
    }

    pub fn assignment(&self) -> Option<&Assignment> {
        self.assignment.as_ref()
    }

    pub fn is_assigned(&self) -> bool {
        self.assignment.is_some()
    }

    /// Queues a message for the writer loop without waiting.
    ///
    /// A full queue drops the message; a closed queue means the writer has
    /// already gone and the message is discarded. Returns whether the
    /// message was queued.
    pub fn send(&self, message: ServerMessage) -> bool {
        match self.outbound.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                warn!(
                    "Outbound queue of session {} is full, dropping {}",
                    self.id,
                    message.kind()
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Session {} writer has exited, message discarded", self.id);
                false
            }
        }
    }
}

pub fn outbound_queue(
    capacity: usize,
) -> (mpsc::Sender<ServerMessage>, mpsc::Receiver<ServerMessage>) {
    mpsc::channel(capacity)
}

/// Reads client messages until the connection ends, then deregisters the
/// session. Frames that fail to decode are skipped.
pub async fn run_reader<S>(id: SessionId, registry: Registry, mut stream: S)
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match ClientMessage::parse(&text) {
                Ok(message) => registry.dispatch(id, message).await,
                Err(e) => warn!("Discarding message from session {}: {}", id, e),
            },
            Ok(Message::Close(_)) => {
                debug!("Session {} sent close frame", id);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                info!("Session {} connection error: {}", id, e);
                break;
            }
        }
    }

    registry.deregister(id).await;
}

/// Writes queued messages in order until every sender is gone, then sends a
/// close frame. Write failures are logged and do not end the loop; the
/// reader side decides when the session is over.
pub async fn run_writer<S>(id: SessionId, mut outbound: mpsc::Receiver<ServerMessage>, mut sink: S)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(message) = outbound.recv().await {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode {} for session {}: {}", message.kind(), id, e);
                continue;
            }
        };

        if let Err(e) = sink.send(Message::Text(text)).await {
            error!("Failed to write {} to session {}: {}", message.kind(), id, e);
        }
    }

    if let Err(e) = sink.send(Message::Close(None)).await {
        debug!("Close frame for session {} not delivered: {}", id, e);
    }
    debug!("Writer for session {} finished", id);
}
