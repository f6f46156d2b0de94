//! In-memory transport
//!
//! Stands in for the engine in tests. Every successful open hands a
//! [`MemoryPeer`] to the [`MemoryServer`], which plays the engine side of
//! that connection. Refusing connections makes open attempts fail.

use std::sync::Arc;

use async_trait::async_trait;
use eyex_core::{EyeXError, Result};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use crate::transport::{OutboundFrame, Transport, TransportEvent, TransportLink};

#[derive(Debug)]
struct MemoryState {
    accepting: bool,
    open_attempts: usize,
}

/// Client side of the in-memory transport
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

/// Engine side: receives one peer per accepted connection
#[derive(Debug)]
pub struct MemoryServer {
    state: Arc<Mutex<MemoryState>>,
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

/// Engine end of one connection
#[derive(Debug)]
pub struct MemoryPeer {
    url: String,
    to_client: mpsc::UnboundedSender<TransportEvent>,
    from_client: mpsc::UnboundedReceiver<OutboundFrame>,
}

impl MemoryTransport {
    /// Create a connected transport/server pair that accepts connections
    pub fn new() -> (Self, MemoryServer) {
        let state = Arc::new(Mutex::new(MemoryState {
            accepting: true,
            open_attempts: 0,
        }));
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        (
            Self {
                state: Arc::clone(&state),
                peers: peers_tx,
            },
            MemoryServer {
                state,
                peers: peers_rx,
            },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, url: &str) -> Result<TransportLink> {
        {
            let mut state = self.state.lock();
            state.open_attempts += 1;
            if !state.accepting {
                return Err(EyeXError::transport(format!("Connection to {url} refused")));
            }
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            url: url.to_string(),
            to_client: inbound_tx,
            from_client: outbound_rx,
        };
        self.peers
            .send(peer)
            .map_err(|_| EyeXError::transport("Memory server is gone"))?;
        trace!(url, "Memory connection opened");
        Ok(TransportLink::new(outbound_tx, inbound_rx))
    }
}

impl MemoryServer {
    /// Accept or refuse future connection attempts
    pub fn set_accepting(&self, accepting: bool) {
        self.state.lock().accepting = accepting;
    }

    /// Number of open attempts so far, successful or not
    pub fn open_attempts(&self) -> usize {
        self.state.lock().open_attempts
    }

    /// Wait for the next accepted connection
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }

    /// Next accepted connection, if one is waiting
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.peers.try_recv().ok()
    }
}

impl MemoryPeer {
    /// URL the client opened
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Deliver a frame to the client; false if the client is gone
    pub fn send(&self, value: Value) -> bool {
        self.to_client.send(TransportEvent::Message(value)).is_ok()
    }

    /// Close the connection from the engine side
    pub fn close(&self) {
        let _ = self.to_client.send(TransportEvent::Closed);
    }

    /// Wait for the next frame from the client
    pub async fn recv(&mut self) -> Option<OutboundFrame> {
        self.from_client.recv().await
    }

    /// Next frame from the client, if one is queued
    pub fn try_recv(&mut self) -> Option<OutboundFrame> {
        self.from_client.try_recv().ok()
    }

    /// Wait for the next JSON frame; `None` once the client closed
    pub async fn recv_json(&mut self) -> Option<Value> {
        match self.from_client.recv().await? {
            OutboundFrame::Json(value) => Some(value),
            OutboundFrame::Close => None,
        }
    }

    /// Drain every queued JSON frame
    pub fn drain_json(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            if let OutboundFrame::Json(value) = frame {
                frames.push(value);
            }
        }
        frames
    }
}
