//! Transport abstraction
//!
//! Opening a transport either fails (the connection attempt failed) or yields
//! a live link. A link is a pair of channels: frames go out through
//! `outbound`, parsed JSON frames and the final `Closed` come in through
//! `inbound`. Dropping the outbound sender or sending [`OutboundFrame::Close`]
//! closes the socket.

use async_trait::async_trait;
use eyex_core::Result;
use serde_json::Value;
use tokio::sync::mpsc;

/// Frame queued for the socket
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// JSON value, sent as one text frame
    Json(Value),
    /// Close the socket
    Close,
}

/// What the socket reported
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A frame parsed as JSON
    Message(Value),
    /// The socket closed; no further events follow
    Closed,
}

/// A live connection
#[derive(Debug)]
pub struct TransportLink {
    /// Frames to send
    pub outbound: mpsc::UnboundedSender<OutboundFrame>,
    /// Events received
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportLink {
    /// Build a link from its two channel ends
    pub fn new(
        outbound: mpsc::UnboundedSender<OutboundFrame>,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }
}

/// Something that can open a socket to the engine.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection to `url`.
    ///
    /// Fails when the connection could not be established, including when
    /// the peer closes before the socket is open.
    async fn open(&self, url: &str) -> Result<TransportLink>;
}
