//! EyeX Transport - connection to the engine
//!
//! A [`Transport`] opens one bidirectional JSON socket at a time and hands
//! back a channel pair ([`TransportLink`]). The [`Communicator`] owns the
//! reconnect loop on top of it: the handshake gate that loads
//! [`ProtocolConstants`](eyex_core::ProtocolConstants), request/response
//! correlation and the periodic time sync.

#![forbid(unsafe_code)]

pub mod communicator;
pub mod memory;
pub mod transport;
pub mod websocket;

pub use communicator::{
    Communicator, CommunicatorConfig, CommunicatorEvent, ConnectionState, ResponseFuture,
};
pub use memory::{MemoryPeer, MemoryServer, MemoryTransport};
pub use transport::{OutboundFrame, Transport, TransportEvent, TransportLink};
pub use websocket::{WebSocketConfig, WebSocketTransport};
