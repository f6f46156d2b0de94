//! WebSocket transport
//!
//! Client side only, using tungstenite. Each open spawns a reader task that
//! parses every text or binary frame as JSON and a writer task that drains
//! the outbound channel.

use std::time::Duration;

use async_trait::async_trait;
use eyex_core::{EyeXError, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{client_async, tungstenite::Message};
use tracing::{debug, trace, warn};
use url::Url;

use crate::transport::{OutboundFrame, Transport, TransportEvent, TransportLink};

/// WebSocket transport configuration
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Upper bound for TCP connect plus the WebSocket handshake
    pub connect_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Transport over a WebSocket connection.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    config: WebSocketConfig,
}

impl WebSocketTransport {
    /// Create a WebSocket transport
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &str) -> Result<TransportLink> {
        let url = Url::parse(url).map_err(|e| EyeXError::transport(format!("Invalid URL {url}: {e}")))?;
        let addr = url
            .socket_addrs(|| None)
            .map_err(|e| EyeXError::transport(format!("Cannot resolve {url}: {e}")))?
            .into_iter()
            .next()
            .ok_or_else(|| EyeXError::transport(format!("No address for {url}")))?;

        let (ws_stream, _response) = timeout(self.config.connect_timeout, async {
            let tcp = TcpStream::connect(addr)
                .await
                .map_err(|e| EyeXError::transport(format!("TCP connect failed: {e}")))?;
            client_async(url.as_str(), tcp)
                .await
                .map_err(|e| EyeXError::transport(format!("WebSocket connect failed: {e}")))
        })
        .await
        .map_err(|_| EyeXError::transport("WebSocket connect timeout"))??;

        debug!(url = %url, "WebSocket connected");

        let (mut sink, mut source) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutboundFrame>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<TransportEvent>();

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                match frame {
                    OutboundFrame::Json(value) => {
                        let text = match serde_json::to_string(&value) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!(error = %e, "Dropping unserializable frame");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            debug!(error = %e, "WebSocket send failed");
                            break;
                        }
                    }
                    OutboundFrame::Close => break,
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let parsed = match frame {
                    Ok(Message::Text(text)) => parse_frame(text.as_bytes()),
                    Ok(Message::Binary(bytes)) => parse_frame(&bytes),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(error = %e, "WebSocket receive failed");
                        break;
                    }
                };
                if let Some(value) = parsed {
                    if inbound_tx.send(TransportEvent::Message(value)).is_err() {
                        break;
                    }
                }
            }
            trace!("WebSocket reader finished");
            let _ = inbound_tx.send(TransportEvent::Closed);
        });

        Ok(TransportLink::new(outbound_tx, inbound_rx))
    }
}

fn parse_frame(bytes: &[u8]) -> Option<Value> {
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "Dropping frame that is not valid JSON");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_url_fails_the_attempt() {
        let transport = WebSocketTransport::default();
        let result = transport.open("not a url").await;
        assert!(matches!(result, Err(EyeXError::Transport { .. })));
    }

    #[test]
    fn non_json_frames_are_dropped() {
        assert_eq!(parse_frame(b"{\"a\":1}"), Some(serde_json::json!({"a": 1})));
        assert_eq!(parse_frame(b"hello"), None);
    }
}
