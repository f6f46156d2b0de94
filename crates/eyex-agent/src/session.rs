//! Session bootstrap
//!
//! [`Session::start`] is the ready sequence of a page: it opens the
//! connection, waits until the engine has sent its constants and then
//! builds the sub-systems that need them. Everything is owned by the
//! returned [`Session`]; there is no process-wide state.

use std::sync::Arc;

use eyex_core::{EyeXError, Result};
use eyex_transport::{Transport, WebSocketConfig, WebSocketTransport};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::info;

use crate::agent::Agent;
use crate::config::ClientConfig;
use crate::context::Context;
use crate::interactors::InteractorFacility;
use crate::states::StatesHelper;
use crate::streams::StreamHelper;

/// A connected session and its sub-systems
#[derive(Debug)]
pub struct Session {
    context: Arc<Context>,
    agent: Arc<Agent>,
    interactors: InteractorFacility,
    states: StatesHelper,
    streams: StreamHelper,
}

impl Session {
    /// Connect over a WebSocket to `config.url`
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let transport = WebSocketTransport::new(WebSocketConfig {
            connect_timeout: config.connect_timeout(),
        });
        Self::start(config, Arc::new(transport)).await
    }

    /// Open the connection and build the session once it is established.
    ///
    /// Connection attempts repeat until the engine answers, so this only
    /// returns early on an invalid configuration.
    pub async fn start(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let context = Context::new(config, transport)?;

        let (ready_tx, ready_rx) = oneshot::channel();
        let ready_tx = Mutex::new(Some(ready_tx));
        let ticket = context.register_connection_state_changed_handler(move |is_connected| {
            if is_connected {
                if let Some(tx) = ready_tx.lock().take() {
                    let _ = tx.send(());
                }
            }
        });
        context.enable_connection();
        let established = ready_rx.await;
        context.unregister_connection_state_changed_handler(ticket);
        if established.is_err() {
            return Err(EyeXError::NotConnected);
        }

        let agent = Agent::new(&context);
        let interactors = InteractorFacility::new(&context, &agent, None)?;
        let states = StatesHelper::new(Arc::clone(&context));
        let streams = StreamHelper::new(Arc::clone(&context));
        info!(url = %context.config().url, "Session ready");

        Ok(Self {
            context,
            agent,
            interactors,
            states,
            streams,
        })
    }

    /// Shared context
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Interactor manager registry
    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    /// Interactor creation
    pub fn interactors(&self) -> &InteractorFacility {
        &self.interactors
    }

    /// State access
    pub fn states(&self) -> &StatesHelper {
        &self.states
    }

    /// Data streams
    pub fn streams(&self) -> &StreamHelper {
        &self.streams
    }

    /// Close the connection and stop reconnecting
    pub fn shutdown(&self) {
        info!("Session shutting down");
        self.context.disable_connection();
    }
}
