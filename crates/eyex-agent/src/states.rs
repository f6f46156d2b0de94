//! Engine state access by path.

use std::sync::Arc;

use eyex_core::Result;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::context::{Context, HandlerTicket};

/// Value-level convenience over the context's state commands.
#[derive(Debug, Clone)]
pub struct StatesHelper {
    context: Arc<Context>,
}

impl StatesHelper {
    /// Create a helper for `context`
    pub fn new(context: Arc<Context>) -> Self {
        Self { context }
    }

    /// Read the value at `state_path`
    pub fn get(&self, state_path: &str) -> BoxFuture<'static, Result<Value>> {
        let bag = self.context.get_state_async(state_path);
        Box::pin(async move { Ok(bag.await?.data) })
    }

    /// Write `data` at `state_path`
    pub fn set(&self, state_path: &str, data: Value) -> BoxFuture<'static, Result<()>> {
        let bag = self.context.create_state_bag(state_path, data);
        self.context.set_state_async(&bag)
    }

    /// Call `callback` with the new value whenever `state_path` may have changed
    pub fn subscribe(
        &self,
        state_path: &str,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> HandlerTicket {
        self.context
            .register_state_changed_handler(state_path, move |bag| callback(&bag.data))
    }

    /// Stop a subscription; returns whether it was active
    pub fn unsubscribe(&self, ticket: HandlerTicket) -> bool {
        self.context.unregister_state_changed_handler(ticket)
    }
}
