//! Per-context coordinator of interactor managers.
//!
//! Every query is answered with one snapshot that all managers populate
//! and that is committed once. Every event goes to the single manager whose
//! id prefixes the event's interactor id.

use std::sync::{Arc, Weak};

use eyex_core::{invoke_isolated, Event, EyeXError, Query, Result};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::context::{Context, HandlerTicket};
use crate::interactors::InteractorManager;

/// Owner of the interactor managers of one context
pub struct Agent {
    context: Weak<Context>,
    managers: Mutex<IndexMap<String, Arc<dyn InteractorManager>>>,
    tickets: Vec<HandlerTicket>,
}

impl Agent {
    /// Create an agent and subscribe it to the context's queries and events
    pub fn new(context: &Arc<Context>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Agent>| {
            let on_query = weak.clone();
            let query_ticket = context.register_query_handler(move |query| {
                if let Some(agent) = on_query.upgrade() {
                    agent.on_query(query);
                }
            });
            let on_event = weak.clone();
            let event_ticket = context.register_event_handler(move |event| {
                if let Some(agent) = on_event.upgrade() {
                    agent.on_event(event);
                }
            });
            Agent {
                context: Arc::downgrade(context),
                managers: Mutex::new(IndexMap::new()),
                tickets: vec![query_ticket, event_ticket],
            }
        })
    }

    /// Register a manager; its id must be unused
    pub fn add_interactor_manager(&self, manager: Arc<dyn InteractorManager>) -> Result<()> {
        let id = manager.id().to_string();
        {
            let mut managers = self.managers.lock();
            if managers.contains_key(&id) {
                return Err(EyeXError::DuplicateInteractorManager { id });
            }
            managers.insert(id.clone(), Arc::clone(&manager));
        }
        if let Some(context) = self.context.upgrade() {
            manager.initialize(&context);
        }
        debug!(manager = %id, "Interactor manager added");
        Ok(())
    }

    /// Unregister a manager
    pub fn remove_interactor_manager(&self, id: &str) -> Option<Arc<dyn InteractorManager>> {
        self.managers.lock().shift_remove(id)
    }

    /// Registered manager by id
    pub fn interactor_manager(&self, id: &str) -> Option<Arc<dyn InteractorManager>> {
        self.managers.lock().get(id).cloned()
    }

    /// Ids of the registered managers, in registration order
    pub fn manager_ids(&self) -> Vec<String> {
        self.managers.lock().keys().cloned().collect()
    }

    fn on_query(&self, query: &Query) {
        let Some(context) = self.context.upgrade() else {
            return;
        };
        let mut snapshot = context.create_snapshot_for_query(query);
        let managers: Vec<_> = self.managers.lock().values().cloned().collect();
        for manager in managers {
            invoke_isolated(manager.id(), || manager.populate_snapshot(&mut snapshot, &context));
        }
        trace!(interactors = snapshot.len(), "Answering query");

        let commit = context.commit_snapshot(&snapshot);
        tokio::spawn(async move {
            if let Err(e) = commit.await {
                debug!(error = %e, "Snapshot commit failed");
            }
        });
    }

    fn on_event(&self, event: &Event) {
        let Some(context) = self.context.upgrade() else {
            return;
        };
        let prefix = event
            .interactor_id
            .split_once('/')
            .map_or(event.interactor_id.as_str(), |(prefix, _)| prefix);
        let manager = self.managers.lock().get(prefix).cloned();
        match manager {
            Some(manager) => {
                invoke_isolated(manager.id(), || manager.handle_event(event, &context));
            }
            None => trace!(interactor_id = %event.interactor_id, "No manager for event"),
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        if let Some(context) = self.context.upgrade() {
            for ticket in self.tickets.drain(..) {
                context.unregister_message_handler(ticket);
            }
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("managers", &self.manager_ids())
            .finish()
    }
}
