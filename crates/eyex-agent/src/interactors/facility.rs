//! Application entry point for creating interactors.

use std::collections::HashMap;
use std::sync::Arc;

use eyex_core::{EyeXError, Rect, Result};
use parking_lot::Mutex;

use super::configuration::InteractorConfiguration;
use super::descriptor::MutableInteractorDescriptor;
use super::manager::CachingInteractorManager;
use crate::agent::Agent;
use crate::context::Context;

/// Creates interactors under one caching manager registered with an agent.
#[derive(Debug)]
pub struct InteractorFacility {
    context: Arc<Context>,
    manager: Arc<CachingInteractorManager>,
    descriptors: Mutex<HashMap<String, Arc<MutableInteractorDescriptor>>>,
}

impl InteractorFacility {
    /// Create a facility and register its manager with `agent`.
    ///
    /// Without `bounding_rect` the manager's cache follows the virtual
    /// bounds of the context's coordinate converter.
    pub fn new(context: &Arc<Context>, agent: &Agent, bounding_rect: Option<Rect>) -> Result<Self> {
        let manager = CachingInteractorManager::new(
            format!("interactors{}", context.next_unique_id()),
            Arc::clone(context.coords()),
            bounding_rect,
            context.config().cache_min_size,
        );
        agent.add_interactor_manager(Arc::clone(&manager) as _)?;
        Ok(Self {
            context: Arc::clone(context),
            manager,
            descriptors: Mutex::new(HashMap::new()),
        })
    }

    /// The manager owning this facility's interactors
    pub fn manager(&self) -> &Arc<CachingInteractorManager> {
        &self.manager
    }

    /// Create an interactor at a client-space rectangle.
    ///
    /// Fails with `InvalidConfiguration` if `parent` has been removed.
    pub fn create(
        &self,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        parent: Option<&InteractorConfiguration>,
        z: Option<f64>,
    ) -> Result<InteractorConfiguration> {
        let parent = match parent {
            Some(parent) if !parent.is_valid() => return Err(EyeXError::InvalidConfiguration),
            Some(parent) => Some(parent.descriptor().as_ref()),
            None => None,
        };
        let descriptor = MutableInteractorDescriptor::create(
            &self.manager,
            self.context.next_unique_id().to_string(),
            Rect::new(x, y, width, height),
            parent,
            z.unwrap_or(0.0),
        );
        let configuration = InteractorConfiguration::new(Arc::clone(&descriptor));

        let mut descriptors = self.descriptors.lock();
        descriptors.retain(|_, d| !d.is_removed());
        descriptors.insert(configuration.id().to_string(), descriptor);
        Ok(configuration)
    }

    /// Configuration of a live interactor by local id
    pub fn get(&self, id: &str) -> Option<InteractorConfiguration> {
        let descriptors = self.descriptors.lock();
        descriptors
            .get(id)
            .filter(|d| !d.is_removed())
            .map(|d| InteractorConfiguration::new(Arc::clone(d)))
    }
}
