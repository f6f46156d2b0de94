//! Interactor management
//!
//! Applications describe interactive regions through an
//! [`InteractorFacility`], which hands out chainable
//! [`InteractorConfiguration`]s. Each region is backed by a
//! [`MutableInteractorDescriptor`] tracked in the spatial cache of a
//! [`CachingInteractorManager`].

mod configuration;
mod descriptor;
mod facility;
mod manager;

pub use configuration::InteractorConfiguration;
pub use descriptor::{
    EventCallback, InteractorDescriptor, InteractorEventName, MutableInteractorDescriptor,
};
pub use facility::InteractorFacility;
pub use manager::{CachingInteractorManager, InteractorManager};
