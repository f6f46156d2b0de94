//! EyeX Agent - session runtime of the EyeX web binding
//!
//! Everything above the wire lives here:
//!
//! - [`config`]: client configuration from TOML and the environment
//! - [`context`]: the per-session façade that dispatches inbound messages and builds commands
//! - [`cache`]: the binary space partition index of interactor rectangles
//! - [`interactors`]: descriptors, caching managers and the chainable configuration API
//! - [`agent`]: routing of queries and events across interactor managers
//! - [`states`] and [`streams`]: state paths and gaze data streams
//! - [`session`]: the bootstrap that ties them together once connected
//!
//! ```no_run
//! use eyex_agent::{ClientConfig, Session};
//!
//! # async fn run() -> eyex_core::Result<()> {
//! let session = Session::connect(ClientConfig::default()).await?;
//! session
//!     .interactors()
//!     .create(10.0, 10.0, 200.0, 80.0, None, None)?
//!     .make_activatable(None)?
//!     .activated(|_| true)?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

/// Client configuration
pub mod config;

/// Session context and message dispatch
pub mod context;

/// Spatial interactor caches
pub mod cache;

/// Interactor descriptors, managers and configuration
pub mod interactors;

/// Interactor manager registry
pub mod agent;

/// Engine state access
pub mod states;

pub mod streams;

/// Connect-and-ready bootstrap
pub mod session;

pub use agent::Agent;
pub use cache::{BspTree, InteractorCache, StandardInteractorCache};
pub use config::ClientConfig;
pub use context::{Context, HandlerTicket, InboundMessage};
pub use interactors::{
    CachingInteractorManager, InteractorConfiguration, InteractorDescriptor, InteractorEventName,
    InteractorFacility, InteractorManager, MutableInteractorDescriptor,
};
pub use session::Session;
pub use states::StatesHelper;
pub use streams::{DataCallback, StreamHelper, StreamingDataProvider};
