//! Service-worker style offline cache controller.
//!
//! This module owns the cache lifecycle:
//! - Install populates a new generation from the seed asset list (atomic)
//! - Activate purges stale generations and claims open pages
//! - Fetch serves cache-first, repopulating the cache from the network
//! - Message, sync, push and notification-click events round out the surface

mod controller;
pub mod events;
mod state;

pub use controller::CacheController;
pub use state::WorkerState;
