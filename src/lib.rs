//! araise-offline - Offline cache controller for the ARAISE web app
//!
//! Reimplements the app's service-worker caching lifecycle: versioned cache
//! generations seeded at install, stale-generation purge at activation, and
//! cache-first fetch interception with network fallback, plus the message,
//! background-sync and push-notification surfaces around it.

pub mod app;
pub mod cache;
pub mod config;
pub mod event;
pub mod http;
pub mod net;
pub mod notify;
pub mod worker;
