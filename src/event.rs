use crate::http::Request;
use crate::worker::events::{MessageCommand, NotificationClick, SyncEvent};

/// Lifecycle events delivered to the worker by its hosting environment.
///
/// The host awaits the future returned for each event before it may suspend
/// the worker; only a fetch event produces a response.
#[derive(Debug)]
pub enum WorkerEvent {
  /// Install a new cache generation
  Install,
  /// Promote the installed generation and purge stale ones
  Activate,
  /// An intercepted network request
  Fetch(Request),
  /// A command posted by a controlled page
  Message(MessageCommand),
  /// A background sync trigger
  Sync(SyncEvent),
  /// A raw push payload
  Push(Vec<u8>),
  /// A click on a notification or one of its actions
  NotificationClick(NotificationClick),
}
