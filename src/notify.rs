//! Notification surface of the worker.

use color_eyre::Result;
use tracing::info;

use crate::worker::events::Notification;

/// Trait for the host's notification surface.
pub trait Notifier: Send + Sync {
  /// Display a notification to the user.
  fn show(&self, notification: &Notification) -> Result<()>;

  /// Open or focus the application window at `url`.
  fn open_window(&self, url: &str) -> Result<()>;
}

/// Notifier that writes through the log. The CLI host has no display
/// surface, so notifications and window opens are recorded rather than shown.
pub struct LogNotifier;

impl Notifier for LogNotifier {
  fn show(&self, notification: &Notification) -> Result<()> {
    info!(
      title = %notification.title,
      body = %notification.body,
      "notification shown"
    );
    Ok(())
  }

  fn open_window(&self, url: &str) -> Result<()> {
    info!(url = %url, "opening app window");
    Ok(())
  }
}
