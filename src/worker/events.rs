//! Event payloads delivered to the worker by its host.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;

/// Notification action id for opening the app.
pub const ACTION_EXPLORE: &str = "explore";
/// Notification action id for dismissing the notification.
pub const ACTION_CLOSE: &str = "close";

/// Command posted by a controlled page over the message channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum MessageCommand {
  /// Promote the waiting generation immediately instead of waiting for all
  /// tabs to close.
  SkipWaiting,
}

impl MessageCommand {
  /// Parse a raw page message, e.g. `{"action":"skipWaiting"}`.
  pub fn parse(raw: &[u8]) -> Result<Self> {
    serde_json::from_slice(raw).map_err(|e| eyre!("Unrecognized page message: {}", e))
  }
}

/// Background sync trigger.
#[derive(Debug, Clone)]
pub struct SyncEvent {
  /// Registration tag
  pub tag: String,
  /// Whether the host will not retry after this attempt
  pub last_chance: bool,
}

impl SyncEvent {
  pub fn new(tag: impl Into<String>, last_chance: bool) -> Self {
    Self {
      tag: tag.into(),
      last_chance,
    }
  }
}

/// Push payload shape: `{title, body, primaryKey}`.
///
/// Payloads arrive from outside the app's control; missing fields fall back
/// to the placeholder defaults and a payload that is not JSON at all yields
/// the full default.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PushPayload {
  pub title: String,
  pub body: String,
  pub primary_key: Option<u64>,
}

impl Default for PushPayload {
  fn default() -> Self {
    Self {
      title: "ARAISE".to_string(),
      body: "You have a new notification.".to_string(),
      primary_key: None,
    }
  }
}

impl PushPayload {
  /// Parse a raw push payload, falling back to placeholders.
  pub fn parse(raw: &[u8]) -> Self {
    serde_json::from_slice(raw).unwrap_or_default()
  }
}

/// A single action button on a notification.
#[derive(Debug, Clone)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

/// A user-visible notification.
#[derive(Debug, Clone)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub actions: Vec<NotificationAction>,
  pub primary_key: Option<u64>,
}

impl Notification {
  /// Build the notification shown for a push payload: title/body from the
  /// payload, plus the standard explore/close actions.
  pub fn from_push(payload: &PushPayload, icon: &str) -> Self {
    Self {
      title: payload.title.clone(),
      body: payload.body.clone(),
      icon: icon.to_string(),
      actions: vec![
        NotificationAction {
          action: ACTION_EXPLORE.to_string(),
          title: "Go to the app".to_string(),
        },
        NotificationAction {
          action: ACTION_CLOSE.to_string(),
          title: "Close the notification".to_string(),
        },
      ],
      primary_key: payload.primary_key,
    }
  }
}

/// A click on a notification or one of its action buttons.
#[derive(Debug, Clone, Default)]
pub struct NotificationClick {
  /// Action id, or None for a click on the notification body
  pub action: Option<String>,
  pub primary_key: Option<u64>,
}

impl NotificationClick {
  pub fn body() -> Self {
    Self::default()
  }

  pub fn action(action: impl Into<String>) -> Self {
    Self {
      action: Some(action.into()),
      primary_key: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_skip_waiting() {
    let cmd = MessageCommand::parse(br#"{"action":"skipWaiting"}"#).unwrap();
    assert_eq!(cmd, MessageCommand::SkipWaiting);
  }

  #[test]
  fn test_parse_unknown_message_fails() {
    assert!(MessageCommand::parse(br#"{"action":"selfDestruct"}"#).is_err());
    assert!(MessageCommand::parse(b"not json").is_err());
  }

  #[test]
  fn test_push_payload_full() {
    let payload =
      PushPayload::parse(br#"{"title":"Workout done","body":"Nice job!","primaryKey":3}"#);
    assert_eq!(payload.title, "Workout done");
    assert_eq!(payload.body, "Nice job!");
    assert_eq!(payload.primary_key, Some(3));
  }

  #[test]
  fn test_push_payload_partial_uses_placeholders() {
    let payload = PushPayload::parse(br#"{"title":"Hydrate"}"#);
    assert_eq!(payload.title, "Hydrate");
    assert_eq!(payload.body, "You have a new notification.");
    assert_eq!(payload.primary_key, None);
  }

  #[test]
  fn test_push_payload_malformed_uses_defaults() {
    let payload = PushPayload::parse(b"\xff\xfe not json");
    assert_eq!(payload.title, "ARAISE");
    assert_eq!(payload.body, "You have a new notification.");
  }

  #[test]
  fn test_notification_from_push_has_standard_actions() {
    let payload = PushPayload::parse(br#"{"title":"T","body":"B","primaryKey":1}"#);
    let notification = Notification::from_push(&payload, "/logo192.png");
    assert_eq!(notification.icon, "/logo192.png");
    assert_eq!(notification.actions.len(), 2);
    assert_eq!(notification.actions[0].action, ACTION_EXPLORE);
    assert_eq!(notification.actions[1].action, ACTION_CLOSE);
    assert_eq!(notification.primary_key, Some(1));
  }
}
