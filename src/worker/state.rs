//! Worker lifecycle states and transitions.

use std::fmt;

/// Lifecycle states of the cache controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Initial state, nothing installed yet
  Parsed,
  /// Seed assets being fetched and written
  Installing,
  /// Generation installed, waiting to activate
  Installed,
  /// Purging stale generations
  Activating,
  /// Active and serving fetches
  Activated,
  /// Superseded or failed; terminal
  Redundant,
}

impl WorkerState {
  /// Check if this state allows fetch interception.
  pub fn can_intercept_fetch(&self) -> bool {
    matches!(self, Self::Activated)
  }

  /// Check if the worker is in a terminal state.
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Redundant)
  }
}

impl fmt::Display for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Parsed => write!(f, "parsed"),
      Self::Installing => write!(f, "installing"),
      Self::Installed => write!(f, "installed"),
      Self::Activating => write!(f, "activating"),
      Self::Activated => write!(f, "activated"),
      Self::Redundant => write!(f, "redundant"),
    }
  }
}

/// Check if a state transition is valid.
pub(crate) fn is_valid_transition(from: WorkerState, to: WorkerState) -> bool {
  use WorkerState::*;

  matches!(
    (from, to),
    // Normal lifecycle
    (Parsed, Installing) |
    (Installing, Installed) |
    (Installing, Redundant) |  // Install failed
    (Installed, Activating) |
    (Activating, Activated) |
    (Activating, Redundant) |  // Activation failed
    (Activated, Redundant) |   // Replaced by a newer generation
    // Re-install of an existing generation refreshes the seed batch
    (Installed, Installing)
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use WorkerState::*;

  #[test]
  fn test_normal_lifecycle_transitions() {
    assert!(is_valid_transition(Parsed, Installing));
    assert!(is_valid_transition(Installing, Installed));
    assert!(is_valid_transition(Installed, Activating));
    assert!(is_valid_transition(Activating, Activated));
  }

  #[test]
  fn test_failure_transitions() {
    assert!(is_valid_transition(Installing, Redundant));
    assert!(is_valid_transition(Activating, Redundant));
    assert!(is_valid_transition(Activated, Redundant));
  }

  #[test]
  fn test_reinstall_transition() {
    assert!(is_valid_transition(Installed, Installing));
  }

  #[test]
  fn test_invalid_transitions() {
    assert!(!is_valid_transition(Parsed, Activated));
    assert!(!is_valid_transition(Parsed, Activating));
    assert!(!is_valid_transition(Installing, Activating));
    assert!(!is_valid_transition(Redundant, Installing));
  }

  #[test]
  fn test_only_activated_intercepts_fetch() {
    assert!(Activated.can_intercept_fetch());
    assert!(!Parsed.can_intercept_fetch());
    assert!(!Installed.can_intercept_fetch());
    assert!(!Redundant.can_intercept_fetch());
  }

  #[test]
  fn test_redundant_is_terminal() {
    assert!(Redundant.is_terminal());
    assert!(!Activated.is_terminal());
  }
}
