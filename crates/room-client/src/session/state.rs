//! Session lifecycle states.

use serde::Serialize;
use std::fmt;

/// Lifecycle of one session.
///
/// ```text
/// Idle ─▶ Joining ─▶ Negotiating ─▶ Open ─▶ Exiting ─▶ Closed
///   │        │            │           │                  ▲
///   └────────┴────────────┴───────────┴──────────────────┘
/// ```
///
/// `Closed` is terminal; rejoining needs a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Joining,
    Negotiating,
    Open,
    Exiting,
    Closed,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Joining => "joining",
            SessionState::Negotiating => "negotiating",
            SessionState::Open => "open",
            SessionState::Exiting => "exiting",
            SessionState::Closed => "closed",
        }
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, SessionState::Open)
    }

    /// A join is in flight.
    #[must_use]
    pub const fn is_joining(&self) -> bool {
        matches!(self, SessionState::Joining | SessionState::Negotiating)
    }

    #[must_use]
    pub const fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Idle, SessionState::Joining)
                | (SessionState::Joining, SessionState::Negotiating)
                | (SessionState::Negotiating, SessionState::Open)
                | (SessionState::Open, SessionState::Exiting)
                | (SessionState::Exiting, SessionState::Closed)
                | (
                    SessionState::Idle
                        | SessionState::Joining
                        | SessionState::Negotiating
                        | SessionState::Open,
                    SessionState::Closed
                )
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SessionState; 6] = [
        SessionState::Idle,
        SessionState::Joining,
        SessionState::Negotiating,
        SessionState::Open,
        SessionState::Exiting,
        SessionState::Closed,
    ];

    #[test]
    fn test_happy_path() {
        assert!(SessionState::Idle.can_transition_to(SessionState::Joining));
        assert!(SessionState::Joining.can_transition_to(SessionState::Negotiating));
        assert!(SessionState::Negotiating.can_transition_to(SessionState::Open));
        assert!(SessionState::Open.can_transition_to(SessionState::Exiting));
        assert!(SessionState::Exiting.can_transition_to(SessionState::Closed));
    }

    #[test]
    fn test_closed_is_terminal() {
        for next in ALL {
            assert!(!SessionState::Closed.can_transition_to(next));
        }
    }

    #[test]
    fn test_no_shortcuts_or_reversals() {
        assert!(!SessionState::Idle.can_transition_to(SessionState::Open));
        assert!(!SessionState::Joining.can_transition_to(SessionState::Open));
        assert!(!SessionState::Open.can_transition_to(SessionState::Joining));
        assert!(!SessionState::Exiting.can_transition_to(SessionState::Open));
        for state in ALL {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn test_failure_edges() {
        assert!(SessionState::Joining.can_transition_to(SessionState::Closed));
        assert!(SessionState::Negotiating.can_transition_to(SessionState::Closed));
        assert!(SessionState::Open.can_transition_to(SessionState::Closed));
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionState::Negotiating.to_string(), "negotiating");
        assert!(SessionState::Open.is_open());
        assert!(SessionState::Joining.is_joining());
        assert!(!SessionState::Exiting.is_open());
    }
}
