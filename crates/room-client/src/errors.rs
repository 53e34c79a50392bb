//! Room client error types.
//!
//! Every failure the session can report maps onto an [`ErrorCategory`] that
//! tells the embedding application whether the join attempt is lost, whether
//! a retry makes sense, or whether the call was simply made at the wrong time.
//! Best-effort notifications (`exitRoom`, `producerClosed`) and attribution
//! misses never surface here; they are logged and counted instead.

use crate::media::{MediaError, TransportDirection};
use crate::session::SessionState;
use common::types::{CardId, MediaKind, PeerId};
use thiserror::Error;

/// Coarse classification of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Join, capability load or transport creation was rejected.
    NegotiationFailure,
    /// Media acquisition or the produce round trip failed.
    ProduceFailure,
    /// A transport reached the `failed` connection state.
    TransportFailure,
    /// The operation was not valid for the current session or roster.
    Usage,
    /// Channel or bookkeeping failure inside the client.
    Internal,
}

/// Room client error type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A step of the join handshake was rejected.
    #[error("Negotiation failed at {step}: {reason}")]
    Negotiation { step: &'static str, reason: String },

    /// The media engine cannot run in this environment.
    #[error("Unsupported runtime: {0}")]
    UnsupportedRuntime(String),

    /// Producing local media failed.
    #[error("Produce {kind} failed: {reason}")]
    Produce { kind: MediaKind, reason: String },

    /// A transport failed and was closed.
    #[error("{direction} transport failed: {reason}")]
    Transport {
        direction: TransportDirection,
        reason: String,
    },

    /// The signaling server answered a request with an `error` field.
    #[error("Signaling request {method} rejected: {message}")]
    Signaling { method: String, message: String },

    /// The signaling transport itself could not deliver the request.
    #[error("Signaling unavailable: {0}")]
    SignalingUnavailable(String),

    /// The media engine reported a failure.
    #[error("Media engine error: {0}")]
    Media(String),

    /// The room snapshot could not be decoded.
    #[error("Roster parse error: {0}")]
    RosterParse(String),

    /// The operation is not allowed in the current session state.
    #[error("{operation} not allowed while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// The session actor is gone.
    #[error("Session closed")]
    SessionClosed,

    /// No roster entry for the given peer.
    #[error("Peer not found: {0}")]
    PeerNotFound(PeerId),

    /// No presentation card with the given id.
    #[error("Card not found: {0}")]
    CardNotFound(CardId),

    /// The local participant may not perform this action.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Classify this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            ClientError::Negotiation { .. }
            | ClientError::UnsupportedRuntime(_)
            | ClientError::RosterParse(_) => ErrorCategory::NegotiationFailure,
            ClientError::Produce { .. } => ErrorCategory::ProduceFailure,
            ClientError::Transport { .. } => ErrorCategory::TransportFailure,
            ClientError::InvalidState { .. }
            | ClientError::PeerNotFound(_)
            | ClientError::CardNotFound(_)
            | ClientError::PermissionDenied(_)
            | ClientError::Config(_) => ErrorCategory::Usage,
            ClientError::Signaling { .. }
            | ClientError::SignalingUnavailable(_)
            | ClientError::Media(_)
            | ClientError::SessionClosed
            | ClientError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Whether the current session attempt has to be abandoned.
    ///
    /// Negotiation failures are never retried; a new session must be built.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::NegotiationFailure | ErrorCategory::TransportFailure
        ) || matches!(self, ClientError::SessionClosed)
    }

    /// Wrap a failure that happened during the join handshake.
    pub(crate) fn negotiation(step: &'static str, err: impl Into<ClientError>) -> Self {
        match err.into() {
            // Keep the fatal runtime signal distinguishable.
            e @ ClientError::UnsupportedRuntime(_) => e,
            e @ ClientError::RosterParse(_) => e,
            e @ ClientError::Negotiation { .. } => e,
            other => ClientError::Negotiation {
                step,
                reason: other.to_string(),
            },
        }
    }

    /// Wrap a failure that happened while producing `kind`.
    pub(crate) fn produce(kind: MediaKind, err: impl Into<ClientError>) -> Self {
        match err.into() {
            e @ ClientError::Produce { .. } => e,
            other => ClientError::Produce {
                kind,
                reason: other.to_string(),
            },
        }
    }
}

impl From<MediaError> for ClientError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Unsupported(msg) => ClientError::UnsupportedRuntime(msg),
            other => ClientError::Media(other.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_category_mapping() {
        assert_eq!(
            ClientError::Negotiation {
                step: "join",
                reason: "room full".to_string()
            }
            .category(),
            ErrorCategory::NegotiationFailure
        );
        assert_eq!(
            ClientError::UnsupportedRuntime("no webrtc".to_string()).category(),
            ErrorCategory::NegotiationFailure
        );
        assert_eq!(
            ClientError::Produce {
                kind: MediaKind::Audio,
                reason: "denied".to_string()
            }
            .category(),
            ErrorCategory::ProduceFailure
        );
        assert_eq!(
            ClientError::Transport {
                direction: TransportDirection::Send,
                reason: "failed".to_string()
            }
            .category(),
            ErrorCategory::TransportFailure
        );
        assert_eq!(
            ClientError::PeerNotFound(PeerId::from("x")).category(),
            ErrorCategory::Usage
        );
        assert_eq!(
            ClientError::Internal("oops".to_string()).category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn test_fatality() {
        assert!(ClientError::UnsupportedRuntime("x".to_string()).is_fatal());
        assert!(ClientError::SessionClosed.is_fatal());
        assert!(!ClientError::Produce {
            kind: MediaKind::Video,
            reason: "busy".to_string()
        }
        .is_fatal());
        assert!(!ClientError::PermissionDenied("not trainer".to_string()).is_fatal());
    }

    #[test]
    fn test_negotiation_wrapping_keeps_runtime_signal() {
        let err = ClientError::negotiation(
            "load_device",
            MediaError::Unsupported("browser".to_string()),
        );
        assert!(matches!(err, ClientError::UnsupportedRuntime(_)));

        let err = ClientError::negotiation(
            "join",
            ClientError::Signaling {
                method: "join".to_string(),
                message: "room locked".to_string(),
            },
        );
        match err {
            ClientError::Negotiation { step, reason } => {
                assert_eq!(step, "join");
                assert!(reason.contains("room locked"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_produce_wrapping() {
        let err = ClientError::produce(MediaKind::Video, MediaError::Capture("no camera".to_string()));
        assert!(matches!(
            err,
            ClientError::Produce {
                kind: MediaKind::Video,
                ..
            }
        ));
        assert!(err.to_string().contains("no camera"));
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            ClientError::InvalidState {
                operation: "produce",
                state: SessionState::Joining
            }
            .to_string(),
            "produce not allowed while session is joining"
        );
        assert_eq!(
            ClientError::Signaling {
                method: "consume".to_string(),
                message: "no such producer".to_string()
            }
            .to_string(),
            "Signaling request consume rejected: no such producer"
        );
    }
}
