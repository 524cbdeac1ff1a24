//! Error types for bridge calls and venue operations

use std::time::Duration;

/// Failure of a single instrument candidate during resolution
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateFailure {
    /// Candidate description (`symbol@exchange`)
    pub candidate: Box<str>,
    /// Why the venue did not qualify it
    pub reason: Box<str>,
}

impl std::fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.candidate, self.reason)
    }
}

/// Broad family of a [`BridgeError`], for callers that branch on kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Venue unreachable or session dropped
    Connection,
    /// Every instrument candidate failed
    Resolution,
    /// Malformed input, rejected before reaching the venue
    Validation,
    /// Venue rejected or cancelled the operation
    Venue,
    /// Caller stopped waiting for the reply
    Timeout,
    /// Session worker is no longer running
    WorkerStopped,
}

/// Error returned by bridge operations
#[derive(Clone, Debug, thiserror::Error)]
pub enum BridgeError {
    /// Venue unreachable or session dropped
    #[error("connection error: {reason}")]
    Connection {
        /// Error description
        reason: Box<str>,
    },
    /// All fallback candidates failed to qualify
    #[error("could not qualify instrument for symbol {symbol} ({} candidates tried): {}", .attempts.len(), join_attempts(.attempts))]
    Resolution {
        /// Requested symbol
        symbol: Box<str>,
        /// Per-candidate failures, in the order they were tried
        attempts: Vec<CandidateFailure>,
    },
    /// Malformed command input
    #[error("invalid request: {reason}")]
    Validation {
        /// Error description
        reason: Box<str>,
    },
    /// Venue rejected or cancelled the operation
    #[error("{reason}")]
    Venue {
        /// Venue-reported reason
        reason: Box<str>,
    },
    /// Deadline exceeded while waiting for the worker's reply.
    /// The operation itself may still complete on the venue.
    #[error("{operation} timeout after {}ms", .waited.as_millis())]
    Timeout {
        /// Operation name
        operation: &'static str,
        /// How long the caller waited
        waited: Duration,
    },
    /// Command could not be delivered or its reply channel was dropped
    #[error("session worker stopped")]
    WorkerStopped,
}

fn join_attempts(attempts: &[CandidateFailure]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl BridgeError {
    /// Build a validation error
    pub fn validation(reason: impl Into<Box<str>>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Build a venue error
    pub fn venue(reason: impl Into<Box<str>>) -> Self {
        Self::Venue {
            reason: reason.into(),
        }
    }

    /// Build a connection error
    pub fn connection(reason: impl Into<Box<str>>) -> Self {
        Self::Connection {
            reason: reason.into(),
        }
    }

    /// Kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Resolution { .. } => ErrorKind::Resolution,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Venue { .. } => ErrorKind::Venue,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::WorkerStopped => ErrorKind::WorkerStopped,
        }
    }

    /// Check if the caller merely stopped waiting
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if the session itself is unusable
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::WorkerStopped)
    }

    /// Check if the input was rejected before reaching the venue
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

/// Error reported by a [`crate::VenueSession`] implementation
#[derive(Clone, Debug, thiserror::Error)]
pub enum VenueError {
    /// Session is not connected or the connection dropped
    #[error("not connected: {0}")]
    Disconnected(Box<str>),
    /// Transport-level failure (network, handshake)
    #[error("transport error: {0}")]
    Transport(Box<str>),
    /// Venue does not know the requested contract
    #[error("no security definition found: {0}")]
    NotFound(Box<str>),
    /// Venue refused the request
    #[error("rejected: {0}")]
    Rejected(Box<str>),
}

impl From<VenueError> for BridgeError {
    fn from(err: VenueError) -> Self {
        match err {
            VenueError::Disconnected(_) | VenueError::Transport(_) => {
                BridgeError::connection(err.to_string())
            }
            VenueError::NotFound(_) | VenueError::Rejected(_) => BridgeError::venue(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_predicates() {
        let err = BridgeError::Timeout {
            operation: "order submission",
            waited: Duration::from_secs(30),
        };
        assert!(err.is_timeout());
        assert!(!err.is_connection());
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.to_string(), "order submission timeout after 30000ms");

        assert!(BridgeError::WorkerStopped.is_connection());
        assert!(BridgeError::validation("quantity must be positive").is_validation());
    }

    #[test]
    fn test_venue_error_mapping() {
        let err: BridgeError = VenueError::Disconnected("socket closed".into()).into();
        assert_eq!(err.kind(), ErrorKind::Connection);

        let err: BridgeError = VenueError::Rejected("insufficient margin".into()).into();
        assert_eq!(err.kind(), ErrorKind::Venue);
        assert!(err.to_string().contains("insufficient margin"));
    }

    #[test]
    fn test_resolution_message_lists_attempts() {
        let err = BridgeError::Resolution {
            symbol: "2800".into(),
            attempts: vec![
                CandidateFailure {
                    candidate: "2800@SEHK".into(),
                    reason: "no match".into(),
                },
                CandidateFailure {
                    candidate: "2800.HK@SMART".into(),
                    reason: "no match".into(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 candidates tried"));
        assert!(msg.contains("2800@SEHK: no match; 2800.HK@SMART: no match"));
    }
}
