// src/error.rs
//
// Typed errors for hub, probe and session transport failures.
// Coordinator-level APIs convert these to String for the outer shell.

use std::fmt;

/// What went wrong, independent of which target it happened to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Could not reach the target at all (refused, DNS, transport setup)
    Connection,
    /// The target did not answer within the stage timeout
    Timeout,
    /// The target answered, but not the way the protocol requires
    Protocol,
    /// The request was rejected locally before any I/O
    Precondition,
}

/// Error carrying the failing target (device, hub, bridge address) alongside
/// the failure kind. Mirrors the constructor style used by the stream probes.
#[derive(Clone, Debug)]
pub struct CoreError {
    pub kind: ErrorKind,
    /// Which target failed, e.g. "hub(device 3)" or "bridge(192.168.1.9:8081)"
    pub target: String,
    pub message: String,
}

impl CoreError {
    pub fn connection(target: &str, message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Connection, target: target.to_string(), message: message.into() }
    }

    pub fn timeout(target: &str, message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Timeout, target: target.to_string(), message: message.into() }
    }

    pub fn protocol(target: &str, message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Protocol, target: target.to_string(), message: message.into() }
    }

    pub fn precondition(target: &str, message: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Precondition, target: target.to_string(), message: message.into() }
    }

    /// Transient failures are retried against the probe budget; everything
    /// else is surfaced to the caller immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, ErrorKind::Connection | ErrorKind::Timeout)
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Connection => "connection",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Precondition => "precondition",
        };
        write!(f, "{} error [{}]: {}", kind, self.target, self.message)
    }
}

impl std::error::Error for CoreError {}

impl From<CoreError> for String {
    fn from(e: CoreError) -> Self {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_target_and_kind() {
        let e = CoreError::timeout("hub(device 3)", "connect");
        let s = String::from(e);
        assert!(s.contains("timeout"));
        assert!(s.contains("hub(device 3)"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(CoreError::connection("x", "refused").is_transient());
        assert!(CoreError::timeout("x", "slow").is_transient());
        assert!(!CoreError::protocol("x", "bad body").is_transient());
        assert!(!CoreError::precondition("x", "no device code").is_transient());
    }
}
