//! Client error handling
//!
//! Provides the typed error taxonomy for the chat client: authentication
//! failures, validation failures, and the transport class. Classification
//! helpers map server error names onto the taxonomy so callers can decide
//! whether an operation is retryable.

use thiserror::Error;

/// Errors that can occur in client operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Bad credentials or an expired/invalid token; recoverable by re-login
    #[error("Authentication failed: {reason}")]
    Auth { reason: String },

    /// Malformed create payload; surfaced to the immediate caller only
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// No connection to the server
    #[error("Not connected to server")]
    NotConnected,

    /// Request did not complete within the configured timeout
    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Connection dropped while the request was in flight
    #[error("Connection closed with request in flight")]
    ConnectionClosed,

    /// Network or socket failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or unexpected frame from the server
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Token storage failure
    #[error("Token storage error: {0}")]
    Storage(String),

    /// A created subscription is already active for this feed
    #[error("A created subscription is already active for '{collection}'")]
    AlreadySubscribed { collection: String },

    /// The sync core was already started for this client
    #[error("Sync core already started")]
    SyncAlreadyStarted,
}

impl ClientError {
    /// Classify a server-reported error by its wire name
    ///
    /// Unrecognized names fall into the transport class.
    pub fn from_wire(name: &str, message: &str) -> Self {
        match name {
            "NotAuthenticated" | "Forbidden" | "TokenExpired" => ClientError::Auth {
                reason: message.to_string(),
            },
            "BadRequest" | "Unprocessable" => ClientError::Validation {
                message: message.to_string(),
            },
            "Timeout" => ClientError::Timeout { seconds: 0 },
            _ => ClientError::Transport(format!("{}: {}", name, message)),
        }
    }

    /// Whether this is an authentication failure
    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Auth { .. })
    }

    /// Whether this is a validation failure
    pub fn is_validation(&self) -> bool {
        matches!(self, ClientError::Validation { .. })
    }

    /// Whether this belongs to the transport class
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::NotConnected
                | ClientError::Timeout { .. }
                | ClientError::ConnectionClosed
                | ClientError::Transport(_)
                | ClientError::Protocol(_)
        )
    }

    /// Whether retrying the same operation can succeed
    ///
    /// Transport failures are retryable; the caller must additionally hold
    /// an authenticated session for feed operations.
    pub fn is_retryable(&self) -> bool {
        self.is_transport()
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Protocol(err.to_string())
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_classification() {
        let err = ClientError::from_wire("NotAuthenticated", "Invalid login");
        assert!(matches!(err, ClientError::Auth { .. }));
        assert!(err.is_auth());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_validation_classification() {
        let err = ClientError::from_wire("BadRequest", "text is required");
        assert!(err.is_validation());
        assert!(!err.is_transport());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unknown_name_is_transport() {
        let err = ClientError::from_wire("GeneralError", "something broke");
        assert!(err.is_transport());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_transport_class() {
        assert!(ClientError::NotConnected.is_transport());
        assert!(ClientError::Timeout { seconds: 10 }.is_transport());
        assert!(ClientError::ConnectionClosed.is_transport());
        assert!(ClientError::Protocol("bad frame".into()).is_transport());
        assert!(!ClientError::Storage("disk".into()).is_transport());
    }

    #[test]
    fn test_error_display() {
        let err = ClientError::Auth {
            reason: "Invalid login".to_string(),
        };
        assert_eq!(err.to_string(), "Authentication failed: Invalid login");

        let err = ClientError::Timeout { seconds: 10 };
        assert!(err.to_string().contains("10s"));
    }

    #[test]
    fn test_json_error_is_protocol() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: ClientError = parse_err.into();
        assert!(matches!(err, ClientError::Protocol(_)));
    }
}
