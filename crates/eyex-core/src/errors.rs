//! Unified error system for the EyeX client runtime
//!
//! One error type covers the four failure families of the runtime:
//! connection failures (recovered by the reconnect loop and only logged),
//! request failures (rejected request futures), programmer errors such as
//! using a removed interactor configuration (returned synchronously), and
//! malformed wire data.

use std::time::Duration;

/// Unified error type for all EyeX operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EyeXError {
    /// The communicator has no live connection
    #[error("Not connected to the engine")]
    NotConnected,

    /// A pending request was cancelled before a response arrived
    #[error("Request cancelled: {reason}")]
    RequestCancelled {
        /// Why the request was cancelled
        reason: String,
    },

    /// The engine answered with a non-ok result code
    #[error("Request failed")]
    RequestFailed,

    /// The opt-in request timeout elapsed
    #[error("Request timed out after {0:?}")]
    RequestTimeout(Duration),

    /// Socket level failure
    #[error("Transport error: {message}")]
    Transport {
        /// Error message describing the transport failure
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Well-formed JSON that does not follow the wire contract
    #[error("Protocol error: {message}")]
    Protocol {
        /// Error message describing the contract violation
        message: String,
    },

    /// Operation on an interactor configuration that has been removed
    #[error("Invalid interactor configuration: the interactor has been removed")]
    InvalidConfiguration,

    /// An interactor manager with the same id is already registered
    #[error("Duplicate interactor manager id: {id}")]
    DuplicateInteractorManager {
        /// The conflicting manager id
        id: String,
    },

    /// Event subscription with a name no interactor raises
    #[error("Unknown interactor event name: {name}")]
    UnknownEventName {
        /// The rejected event name
        name: String,
    },

    /// Invalid input
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Client configuration could not be loaded or validated
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message describing the configuration problem
        message: String,
    },
}

impl EyeXError {
    /// Create a request cancelled error
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::RequestCancelled {
            reason: reason.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether retrying the whole operation later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::RequestCancelled { .. }
                | Self::RequestTimeout(_)
                | Self::Transport { .. }
        )
    }
}

/// Standard Result type for EyeX operations
pub type Result<T> = std::result::Result<T, EyeXError>;

impl From<serde_json::Error> for EyeXError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<base64::DecodeError> for EyeXError {
    fn from(err: base64::DecodeError) -> Self {
        Self::serialization(format!("invalid base64 mask data: {err}"))
    }
}
