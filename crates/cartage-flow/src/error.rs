//! Error types for the preparation domain.

use cartage_core::RequestId;

/// The result type used throughout cartage-flow.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in preparation operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid input to a write operation.
    ///
    /// Rejected before any mutation; no partial state change.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the invalid input.
        message: String,
    },

    /// A referenced request, slot, or spot does not exist.
    #[error("not found: {resource} '{key}'")]
    NotFound {
        /// The type of resource that was looked up.
        resource: &'static str,
        /// The key that was looked up.
        key: String,
    },

    /// An invariant would be violated by the operation.
    ///
    /// The caller retries at the application layer; conflicts are never
    /// silently coerced.
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflicting condition.
        message: String,
    },

    /// The external fleet call failed or timed out.
    ///
    /// Any ledger mutation already applied is preserved; callers surface
    /// this alongside a success indicator for the committed part.
    #[error("dispatch unavailable: {message}")]
    DispatchUnavailable {
        /// Description of the transport failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The manual override could not reconstruct exact state.
    ///
    /// The whole override transaction is rolled back; no partial
    /// correction is ever committed.
    #[error("integrity error: {message}")]
    Integrity {
        /// Description of what could not be resolved.
        message: String,
    },

    /// An operation was attempted against a request in the wrong state.
    #[error("invalid state transition for request {request_id}: {message}")]
    InvalidStateTransition {
        /// The request the transition was attempted on.
        request_id: RequestId,
        /// Why the transition is invalid.
        message: String,
    },

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An error from cartage-core (id parsing, directory lookups).
    #[error("core error: {0}")]
    Core(#[from] cartage_core::Error),
}

impl Error {
    /// Creates a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new not-found error.
    #[must_use]
    pub fn not_found(resource: &'static str, key: impl std::fmt::Display) -> Self {
        Self::NotFound {
            resource,
            key: key.to_string(),
        }
    }

    /// Creates a new conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new integrity error.
    #[must_use]
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new dispatch-unavailable error.
    #[must_use]
    pub fn dispatch_unavailable(message: impl Into<String>) -> Self {
        Self::DispatchUnavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a dispatch-unavailable error with a source cause.
    #[must_use]
    pub fn dispatch_unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::DispatchUnavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true if this error is a fleet transport failure.
    #[must_use]
    pub const fn is_dispatch_unavailable(&self) -> bool {
        matches!(self, Self::DispatchUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn not_found_display() {
        let err = Error::not_found("request", "01J0000000000000000000000");
        assert!(err.to_string().contains("request"));
        assert!(err.to_string().contains("01J"));
    }

    #[test]
    fn dispatch_unavailable_with_source_chains() {
        let source = std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timeout");
        let err = Error::dispatch_unavailable_with_source("fleet unreachable", source);
        assert!(err.is_dispatch_unavailable());
        assert!(StdError::source(&err).is_some());
    }

    #[test]
    fn core_error_converts() {
        let core = cartage_core::Error::spot_not_found("DY-09");
        let err: Error = core.into();
        assert!(err.to_string().contains("DY-09"));
    }
}
