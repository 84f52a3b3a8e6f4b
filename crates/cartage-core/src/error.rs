//! Error types and result aliases shared across cartage components.

/// The result type used throughout cartage-core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the identifier invalid.
        message: String,
    },

    /// A named spot is not present in the location directory.
    #[error("unknown spot: {spot}")]
    SpotNotFound {
        /// The spot name that was looked up.
        spot: String,
    },

    /// Invalid configuration was supplied at startup.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl Error {
    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new unknown-spot error.
    #[must_use]
    pub fn spot_not_found(spot: impl Into<String>) -> Self {
        Self::SpotNotFound { spot: spot.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_not_found_display() {
        let err = Error::spot_not_found("DY-04");
        assert!(err.to_string().contains("DY-04"));
    }

    #[test]
    fn configuration_display() {
        let err = Error::configuration("missing CARTAGE_FLEET_URL");
        assert!(err.to_string().contains("CARTAGE_FLEET_URL"));
    }
}
