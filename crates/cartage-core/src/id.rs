//! Strongly-typed identifiers for cartage entities.
//!
//! All identifiers are:
//! - **Strongly typed**: a [`RequestId`] can never be passed where an
//!   [`OrderId`] is expected
//! - **Lexicographically sortable**: request ids are ULIDs, order ids are
//!   millisecond-epoch strings; both sort by creation time
//! - **Globally unique**: no coordination required for generation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::{Error, Result};

/// A unique identifier for a preparation request.
///
/// Requests are seeded once at configuration time and keep their id for
/// their whole lifetime; only the mutable status fields cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Ulid);

impl RequestId {
    /// Generates a new unique request id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Creates a request id from a raw ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Returns the creation timestamp encoded in the id.
    #[must_use]
    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        let ms = self.0.timestamp_ms();
        chrono::DateTime::from_timestamp_millis(ms as i64).unwrap_or_else(chrono::Utc::now)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| Error::InvalidId {
                message: format!("invalid request id '{s}': {e}"),
            })
    }
}

/// The identifier of a move order issued to the fleet dispatcher.
///
/// The dispatcher's wire contract wants a 13-digit decimal string; orders
/// are identified by their submission time in milliseconds since the
/// epoch, which stays 13 digits until the year 2286.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Generates an order id from the current wall clock.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_timestamp(chrono::Utc::now())
    }

    /// Creates an order id from an explicit timestamp.
    #[must_use]
    pub fn from_timestamp(at: chrono::DateTime<chrono::Utc>) -> Self {
        let mut digits = at.timestamp_millis().to_string();
        digits.truncate(13);
        Self(digits)
    }

    /// Wraps an identifier received from the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is empty or contains non-digits.
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidId {
                message: format!("invalid order id '{value}': expected decimal digits"),
            });
        }
        Ok(Self(value))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn request_id_round_trips_through_string() {
        let id = RequestId::generate();
        let parsed: RequestId = id.to_string().parse().expect("valid ulid");
        assert_eq!(id, parsed);
    }

    #[test]
    fn request_id_rejects_garbage() {
        let result: Result<RequestId> = "not-a-ulid!".parse();
        assert!(result.is_err());
    }

    #[test]
    fn order_id_is_thirteen_digits() {
        let id = OrderId::generate();
        assert_eq!(id.as_str().len(), 13);
        assert!(id.as_str().bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn order_id_parse_rejects_non_digits() {
        assert!(OrderId::parse("17000000000ab").is_err());
        assert!(OrderId::parse("").is_err());
        assert!(OrderId::parse("1700000000000").is_ok());
    }

    #[test]
    fn order_id_serde_transparent() {
        let id = OrderId::parse("1700000000000").expect("valid");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"1700000000000\"");
    }
}
