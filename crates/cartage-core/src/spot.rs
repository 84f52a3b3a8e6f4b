//! Spot vocabulary: named physical locations and the two shared buffers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A human-readable name of a physical location serviced by the AMR fleet.
///
/// Spot names are the operator-facing vocabulary; the dispatcher never
/// sees them (it is addressed through [`NetworkAddress`]).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpotName(String);

impl SpotName {
    /// Creates a spot name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the name carries the given family prefix.
    ///
    /// Matching is case-insensitive, following the operator data observed
    /// in the field.
    #[must_use]
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    }
}

impl fmt::Display for SpotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SpotName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The dispatcher-facing address of a spot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkAddress(String);

impl NetworkAddress {
    /// Creates a network address.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one of the two shared buffer destinations.
///
/// Exactly two buffer slots exist; they are scarce physical locations and
/// the only contended resource in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotId {
    /// The first shared buffer.
    BufferA,
    /// The second shared buffer.
    BufferB,
}

impl SlotId {
    /// Both slot identities, in fixed order.
    pub const ALL: [Self; 2] = [Self::BufferA, Self::BufferB];

    /// Returns the other slot.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::BufferA => Self::BufferB,
            Self::BufferB => Self::BufferA,
        }
    }

    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::BufferA => "buffer_a",
            Self::BufferB => "buffer_b",
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_prefix_is_case_insensitive() {
        let spot = SpotName::new("mb-03");
        assert!(spot.has_prefix("MB-"));
        assert!(!spot.has_prefix("DY-"));
    }

    #[test]
    fn spot_prefix_shorter_than_prefix() {
        let spot = SpotName::new("M");
        assert!(!spot.has_prefix("MB-"));
    }

    #[test]
    fn slot_other_is_involutive() {
        for slot in SlotId::ALL {
            assert_eq!(slot.other().other(), slot);
        }
        assert_ne!(SlotId::BufferA, SlotId::BufferB);
    }
}
