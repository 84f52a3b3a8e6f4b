//! Location directory: spot name to dispatcher address mapping.
//!
//! The directory is read-only reference data seeded at startup. Every
//! move order resolves both of its endpoints here before anything is sent
//! to the fleet service; an unknown spot fails the operation before any
//! state is mutated.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::spot::{NetworkAddress, SpotName};

/// Read-only lookup from spot names to dispatcher-facing addresses.
pub trait SpotDirectory: Send + Sync {
    /// Resolves a spot name to its network address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SpotNotFound`] if the spot is unknown.
    fn resolve(&self, spot: &SpotName) -> Result<NetworkAddress>;

    /// Returns true if the spot is known to the directory.
    fn contains(&self, spot: &SpotName) -> bool {
        self.resolve(spot).is_ok()
    }
}

/// In-memory spot directory seeded from configuration.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDirectory {
    entries: HashMap<SpotName, NetworkAddress>,
}

impl InMemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the directory from (spot, address) pairs.
    #[must_use]
    pub fn from_entries<I, S, A>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, A)>,
        S: Into<String>,
        A: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(s, a)| (SpotName::new(s), NetworkAddress::new(a)))
                .collect(),
        }
    }

    /// Adds or replaces one entry.
    pub fn insert(&mut self, spot: SpotName, address: NetworkAddress) {
        self.entries.insert(spot, address);
    }

    /// Returns the number of known spots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the directory has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SpotDirectory for InMemoryDirectory {
    fn resolve(&self, spot: &SpotName) -> Result<NetworkAddress> {
        self.entries
            .get(spot)
            .cloned()
            .ok_or_else(|| Error::spot_not_found(spot.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_seeded_spots() {
        let directory = InMemoryDirectory::from_entries([("MB-01", "amr-0113"), ("DY-02", "amr-0207")]);

        let addr = directory.resolve(&SpotName::new("MB-01")).expect("known spot");
        assert_eq!(addr.as_str(), "amr-0113");
        assert!(directory.contains(&SpotName::new("DY-02")));
    }

    #[test]
    fn unknown_spot_fails() {
        let directory = InMemoryDirectory::new();
        let result = directory.resolve(&SpotName::new("NOPE"));
        assert!(matches!(result, Err(Error::SpotNotFound { .. })));
    }
}
