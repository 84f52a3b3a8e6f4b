//! Configuration-time seeding of the ledger and directory.
//!
//! Request rows and the spot directory are reference data: they are
//! created once from a seed document and only their mutable fields cycle
//! afterwards.

use serde::{Deserialize, Serialize};

use cartage_core::{InMemoryDirectory, SpotName};

use crate::error::{Error, Result};
use crate::request::{PreparationRequest, RequestClass};
use crate::store::Store;

/// One directory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotEntry {
    /// Human-readable spot name.
    pub name: String,
    /// Dispatcher-facing address.
    pub address: String,
}

/// One request row to seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSeed {
    /// The fixed endpoint of the leg.
    pub fixed_endpoint: String,
    /// Candidate spots for the other end (1–3 entries).
    pub candidates: Vec<String>,
    /// Optional classification tag.
    #[serde(default)]
    pub auxiliary_tag: Option<String>,
}

/// A complete seed document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seed {
    /// Spot directory entries.
    #[serde(default)]
    pub spots: Vec<SpotEntry>,
    /// Part request rows.
    #[serde(default)]
    pub part_requests: Vec<RequestSeed>,
    /// Pack request rows.
    #[serde(default)]
    pub pack_requests: Vec<RequestSeed>,
    /// Auxiliary tag catalog.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Seed {
    /// Parses a seed document from JSON.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::validation(format!("invalid seed document: {e}")))
    }

    /// Builds the spot directory from the seed.
    #[must_use]
    pub fn directory(&self) -> InMemoryDirectory {
        InMemoryDirectory::from_entries(
            self.spots
                .iter()
                .map(|entry| (entry.name.clone(), entry.address.clone())),
        )
    }

    /// Inserts every seeded request into the store, settled at its
    /// resting pair. Returns the number of rows inserted.
    ///
    /// # Errors
    ///
    /// Propagates validation and storage errors; seeding is not atomic
    /// across rows and is meant to run once against an empty store.
    pub async fn populate(&self, store: &dyn Store, feeder_prefix: &str) -> Result<usize> {
        let mut inserted = 0;
        for (class, seeds) in [
            (RequestClass::Part, &self.part_requests),
            (RequestClass::Pack, &self.pack_requests),
        ] {
            for seed in seeds {
                let mut request = PreparationRequest::new(
                    class,
                    SpotName::new(&seed.fixed_endpoint),
                    seed.candidates.iter().map(SpotName::new).collect(),
                )?;
                if let Some(tag) = &seed.auxiliary_tag {
                    request = request.with_auxiliary_tag(tag);
                }
                request.restore_idle(feeder_prefix);
                store.insert_request(request).await?;
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::PrepStatus;
    use crate::store::memory::InMemoryStore;
    use cartage_core::SpotDirectory;

    const SEED: &str = r#"{
        "spots": [
            {"name": "MB-01", "address": "amr-0101"},
            {"name": "MB-FG-01", "address": "amr-0901"}
        ],
        "partRequests": [
            {"fixedEndpoint": "MB-01", "candidates": ["MB-FG-01"], "auxiliaryTag": "MOTOR-A"}
        ],
        "packRequests": [
            {"fixedEndpoint": "PK-01", "candidates": ["DY-01", "DY-02"]}
        ],
        "tags": ["MOTOR-A"]
    }"#;

    #[tokio::test]
    async fn seed_round_trip() -> Result<()> {
        let seed = Seed::from_json(SEED)?;
        let directory = seed.directory();
        assert!(directory.contains(&SpotName::new("MB-01")));

        let store = InMemoryStore::new([SpotName::new("MB-FG-01"), SpotName::new("MB-FG-02")]);
        let inserted = seed.populate(&store, "MB-").await?;
        assert_eq!(inserted, 2);

        let parts = store.list_requests(RequestClass::Part).await?;
        assert_eq!(parts.len(), 1);
        // Feeder lanes settle at their In-Use resting status.
        assert_eq!(parts[0].status_near, PrepStatus::InUse);
        assert_eq!(parts[0].auxiliary_tag.as_deref(), Some("MOTOR-A"));

        let packs = store.list_requests(RequestClass::Pack).await?;
        assert_eq!(packs[0].status_near, PrepStatus::Prepare);
        Ok(())
    }

    #[test]
    fn malformed_seed_is_validation_error() {
        assert!(matches!(
            Seed::from_json("{not json"),
            Err(Error::Validation { .. })
        ));
    }
}
