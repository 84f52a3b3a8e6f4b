//! Shared buffer slot records.
//!
//! Exactly two slots exist, identified by [`SlotId`]. A slot's occupancy
//! is a paired binding: the origin spot of the carrier currently parked in
//! it and the id of the request that put it there. The pairing invariant
//! (`occupant_origin` set iff `bound_request` set) is what lets the manual
//! override find the exact occupant instead of guessing from spot names.

use serde::{Deserialize, Serialize};

use cartage_core::{RequestId, SlotId, SpotName};

/// One of the two shared buffer destinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedSlot {
    /// Fixed identity of the slot.
    pub id: SlotId,
    /// The physical spot this slot occupies.
    pub spot: SpotName,
    /// Origin spot of the current occupant, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupant_origin: Option<SpotName>,
    /// The request currently bound to the slot, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_request: Option<RequestId>,
}

impl SharedSlot {
    /// Creates a free slot.
    #[must_use]
    pub const fn new(id: SlotId, spot: SpotName) -> Self {
        Self {
            id,
            spot,
            occupant_origin: None,
            bound_request: None,
        }
    }

    /// Returns true if the slot has no occupant.
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.occupant_origin.is_none() && self.bound_request.is_none()
    }

    /// Returns true if the slot is held by the given request.
    #[must_use]
    pub fn held_by(&self, request: &RequestId) -> bool {
        self.bound_request.as_ref() == Some(request)
    }

    /// Binds the slot to a request.
    pub fn bind(&mut self, request: RequestId, origin: SpotName) {
        self.occupant_origin = Some(origin);
        self.bound_request = Some(request);
    }

    /// Clears the occupancy, freeing the slot.
    pub fn clear(&mut self) {
        self.occupant_origin = None;
        self.bound_request = None;
    }

    /// Checks the paired-occupancy invariant.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.occupant_origin.is_some() == self.bound_request.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_and_clear_keep_the_pairing_invariant() {
        let mut slot = SharedSlot::new(SlotId::BufferA, SpotName::new("MB-FG-01"));
        assert!(slot.is_free());
        assert!(slot.is_consistent());

        let request = RequestId::generate();
        slot.bind(request, SpotName::new("MB-03"));
        assert!(!slot.is_free());
        assert!(slot.held_by(&request));
        assert!(slot.is_consistent());

        slot.clear();
        assert!(slot.is_free());
        assert!(slot.is_consistent());
    }

    #[test]
    fn held_by_is_request_specific() {
        let mut slot = SharedSlot::new(SlotId::BufferB, SpotName::new("MB-FG-02"));
        slot.bind(RequestId::generate(), SpotName::new("MB-01"));
        assert!(!slot.held_by(&RequestId::generate()));
    }
}
