//! # cartage-core
//!
//! Shared vocabulary for the cartage carrier-coordination system.
//!
//! This crate holds the types every other component agrees on:
//!
//! - **Typed identifiers**: [`RequestId`] and [`OrderId`] newtypes that
//!   cannot be mixed up at compile time
//! - **Spot vocabulary**: [`SpotName`], [`NetworkAddress`], and the two
//!   fixed [`SlotId`] buffer identities
//! - **Location directory**: the [`directory::SpotDirectory`] lookup from
//!   spot names to dispatcher-facing addresses
//! - **Observability**: logging bootstrap shared by services and tests

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]

pub mod directory;
pub mod error;
pub mod id;
pub mod observability;
pub mod spot;

pub use directory::{InMemoryDirectory, SpotDirectory};
pub use error::{Error, Result};
pub use id::{OrderId, RequestId};
pub use spot::{NetworkAddress, SlotId, SpotName};
