//! # Territory Matcher (`matcher`)
//!
//! ## Purpose
//!
//! `matcher` links registry families to rows of the municipal gazetteer and
//! derives, for every family, the best available territory attributes
//! (postal code, address, neighborhood, assistance zones, coordinates). The
//! registry's own address fields are never modified; matches only borrow
//! data from the gazetteer.
//!
//! ## The cascade
//!
//! Tiers run in priority order and each only sees families that no earlier
//! tier matched:
//!
//! 1. [`MatchTier::Exact`]: normalized postal code and normalized street equal.
//! 2. [`MatchTier::AddressOnly`]: normalized street equal, postal code ignored.
//!    Corrects families whose registered code is wrong or generic.
//! 3. [`MatchTier::Fuzzy`] (optional): trigram similarity of the normalized
//!    street at or above [`MatchConfig::fuzzy_threshold`].
//!
//! The combined view ([`FamilyTerritory`]) holds one row per family: the
//! first tier that matched it, or an unmatched row.
//!
//! When several gazetteer rows qualify for one family within a tier, the row
//! with the lowest raw postal code wins, then the lowest id. Rows without a
//! raw postal code come last.
//!
//! ## Core Types
//!
//! - [`GazetteerIndex`]: lookup structures over the gazetteer.
//! - [`TierStrategy`]: one strategy per tier; [`CascadeBuilder`] orders them.
//! - [`TierMatch`] / [`FamilyTerritory`]: artifact rows.
//!
//! ## Example Usage
//!
//! ```
//! use canonical::AddressNormalizer;
//! use matcher::{CascadeBuilder, GazetteerIndex, MatchConfig, MatchTier};
//! use store::{CleanFamily, FamilyAddressRecord, GazetteerEntry, NewGazetteerEntry};
//!
//! let normalizer = AddressNormalizer::default();
//! let family = CleanFamily::from_record(
//!     &FamilyAddressRecord {
//!         ibge_code: Some("123".into()),
//!         family_code: Some("0007".into()),
//!         street_type: Some("R.".into()),
//!         street_name: Some("DAS FLORES".into()),
//!         cep: Some("01001000".into()),
//!         ..Default::default()
//!     },
//!     &normalizer,
//! )
//! .unwrap();
//! let row = GazetteerEntry::from_new(
//!     1,
//!     NewGazetteerEntry {
//!         address: "RUA DAS FLORES".into(),
//!         cep: Some("01001-000".into()),
//!         ..Default::default()
//!     },
//! );
//!
//! let index = GazetteerIndex::from_entries(vec![row], &normalizer);
//! let out = CascadeBuilder::new(&MatchConfig::default())
//!     .unwrap()
//!     .run(&[family], &index);
//! assert_eq!(out.combined[0].tier, Some(MatchTier::Exact));
//! ```

pub mod engine;
mod index;
mod strategy;
pub mod trigram;
pub mod types;

pub use crate::engine::{CascadeBuilder, CascadeOutput};
pub use crate::index::GazetteerIndex;
pub use crate::strategy::{
    AddressOnlyStrategy, Candidate, ExactStrategy, FuzzyStrategy, TierStrategy,
};
pub use crate::types::{
    Confidence, FamilyTerritory, MatchConfig, MatchError, MatchTier, TerritoryAttributes, TierMatch,
};
