//! Territory canonical layer.
//!
//! Turns the free-text address columns of the family registry and the
//! municipal gazetteer into comparable keys, and normalizes the structured
//! columns (postal code, administrative and family codes, update dates) that
//! the matcher joins on.
//!
//! ## Pure function guarantee
//!
//! No I/O, no clock calls, no locale dependence. Same text and config, same
//! key, on any machine. `normalize(normalize(x)) == normalize(x)`.
//!
//! ## Absence, not emptiness
//!
//! Every normalizer maps blank input to `None`. Two unknown addresses must
//! never compare equal by accident.
//!
//! ```rust
//! use canonical::{normalize_address, Cep};
//!
//! let key = normalize_address("R. das Flores").unwrap();
//! assert_eq!(key.as_str(), "RUA DAS FLORES");
//! assert_eq!(normalize_address("   "), None);
//! assert_eq!(Cep::parse("01001-000").unwrap().as_str(), "01001000");
//! ```

mod config;
mod error;
mod fields;
mod pipeline;
mod whitespace;

pub use crate::config::{default_abbreviations, Abbreviation, NormalizeConfig};
pub use crate::error::CanonicalError;
pub use crate::fields::{
    compose_street, normalize_code, normalize_text, parse_registry_date, Cep, CEP_DIGITS,
};
pub use crate::pipeline::{normalize_address, AddressKey, AddressNormalizer};
pub use crate::whitespace::collapse_whitespace;
