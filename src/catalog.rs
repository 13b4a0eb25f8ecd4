//! Type catalog — the closed set of namespaces and their canonical tokens.

use std::fmt;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::MappingError;

/// A closed set of namespaces, each with a canonical token and a one-byte code.
///
/// Implemented by [`mapping_catalog!`](crate::mapping_catalog); writing it by hand is
/// possible but the macro also checks tokens and codes for collisions at
/// compile time.
pub trait Catalog:
    Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Every namespace, in declaration order.
    const ALL: &'static [Self];

    /// Canonical token (e.g. `"team"`).
    fn token(self) -> &'static str;

    /// Token → namespace. ASCII case-insensitive; use [`resolve_type`] to
    /// accept canonical spellings only.
    fn from_token(token: &str) -> Option<Self>;

    /// One-byte code used by on-disk formats.
    fn code(self) -> u8;

    /// Inverse of [`code`](Catalog::code); `None` for codes no namespace uses.
    ///
    /// ```
    /// use bet_mapping::{Catalog, MappingType};
    ///
    /// assert_eq!(MappingType::from_code(MappingType::Team.code()), Some(MappingType::Team));
    /// assert_eq!(MappingType::from_code(0xff), None);
    /// ```
    fn from_code(code: u8) -> Option<Self>;
}

/// Resolve a namespace token, accepting it only if it round-trips.
///
/// `token(from_token(t)) == t` must hold; anything else, including tokens
/// naming no namespace at all, is [`MappingError::InvalidMappingType`].
///
/// ```
/// use bet_mapping::{resolve_type, MappingType};
///
/// assert_eq!(resolve_type::<MappingType>("team").unwrap(), MappingType::Team);
/// assert!(resolve_type::<MappingType>("Team").is_err());
/// assert!(resolve_type::<MappingType>("not-a-real-type").is_err());
/// ```
pub fn resolve_type<C: Catalog>(token: &str) -> Result<C, MappingError> {
    match C::from_token(token) {
        Some(ty) if ty.token() == token => Ok(ty),
        _ => Err(MappingError::InvalidMappingType(token.to_owned())),
    }
}

bet_mapping_macro::mapping_catalog! {
    /// Namespaces of the betting ledger.
    ///
    /// Codes follow the ledger's historic numbering and must never change.
    pub enum MappingType {
        #[token = "sport"]
        Sport = 0x01,
        #[token = "round"]
        Round = 0x02,
        #[token = "team"]
        Team = 0x03,
        #[token = "tournament"]
        Tournament = 0x04,
        #[token = "individual-sport"]
        IndividualSport = 0x05,
        #[token = "contender"]
        Contender = 0x06,
    }
}
