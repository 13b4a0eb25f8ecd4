//! # Namespaced Mapping Registry (bet-mapping)
//!
//! Assigns compact, deterministic `u32` ids to human-readable names inside a
//! closed set of namespaces ("mapping types"), and resolves in both directions.
//!
//! Every participant validating the same ledger must derive the same id for
//! the same name from the same persisted state, so allocation follows one
//! rule only:
//!
//! ```text
//! index ids:   0  1  3  4
//! candidate:   0→1→2  ✗ (3 ≠ 2)      free slot = 2
//!
//! index ids:   0  1  2
//! candidate:   0→1→2→3               free slot = 3 (= index size)
//! ```
//!
//! The smallest non-negative id not present in the type's index is the next
//! one handed out.
//!
//! ## Usage
//!
//! ```
//! use bet_mapping::{MappingRegistry, MappingType, MemoryStore};
//!
//! let store = MemoryStore::new();
//! store.provision(MappingType::Sport).unwrap();
//!
//! let registry: MappingRegistry<_> = MappingRegistry::new(store);
//! let football = registry.get_or_create_mapping("sport", "Football").unwrap();
//! assert_eq!((football.id, football.created), (0, true));
//!
//! let again = registry.get_or_create_mapping("sport", "Football").unwrap();
//! assert_eq!((again.id, again.created), (0, false));
//!
//! let name = registry.resolve_mapping_name("sport", 0).unwrap();
//! assert_eq!(name.name, "Football");
//! ```
//!
//! Storage sits behind [`MappingStore`]. [`MemoryStore`] lives here; the
//! durable append-only implementation is in the `bet-mapping-store` crate.

extern crate self as bet_mapping;

pub mod catalog;
pub mod error;
pub mod hash;
pub mod index;
pub mod registry;
pub mod store;

pub use bet_mapping_macro::mapping_catalog;
pub use catalog::{resolve_type, Catalog, MappingType};
pub use error::{MappingError, StoreError};
pub use hash::{fnv1a_64, Fnv1a};
pub use index::{IndexScan, MappingIndex, MappingRecord};
pub use registry::{MappingId, MappingName, MappingRegistry};
pub use store::{MappingStore, MemoryStore};

#[doc(hidden)]
pub mod __private {
    pub use serde;
}
