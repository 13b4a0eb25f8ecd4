//! Mapping records and the per-type index they live in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::catalog::{Catalog, MappingType};
use crate::error::StoreError;
use crate::hash::Fnv1a;

/// One persisted `(type, id) → name` association.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "C: Catalog")]
pub struct MappingRecord<C = MappingType> {
    pub id: u32,
    #[serde(rename = "type")]
    pub ty: C,
    pub name: String,
    /// Format metadata; not interpreted by the registry.
    pub version: u32,
}

impl<C: Catalog> MappingRecord<C> {
    /// Version stamped on every record created by this crate.
    pub const CURRENT_VERSION: u32 = 1;

    /// Longest name, in bytes, a store accepts.
    pub const MAX_NAME_LEN: usize = 64 * 1024;

    /// A record stamped with [`CURRENT_VERSION`](Self::CURRENT_VERSION).
    pub fn new(id: u32, ty: C, name: impl Into<String>) -> Self {
        Self {
            id,
            ty,
            name: name.into(),
            version: Self::CURRENT_VERSION,
        }
    }
}

/// Outcome of one ascending pass over an index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexScan {
    /// Id of the first record (lowest id) whose name matched.
    pub matched: Option<u32>,
    // u64 so that an index holding every u32 id can report "one past the end".
    free_slot: u64,
}

impl IndexScan {
    /// Smallest id not present in the index, or `None` if all `u32` ids are taken.
    pub fn free_slot(&self) -> Option<u32> {
        u32::try_from(self.free_slot).ok()
    }
}

/// All records of one mapping type, keyed and ordered by id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappingIndex<C = MappingType> {
    ty: C,
    records: BTreeMap<u32, MappingRecord<C>>,
}

impl<C: Catalog> MappingIndex<C> {
    /// An empty index for `ty`.
    pub fn new(ty: C) -> Self {
        Self {
            ty,
            records: BTreeMap::new(),
        }
    }

    /// Build an index from records, rejecting foreign types and repeated ids.
    pub fn from_records(
        ty: C,
        records: impl IntoIterator<Item = MappingRecord<C>>,
    ) -> Result<Self, StoreError> {
        let mut index = Self::new(ty);
        for record in records {
            index.insert(record)?;
        }
        Ok(index)
    }

    #[inline]
    pub fn ty(&self) -> C {
        self.ty
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn get(&self, id: u32) -> Option<&MappingRecord<C>> {
        self.records.get(&id)
    }

    #[inline]
    pub fn contains_id(&self, id: u32) -> bool {
        self.records.contains_key(&id)
    }

    /// Records in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &MappingRecord<C>> {
        self.records.values()
    }

    /// Add a record. Existing records are never replaced.
    pub fn insert(&mut self, record: MappingRecord<C>) -> Result<(), StoreError> {
        if record.ty != self.ty {
            return Err(StoreError::TypeMismatch {
                expected: self.ty.token(),
                found: record.ty.token(),
            });
        }
        if self.records.contains_key(&record.id) {
            return Err(StoreError::DuplicateId {
                token: self.ty.token(),
                id: record.id,
            });
        }
        self.records.insert(record.id, record);
        Ok(())
    }

    /// Single ascending pass: find `name` and the first free id.
    ///
    /// The free slot is the smallest non-negative integer not used as an id.
    /// Starting from a candidate of 0, every id equal to the candidate bumps
    /// it by one; the first id that differs fixes it. Without a gap the free
    /// slot equals the index size.
    pub fn scan(&self, name: &str) -> IndexScan {
        let token = self.ty.token();
        let mut matched = None;
        let mut candidate: u64 = 0;
        let mut gap_found = false;

        for (&id, record) in &self.records {
            trace!(type_token = token, id, version = record.version, name = %record.name, "scan");

            if record.name == name {
                match matched {
                    None => matched = Some(id),
                    Some(first) => warn!(
                        type_token = token,
                        first,
                        duplicate = id,
                        name,
                        "duplicate mapping name in index; keeping lowest id"
                    ),
                }
            }

            if !gap_found {
                if u64::from(id) == candidate {
                    candidate += 1;
                } else {
                    gap_found = true;
                }
            }
        }

        IndexScan {
            matched,
            free_slot: candidate,
        }
    }

    /// Deterministic digest of the index contents.
    ///
    /// Hashes, in ascending id order, each id, the name length and the name
    /// bytes (integers little-endian). Equal indexes give equal fingerprints
    /// on every platform.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Fnv1a::new();
        for record in self.records.values() {
            hasher.write_u32(record.id);
            // Names longer than u32::MAX bytes cannot be stored.
            hasher.write_u32(record.name.len() as u32);
            hasher.write(record.name.as_bytes());
        }
        hasher.finish()
    }
}

impl<'a, C> IntoIterator for &'a MappingIndex<C> {
    type Item = &'a MappingRecord<C>;
    type IntoIter = std::collections::btree_map::Values<'a, u32, MappingRecord<C>>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(ids: &[u32]) -> MappingIndex {
        MappingIndex::from_records(
            MappingType::Team,
            ids.iter().map(|&id| MappingRecord::new(id, MappingType::Team, format!("team-{id}"))),
        )
        .unwrap()
    }

    #[test]
    fn empty_index_free_slot_is_zero() {
        let index = MappingIndex::new(MappingType::Sport);
        let scan = index.scan("Football");
        assert_eq!(scan.matched, None);
        assert_eq!(scan.free_slot(), Some(0));
    }

    #[test]
    fn contiguous_ids_free_slot_is_len() {
        let index = index_with(&[0, 1, 2]);
        assert_eq!(index.scan("nobody").free_slot(), Some(3));
    }

    #[test]
    fn first_gap_wins() {
        assert_eq!(index_with(&[0, 1, 3]).scan("x").free_slot(), Some(2));
        assert_eq!(index_with(&[0, 1, 3, 4, 6]).scan("x").free_slot(), Some(2));
        assert_eq!(index_with(&[1, 2]).scan("x").free_slot(), Some(0));
        assert_eq!(index_with(&[5]).scan("x").free_slot(), Some(0));
    }

    #[test]
    fn name_match_is_independent_of_free_slot() {
        let index = index_with(&[0, 2, 3]);
        let scan = index.scan("team-3");
        assert_eq!(scan.matched, Some(3));
        assert_eq!(scan.free_slot(), Some(1));
    }

    #[test]
    fn duplicate_names_resolve_to_lowest_id() {
        let index = MappingIndex::from_records(
            MappingType::Team,
            [
                MappingRecord::new(4, MappingType::Team, "Ajax"),
                MappingRecord::new(1, MappingType::Team, "Ajax"),
                MappingRecord::new(0, MappingType::Team, "PSV"),
            ],
        )
        .unwrap();
        assert_eq!(index.scan("Ajax").matched, Some(1));
    }

    #[test]
    fn name_match_is_exact() {
        let index = index_with(&[0]);
        assert_eq!(index.scan("TEAM-0").matched, None);
        assert_eq!(index.scan("team-0 ").matched, None);
    }

    #[test]
    fn full_id_space_has_no_free_slot() {
        let scan = IndexScan {
            matched: None,
            free_slot: u64::from(u32::MAX) + 1,
        };
        assert_eq!(scan.free_slot(), None);

        let top = index_with(&[0, 1]);
        assert_eq!(top.scan("x").free_slot(), Some(2));
    }

    #[test]
    fn insert_rejects_duplicate_id_and_foreign_type() {
        let mut index = index_with(&[0]);
        let dup = index.insert(MappingRecord::new(0, MappingType::Team, "other"));
        assert!(matches!(dup, Err(StoreError::DuplicateId { id: 0, .. })));

        let foreign = index.insert(MappingRecord::new(1, MappingType::Sport, "Tennis"));
        assert!(matches!(foreign, Err(StoreError::TypeMismatch { .. })));

        assert_eq!(index.len(), 1);
        assert_eq!(index.get(0).unwrap().name, "team-0");
    }

    #[test]
    fn iteration_is_ascending() {
        let index = index_with(&[7, 0, 3]);
        let ids: Vec<u32> = index.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 3, 7]);
    }

    #[test]
    fn fingerprint_ignores_insertion_order() {
        let a = index_with(&[0, 1, 2]);
        let b = index_with(&[2, 0, 1]);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_tracks_contents() {
        let a = index_with(&[0, 1]);
        let b = index_with(&[0, 2]);
        assert_ne!(a.fingerprint(), b.fingerprint());

        let mut renamed = MappingIndex::new(MappingType::Team);
        renamed.insert(MappingRecord::new(0, MappingType::Team, "team-0")).unwrap();
        renamed.insert(MappingRecord::new(1, MappingType::Team, "team-X")).unwrap();
        assert_ne!(a.fingerprint(), renamed.fingerprint());
    }

    #[test]
    fn new_record_uses_current_version() {
        let record = MappingRecord::new(9, MappingType::Round, "Final");
        assert_eq!(record.version, 1);
        assert_eq!(record.version, MappingRecord::<MappingType>::CURRENT_VERSION);
    }
}
