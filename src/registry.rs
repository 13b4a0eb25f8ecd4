//! Mapping registry — get-or-create and id → name resolution over a store.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::{resolve_type, Catalog, MappingType};
use crate::error::MappingError;
use crate::index::{MappingIndex, MappingRecord};
use crate::store::MappingStore;

/// Result of [`MappingRegistry::get_or_create_mapping`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingId {
    pub id: u32,
    /// True if this call allocated and persisted the mapping.
    pub created: bool,
    pub type_token: &'static str,
}

impl MappingId {
    /// The mapping existed before this call.
    #[inline]
    pub fn exists(&self) -> bool {
        !self.created
    }
}

/// Result of [`MappingRegistry::resolve_mapping_name`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingName {
    pub name: String,
    pub type_token: &'static str,
}

/// Registry of name ↔ id mappings, one index per catalog type.
///
/// Provides:
/// - Get-or-create with deterministic first-free-slot allocation
/// - Id → name resolution
/// - Read-only lookups, snapshots and fingerprints for cross-participant checks
///
/// Creation is serialized per type. Each type owns a lock; lookups hold it
/// shared, and a call that must allocate takes it exclusively, reloads the
/// index and scans again before writing, so two creators can never compute
/// the same free slot from the same stale load.
pub struct MappingRegistry<S, C = MappingType> {
    store: S,
    locks: HashMap<C, RwLock<()>>,
}

impl<S, C: Catalog> MappingRegistry<S, C>
where
    S: MappingStore<C>,
{
    /// Registry over `store`, with one lock per namespace of `C`.
    pub fn new(store: S) -> Self {
        let locks = C::ALL.iter().map(|&ty| (ty, RwLock::new(()))).collect();
        Self { store, locks }
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Give the store back, dropping the locks.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Load the index of `ty`. A missing index means the type was never
    /// provisioned, which is fatal for the call.
    pub fn load_index(&self, ty: C) -> Result<MappingIndex<C>, MappingError> {
        let index = self
            .store
            .load_index(ty)?
            .ok_or(MappingError::IndexUnavailable { token: ty.token() })?;
        debug!(type_token = ty.token(), records = index.len(), "loaded mapping index");
        Ok(index)
    }

    /// Look up `name` in the namespace `type_token`, creating it at the
    /// smallest free id if absent.
    ///
    /// `name` must be non-empty; callers validate it before this point.
    ///
    /// # Errors
    ///
    /// - [`MappingError::InvalidMappingType`] if the token does not round-trip
    /// - [`MappingError::IndexUnavailable`] if the type was never provisioned
    /// - [`MappingError::IndexExhausted`] if every `u32` id is taken
    /// - [`MappingError::Store`] if loading or saving fails; nothing is committed
    pub fn get_or_create_mapping(
        &self,
        type_token: &str,
        name: &str,
    ) -> Result<MappingId, MappingError> {
        let ty = resolve_type::<C>(type_token)?;
        let lock = self.lock_for(ty)?;

        {
            let _shared = lock.read();
            let index = self.load_index(ty)?;
            if let Some(id) = index.scan(name).matched {
                return Ok(Self::existing(ty, id));
            }
        }

        let _exclusive = lock.write();
        let index = self.load_index(ty)?;
        let scan = index.scan(name);
        if let Some(id) = scan.matched {
            // Another caller created it between the two locks.
            return Ok(Self::existing(ty, id));
        }

        let id = scan
            .free_slot()
            .ok_or(MappingError::IndexExhausted { token: ty.token() })?;
        let record = MappingRecord::new(id, ty, name);
        self.store.save_record(&record)?;

        info!(type_token = ty.token(), id, name, "created mapping");
        Ok(MappingId {
            id,
            created: true,
            type_token: ty.token(),
        })
    }

    /// Resolve `id` in the namespace `type_token` back to its name.
    pub fn resolve_mapping_name(
        &self,
        type_token: &str,
        id: u32,
    ) -> Result<MappingName, MappingError> {
        let ty = resolve_type::<C>(type_token)?;
        let index = self.read_index(ty)?;

        let record = index.get(id).ok_or(MappingError::MappingNotFound {
            token: ty.token(),
            id,
        })?;
        Ok(MappingName {
            name: record.name.clone(),
            type_token: ty.token(),
        })
    }

    /// Id of `name` if it is already mapped. Never allocates.
    pub fn find_mapping_id(
        &self,
        type_token: &str,
        name: &str,
    ) -> Result<Option<u32>, MappingError> {
        let ty = resolve_type::<C>(type_token)?;
        let matched = self.read_index(ty)?.scan(name).matched;
        debug!(type_token = ty.token(), name, ?matched, "looked up mapping");
        Ok(matched)
    }

    /// All records of a namespace in ascending id order.
    pub fn list_mappings(&self, type_token: &str) -> Result<Vec<MappingRecord<C>>, MappingError> {
        let ty = resolve_type::<C>(type_token)?;
        Ok(self.read_index(ty)?.iter().cloned().collect())
    }

    /// Fingerprint of a namespace's index; see [`MappingIndex::fingerprint`].
    pub fn index_fingerprint(&self, type_token: &str) -> Result<u64, MappingError> {
        let ty = resolve_type::<C>(type_token)?;
        Ok(self.read_index(ty)?.fingerprint())
    }

    /// Load under the shared lock so the snapshot never interleaves with a create.
    fn read_index(&self, ty: C) -> Result<MappingIndex<C>, MappingError> {
        let _shared = self.lock_for(ty)?.read();
        self.load_index(ty)
    }

    fn lock_for(&self, ty: C) -> Result<&RwLock<()>, MappingError> {
        // Only reachable by a hand-written Catalog whose ALL omits a variant.
        self.locks
            .get(&ty)
            .ok_or_else(|| MappingError::InvalidMappingType(ty.token().to_owned()))
    }

    fn existing(ty: C, id: u32) -> MappingId {
        debug!(type_token = ty.token(), id, "mapping already exists");
        MappingId {
            id,
            created: false,
            type_token: ty.token(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryStore;

    fn registry() -> MappingRegistry<MemoryStore> {
        MappingRegistry::new(MemoryStore::with_all_provisioned())
    }

    fn seeded(ty: MappingType, ids: &[u32]) -> MappingRegistry<MemoryStore> {
        let store = MemoryStore::new();
        let index = MappingIndex::from_records(
            ty,
            ids.iter().map(|&id| MappingRecord::new(id, ty, format!("name-{id}"))),
        )
        .unwrap();
        store.insert_index(index).unwrap();
        MappingRegistry::new(store)
    }

    /// Store whose saves always fail.
    struct ReadOnlyStore(MemoryStore);

    impl MappingStore for ReadOnlyStore {
        fn load_index(&self, ty: MappingType) -> Result<Option<MappingIndex>, StoreError> {
            self.0.load_index(ty)
        }

        fn save_record(&self, _record: &MappingRecord) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        }
    }

    #[test]
    fn sport_scenario() {
        let reg = registry();

        let football = reg.get_or_create_mapping("sport", "Football").unwrap();
        assert_eq!(
            football,
            MappingId {
                id: 0,
                created: true,
                type_token: "sport"
            }
        );

        let again = reg.get_or_create_mapping("sport", "Football").unwrap();
        assert_eq!((again.id, again.created), (0, false));
        assert!(again.exists());

        let tennis = reg.get_or_create_mapping("sport", "Tennis").unwrap();
        assert_eq!((tennis.id, tennis.created), (1, true));

        let name = reg.resolve_mapping_name("sport", 1).unwrap();
        assert_eq!(name.name, "Tennis");
        assert_eq!(name.type_token, "sport");
    }

    #[test]
    fn fills_smallest_free_slot() {
        let reg = seeded(MappingType::Team, &[0, 1, 3]);
        let created = reg.get_or_create_mapping("team", "Ajax").unwrap();
        assert_eq!((created.id, created.created), (2, true));

        let next = reg.get_or_create_mapping("team", "PSV").unwrap();
        assert_eq!(next.id, 4);
    }

    #[test]
    fn existing_name_is_found_past_a_gap() {
        let reg = seeded(MappingType::Team, &[0, 2]);
        let found = reg.get_or_create_mapping("team", "name-2").unwrap();
        assert_eq!((found.id, found.created), (2, false));
        assert_eq!(reg.list_mappings("team").unwrap().len(), 2);
    }

    #[test]
    fn namespaces_are_independent() {
        let reg = registry();
        let sport = reg.get_or_create_mapping("sport", "Boxing").unwrap();
        let contender = reg.get_or_create_mapping("contender", "Boxing").unwrap();
        assert_eq!((sport.id, contender.id), (0, 0));
        assert!(sport.created && contender.created);
        assert_eq!(contender.type_token, "contender");
    }

    #[test]
    fn unknown_namespace_is_rejected() {
        let reg = registry();
        let err = reg.get_or_create_mapping("not-a-real-type", "x").unwrap_err();
        assert!(matches!(err, MappingError::InvalidMappingType(_)));

        let err = reg.resolve_mapping_name("Sport", 0).unwrap_err();
        assert!(matches!(err, MappingError::InvalidMappingType(_)));
    }

    #[test]
    fn unprovisioned_namespace_is_unavailable() {
        let store = MemoryStore::new();
        store.provision(MappingType::Sport).unwrap();
        let reg: MappingRegistry<_> = MappingRegistry::new(store);

        let err = reg.get_or_create_mapping("team", "Ajax").unwrap_err();
        assert!(matches!(err, MappingError::IndexUnavailable { token: "team" }));
        assert!(!reg.store().is_provisioned(MappingType::Team));

        let err = reg.resolve_mapping_name("team", 0).unwrap_err();
        assert!(matches!(err, MappingError::IndexUnavailable { .. }));
    }

    #[test]
    fn missing_id_is_not_found() {
        let reg = seeded(MappingType::Tournament, &[0, 1]);
        let err = reg.resolve_mapping_name("tournament", 5).unwrap_err();
        assert!(matches!(
            err,
            MappingError::MappingNotFound {
                token: "tournament",
                id: 5
            }
        ));
    }

    #[test]
    fn failed_save_commits_nothing() {
        let inner = MemoryStore::<MappingType>::with_all_provisioned();
        let reg: MappingRegistry<_> = MappingRegistry::new(ReadOnlyStore(inner));

        let err = reg.get_or_create_mapping("round", "Final").unwrap_err();
        assert!(matches!(err, MappingError::Store(StoreError::Io(_))));
        assert!(reg.list_mappings("round").unwrap().is_empty());
        assert_eq!(reg.find_mapping_id("round", "Final").unwrap(), None);
    }

    #[test]
    fn find_never_allocates() {
        let reg = registry();
        assert_eq!(reg.find_mapping_id("team", "Ajax").unwrap(), None);
        assert!(reg.list_mappings("team").unwrap().is_empty());

        reg.get_or_create_mapping("team", "Ajax").unwrap();
        assert_eq!(reg.find_mapping_id("team", "Ajax").unwrap(), Some(0));
    }

    #[test]
    fn list_is_ascending_snapshot() {
        let reg = registry();
        for name in ["c", "a", "b"] {
            reg.get_or_create_mapping("round", name).unwrap();
        }
        let names: Vec<(u32, String)> = reg
            .list_mappings("round")
            .unwrap()
            .into_iter()
            .map(|r| (r.id, r.name))
            .collect();
        assert_eq!(
            names,
            vec![(0, "c".into()), (1, "a".into()), (2, "b".into())]
        );
    }

    #[test]
    fn fingerprint_agrees_across_participants() {
        let a = registry();
        let b = registry();
        for name in ["Football", "Tennis", "Golf"] {
            a.get_or_create_mapping("sport", name).unwrap();
            b.get_or_create_mapping("sport", name).unwrap();
        }
        assert_eq!(
            a.index_fingerprint("sport").unwrap(),
            b.index_fingerprint("sport").unwrap()
        );

        b.get_or_create_mapping("sport", "Cricket").unwrap();
        assert_ne!(
            a.index_fingerprint("sport").unwrap(),
            b.index_fingerprint("sport").unwrap()
        );
    }

    #[test]
    fn high_ids_leave_low_slots_free() {
        let reg = seeded(MappingType::Team, &[u32::MAX]);
        let created = reg.get_or_create_mapping("team", "Ajax").unwrap();
        assert_eq!(created.id, 0);
    }

    #[test]
    fn result_serializes_for_command_layer() {
        let reg = registry();
        let id = reg.get_or_create_mapping("team", "Ajax").unwrap();
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "id": 0, "created": true, "typeToken": "team" })
        );

        let name = reg.resolve_mapping_name("team", 0).unwrap();
        let json = serde_json::to_value(&name).unwrap();
        assert_eq!(json, serde_json::json!({ "name": "Ajax", "typeToken": "team" }));
    }
}
