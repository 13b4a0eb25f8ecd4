//! Storage seam for mapping indexes, plus a process-local implementation.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::catalog::{Catalog, MappingType};
use crate::error::StoreError;
use crate::index::{MappingIndex, MappingRecord};

/// Persistent storage for mapping indexes.
///
/// Implementations must be safe to share between threads; the registry
/// serializes writers per type but readers of different types, and readers
/// and writers of different types, reach the store concurrently.
pub trait MappingStore<C: Catalog = MappingType>: Send + Sync {
    /// Load the full index of `ty`, or `None` if it was never provisioned.
    fn load_index(&self, ty: C) -> Result<Option<MappingIndex<C>>, StoreError>;

    /// Durably append one record to its type's index.
    ///
    /// Either the record is stored or an error is returned; a failed call
    /// leaves the index unchanged.
    fn save_record(&self, record: &MappingRecord<C>) -> Result<(), StoreError>;
}

impl<C: Catalog, S: MappingStore<C> + ?Sized> MappingStore<C> for &S {
    fn load_index(&self, ty: C) -> Result<Option<MappingIndex<C>>, StoreError> {
        (**self).load_index(ty)
    }

    fn save_record(&self, record: &MappingRecord<C>) -> Result<(), StoreError> {
        (**self).save_record(record)
    }
}

impl<C: Catalog, S: MappingStore<C> + ?Sized> MappingStore<C> for std::sync::Arc<S> {
    fn load_index(&self, ty: C) -> Result<Option<MappingIndex<C>>, StoreError> {
        (**self).load_index(ty)
    }

    fn save_record(&self, record: &MappingRecord<C>) -> Result<(), StoreError> {
        (**self).save_record(record)
    }
}

/// In-memory store. Nothing survives the process.
#[derive(Debug)]
pub struct MemoryStore<C = MappingType> {
    indexes: RwLock<HashMap<C, MappingIndex<C>>>,
}

impl<C: Catalog> Default for MemoryStore<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Catalog> MemoryStore<C> {
    /// An empty store with no provisioned types.
    pub fn new() -> Self {
        Self {
            indexes: RwLock::new(HashMap::new()),
        }
    }

    /// A store with an empty index for every type of the catalog.
    pub fn with_all_provisioned() -> Self {
        let store = Self::new();
        store.provision_all();
        store
    }

    /// Create the empty index for `ty`.
    pub fn provision(&self, ty: C) -> Result<(), StoreError> {
        let mut indexes = self.indexes.write();
        if indexes.contains_key(&ty) {
            return Err(StoreError::AlreadyProvisioned { token: ty.token() });
        }
        indexes.insert(ty, MappingIndex::new(ty));
        debug!(type_token = ty.token(), "provisioned mapping index");
        Ok(())
    }

    /// Provision every type that has no index yet.
    pub fn provision_all(&self) {
        let mut indexes = self.indexes.write();
        for &ty in C::ALL {
            indexes.entry(ty).or_insert_with(|| MappingIndex::new(ty));
        }
    }

    /// Seed an index directly, e.g. from a snapshot received elsewhere.
    pub fn insert_index(&self, index: MappingIndex<C>) -> Result<(), StoreError> {
        let ty = index.ty();
        let mut indexes = self.indexes.write();
        if indexes.contains_key(&ty) {
            return Err(StoreError::AlreadyProvisioned { token: ty.token() });
        }
        indexes.insert(ty, index);
        Ok(())
    }

    /// Whether `ty` holds an index, even an empty one.
    pub fn is_provisioned(&self, ty: C) -> bool {
        self.indexes.read().contains_key(&ty)
    }
}

impl<C: Catalog> MappingStore<C> for MemoryStore<C> {
    fn load_index(&self, ty: C) -> Result<Option<MappingIndex<C>>, StoreError> {
        Ok(self.indexes.read().get(&ty).cloned())
    }

    fn save_record(&self, record: &MappingRecord<C>) -> Result<(), StoreError> {
        if record.name.len() > MappingRecord::<C>::MAX_NAME_LEN {
            return Err(StoreError::NameTooLong {
                len: record.name.len(),
                max: MappingRecord::<C>::MAX_NAME_LEN,
            });
        }
        let mut indexes = self.indexes.write();
        let index = indexes
            .get_mut(&record.ty)
            .ok_or(StoreError::Unprovisioned {
                token: record.ty.token(),
            })?;
        index.insert(record.clone())
    }
}
