//! Append-only file storage for bet-mapping indexes.
//!
//! Each mapping type gets its own log, `<data_dir>/<token>.bmap`. A log starts
//! with a fixed header and grows by one checksummed frame per record; records
//! are never rewritten or removed. A frame cut short by a crash was never
//! committed and is dropped on the next load.
//!
//! # Usage
//!
//! ```
//! use bet_mapping::MappingRegistry;
//! use bet_mapping_store::{FileStore, StoreConfig};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store: FileStore = FileStore::open(StoreConfig::new(dir.path()).provision_all()).unwrap();
//! let registry: MappingRegistry<_> = MappingRegistry::new(store);
//!
//! let id = registry.get_or_create_mapping("team", "Ajax").unwrap();
//! assert_eq!(id.id, 0);
//! assert!(id.created);
//! ```
//!
//! # Configuration
//!
//! ```toml
//! data_dir = "mappings"      # relative to the config file
//! durability = "sync"        # or "buffered"
//!
//! [namespaces]
//! provision = ["sport", "team"]
//! ```
//!
//! Only one process may write a data directory at a time; appends are
//! serialized within the process that owns the [`FileStore`].

mod config;
mod wire;

pub use config::{ConfigError, DEFAULT_DATA_DIR, Durability, StoreConfig};

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use bet_mapping::{Catalog, MappingIndex, MappingRecord, MappingStore, MappingType, StoreError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info};
use zerocopy::IntoBytes;

use wire::{DecodedLog, FileHeader};

/// File extension of index logs.
pub const LOG_EXTENSION: &str = "bmap";

/// Summary of one provisioned log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo<C = MappingType> {
    pub ty: C,
    pub records: usize,
    pub provisioned_at: DateTime<Utc>,
}

/// Index store backed by one append-only log per mapping type.
#[derive(Debug)]
pub struct FileStore<C = MappingType> {
    data_dir: PathBuf,
    durability: Durability,
    write_lock: Mutex<()>,
    _catalog: PhantomData<fn() -> C>,
}

impl<C: Catalog> FileStore<C> {
    /// Open the data directory, creating it and any configured logs that do
    /// not exist yet.
    pub fn open(config: StoreConfig<C>) -> Result<Self, StoreError> {
        fs::create_dir_all(&config.data_dir)?;
        let store = Self {
            data_dir: config.data_dir,
            durability: config.durability,
            write_lock: Mutex::new(()),
            _catalog: PhantomData,
        };

        for &ty in &config.provision {
            match store.provision(ty) {
                Ok(()) | Err(StoreError::AlreadyProvisioned { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        info!(
            data_dir = %store.data_dir.display(),
            durability = ?store.durability,
            "opened mapping store"
        );
        Ok(store)
    }

    /// Open `dir` with default settings, provisioning nothing.
    pub fn open_dir(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open(StoreConfig::new(dir))
    }

    /// Directory holding the logs.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Whether appends are synced before they are acknowledged.
    pub fn durability(&self) -> Durability {
        self.durability
    }

    /// Log path for `ty`.
    pub fn path_for(&self, ty: C) -> PathBuf {
        self.data_dir
            .join(format!("{}.{LOG_EXTENSION}", ty.token()))
    }

    /// Create the empty log for `ty`.
    pub fn provision(&self, ty: C) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let path = self.path_for(ty);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyProvisioned { token: ty.token() });
            }
            Err(e) => return Err(e.into()),
        };

        let header = FileHeader::new(ty, Utc::now().timestamp_millis());
        if let Err(e) = write_header(&mut file, &header) {
            // Leave no half-written header behind.
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }

        debug!(type_token = ty.token(), path = %path.display(), "provisioned mapping log");
        Ok(())
    }

    /// Whether `ty` has a log on disk.
    pub fn is_provisioned(&self, ty: C) -> bool {
        self.path_for(ty).is_file()
    }

    /// Record count and provisioning time of `ty`'s log, or `None` if it was
    /// never provisioned.
    pub fn index_info(&self, ty: C) -> Result<Option<IndexInfo<C>>, StoreError> {
        let Some(log) = self.read_log(ty)? else {
            return Ok(None);
        };
        let provisioned_at = DateTime::from_timestamp_millis(log.provisioned_at_ms).ok_or_else(
            || StoreError::Corrupt {
                token: ty.token(),
                reason: format!("provisioning time {} out of range", log.provisioned_at_ms),
            },
        )?;
        Ok(Some(IndexInfo {
            ty,
            records: log.index.len(),
            provisioned_at,
        }))
    }

    fn read_log(&self, ty: C) -> Result<Option<DecodedLog<C>>, StoreError> {
        let bytes = match fs::read(self.path_for(ty)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        wire::decode_log(ty, &bytes).map(Some)
    }
}

fn write_header(file: &mut File, header: &FileHeader) -> io::Result<()> {
    file.write_all(header.as_bytes())?;
    file.sync_all()
}

/// The file operations an append needs.
trait LogFile: Write + Seek {
    fn sync_data(&mut self) -> io::Result<()>;
    fn set_len(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn sync_data(&mut self) -> io::Result<()> {
        File::sync_data(self)
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

fn append<F: LogFile>(
    file: &mut F,
    at: u64,
    frame: &[u8],
    durability: Durability,
) -> io::Result<()> {
    file.seek(SeekFrom::Start(at))?;
    file.write_all(frame)?;
    if durability == Durability::Sync {
        file.sync_data()?;
    }
    Ok(())
}

/// Append `frame` at `at`. On failure the log is cut back to `at`, so a
/// frame the caller was told failed never shows up on the next load.
fn append_or_roll_back<F: LogFile>(
    file: &mut F,
    at: u64,
    frame: &[u8],
    durability: Durability,
) -> io::Result<()> {
    let Err(e) = append(file, at, frame, durability) else {
        return Ok(());
    };
    if let Err(rollback) = file.set_len(at) {
        error!(
            error = %rollback,
            valid_len = at,
            "failed to roll back mapping log after a failed append"
        );
    }
    Err(e)
}

impl<C: Catalog> MappingStore<C> for FileStore<C> {
    fn load_index(&self, ty: C) -> Result<Option<MappingIndex<C>>, StoreError> {
        Ok(self.read_log(ty)?.map(|log| log.index))
    }

    fn save_record(&self, record: &MappingRecord<C>) -> Result<(), StoreError> {
        let ty = record.ty;
        let frame = wire::encode_frame(record)?;

        let _guard = self.write_lock.lock();
        let path = self.path_for(ty);
        let mut file = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::Unprovisioned { token: ty.token() });
            }
            Err(e) => return Err(e.into()),
        };

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let log = wire::decode_log(ty, &bytes)?;
        if log.index.contains_id(record.id) {
            return Err(StoreError::DuplicateId {
                token: ty.token(),
                id: record.id,
            });
        }

        if log.torn_tail {
            file.set_len(log.valid_len)?;
        }
        append_or_roll_back(&mut file, log.valid_len, &frame, self.durability)?;

        debug!(
            type_token = ty.token(),
            id = record.id,
            bytes = frame.len(),
            "appended mapping record"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// In-memory log whose sync can be made to fail.
    struct FlakyLog {
        inner: Cursor<Vec<u8>>,
        fail_sync: bool,
    }

    impl FlakyLog {
        fn new(committed: &[u8], fail_sync: bool) -> Self {
            Self {
                inner: Cursor::new(committed.to_vec()),
                fail_sync,
            }
        }

        fn bytes(&self) -> &[u8] {
            self.inner.get_ref()
        }
    }

    impl Write for FlakyLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    impl Seek for FlakyLog {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    impl LogFile for FlakyLog {
        fn sync_data(&mut self) -> io::Result<()> {
            if self.fail_sync {
                Err(io::Error::other("disk went away"))
            } else {
                Ok(())
            }
        }

        fn set_len(&mut self, len: u64) -> io::Result<()> {
            self.inner.get_mut().truncate(len as usize);
            Ok(())
        }
    }

    #[test]
    fn failed_sync_rolls_the_append_back() {
        let committed = b"committed-prefix";
        let mut log = FlakyLog::new(committed, true);

        let at = committed.len() as u64;
        let err = append_or_roll_back(&mut log, at, b"frame", Durability::Sync).unwrap_err();
        assert_eq!(err.to_string(), "disk went away");
        assert_eq!(log.bytes(), committed);
    }

    #[test]
    fn buffered_append_skips_sync() {
        let committed = b"committed-prefix";
        let mut log = FlakyLog::new(committed, true);

        let at = committed.len() as u64;
        append_or_roll_back(&mut log, at, b"frame", Durability::Buffered).unwrap();
        assert_eq!(log.bytes(), b"committed-prefixframe");
    }

    #[test]
    fn append_lands_at_the_committed_length() {
        // A stale tail past `at` is overwritten, not appended after.
        let mut log = FlakyLog::new(b"committed-prefix", false);
        append_or_roll_back(&mut log, 9, b"frame", Durability::Sync).unwrap();
        assert_eq!(log.bytes(), b"committedframeix");
    }
}
