//! On-disk layout of an index log.
//!
//! ```text
//! file   = header frame*
//! header = magic "BMAP" | format u8 | type code u8 | reserved [u8; 2] | provisioned_at i64 (unix ms)
//! frame  = id u32 | version u32 | name_len u32 | header_sum u32 | name_sum u32 | name [u8; name_len]
//! ```
//!
//! Integers are little-endian. Both sums are the low 32 bits of FNV-1a 64:
//! `header_sum` over id, version and name_len, `name_sum` over id, version
//! and the name bytes.
//!
//! A frame's length is only trusted once its header verifies. Damage that can
//! only be an interrupted append (a short final frame, a final frame whose
//! name fails `name_sum`, or a zero-filled tail) is dropped. Anything else is
//! [`StoreError::Corrupt`].

use bet_mapping::{Catalog, Fnv1a, MappingIndex, MappingRecord, StoreError};
use tracing::warn;
use zerocopy::byteorder::little_endian::{I64, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub(crate) const MAGIC: [u8; 4] = *b"BMAP";
pub(crate) const FORMAT_VERSION: u8 = 1;

#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Clone, Copy, Debug)]
#[repr(C)]
pub(crate) struct FileHeader {
    magic: [u8; 4],
    format: u8,
    type_code: u8,
    reserved: [u8; 2],
    provisioned_at: I64,
}

#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Clone, Copy, Debug)]
#[repr(C)]
pub(crate) struct FrameHeader {
    id: U32,
    version: U32,
    name_len: U32,
    header_sum: U32,
    name_sum: U32,
}

const _: () = assert!(size_of::<FileHeader>() == 16);
const _: () = assert!(size_of::<FrameHeader>() == 20);

impl FileHeader {
    pub(crate) const SIZE: usize = size_of::<Self>();

    pub(crate) fn new<C: Catalog>(ty: C, provisioned_at_ms: i64) -> Self {
        Self {
            magic: MAGIC,
            format: FORMAT_VERSION,
            type_code: ty.code(),
            reserved: [0; 2],
            provisioned_at: I64::new(provisioned_at_ms),
        }
    }
}

impl FrameHeader {
    pub(crate) const SIZE: usize = size_of::<Self>();

    fn new(id: u32, version: u32, name: &[u8]) -> Self {
        // Callers bound name by MAX_NAME_LEN.
        let name_len = name.len() as u32;
        Self {
            id: U32::new(id),
            version: U32::new(version),
            name_len: U32::new(name_len),
            header_sum: U32::new(header_sum(id, version, name_len)),
            name_sum: U32::new(name_sum(id, version, name)),
        }
    }

    fn verifies(&self) -> bool {
        self.header_sum.get() == header_sum(self.id.get(), self.version.get(), self.name_len.get())
    }
}

fn header_sum(id: u32, version: u32, name_len: u32) -> u32 {
    let mut hasher = Fnv1a::new();
    hasher.write_u32(id);
    hasher.write_u32(version);
    hasher.write_u32(name_len);
    hasher.finish() as u32
}

fn name_sum(id: u32, version: u32, name: &[u8]) -> u32 {
    let mut hasher = Fnv1a::new();
    hasher.write_u32(id);
    hasher.write_u32(version);
    hasher.write(name);
    hasher.finish() as u32
}

/// Serialize one record as a frame, ready for a single append.
pub(crate) fn encode_frame<C: Catalog>(record: &MappingRecord<C>) -> Result<Vec<u8>, StoreError> {
    let name = record.name.as_bytes();
    let max = MappingRecord::<C>::MAX_NAME_LEN;
    if name.len() > max {
        return Err(StoreError::NameTooLong {
            len: name.len(),
            max,
        });
    }

    let header = FrameHeader::new(record.id, record.version, name);
    let mut frame = Vec::with_capacity(FrameHeader::SIZE + name.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(name);
    Ok(frame)
}

/// A decoded log.
#[derive(Debug)]
pub(crate) struct DecodedLog<C> {
    pub index: MappingIndex<C>,
    pub provisioned_at_ms: i64,
    /// Length of the committed prefix; anything past it is a torn append.
    pub valid_len: u64,
    pub torn_tail: bool,
}

/// Decode a whole log for `ty`.
pub(crate) fn decode_log<C: Catalog>(ty: C, bytes: &[u8]) -> Result<DecodedLog<C>, StoreError> {
    let token = ty.token();
    let corrupt = |reason: String| StoreError::Corrupt { token, reason };

    let Ok((header, mut rest)) = FileHeader::read_from_prefix(bytes) else {
        return Err(corrupt(format!(
            "file header truncated ({} of {} bytes)",
            bytes.len(),
            FileHeader::SIZE
        )));
    };
    if header.magic != MAGIC {
        return Err(corrupt(format!("bad magic {:?}", header.magic)));
    }
    if header.format != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {}", header.format)));
    }
    if header.type_code != ty.code() {
        return Err(corrupt(format!(
            "log holds type code {:#04x}, expected {:#04x}",
            header.type_code,
            ty.code()
        )));
    }

    let max = MappingRecord::<C>::MAX_NAME_LEN;
    let mut index = MappingIndex::new(ty);
    let mut offset = FileHeader::SIZE;
    let mut torn_tail = false;

    while !rest.is_empty() {
        // Space the file system extended but never filled.
        if rest.iter().all(|&b| b == 0) {
            torn_tail = true;
            break;
        }
        let Ok((frame, body)) = FrameHeader::read_from_prefix(rest) else {
            torn_tail = true;
            break;
        };
        if !frame.verifies() {
            return Err(corrupt(format!("frame at offset {offset}: header checksum mismatch")));
        }

        let id = frame.id.get();
        let version = frame.version.get();
        let name_len = frame.name_len.get() as usize;
        if name_len > max {
            return Err(corrupt(format!(
                "frame at offset {offset}: name length {name_len} exceeds {max}"
            )));
        }
        if body.len() < name_len {
            torn_tail = true;
            break;
        }
        let (name, next) = body.split_at(name_len);

        if frame.name_sum.get() != name_sum(id, version, name) {
            if next.is_empty() {
                torn_tail = true;
                break;
            }
            return Err(corrupt(format!("frame at offset {offset}: name checksum mismatch")));
        }
        let name = std::str::from_utf8(name)
            .map_err(|e| corrupt(format!("frame at offset {offset}: name is not UTF-8: {e}")))?;

        index
            .insert(MappingRecord {
                id,
                ty,
                name: name.to_owned(),
                version,
            })
            .map_err(|e| corrupt(format!("frame at offset {offset}: {e}")))?;

        offset += FrameHeader::SIZE + name_len;
        rest = next;
    }

    if torn_tail {
        warn!(
            type_token = token,
            valid_len = offset,
            dropped = bytes.len() - offset,
            "ignoring torn append at end of mapping log"
        );
    }

    Ok(DecodedLog {
        index,
        provisioned_at_ms: header.provisioned_at.get(),
        valid_len: offset as u64,
        torn_tail,
    })
}
