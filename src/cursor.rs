//! # Scan Cursors
//!
//! Opaque per-partition resumption tokens. The blob is a bincode body
//! (`catalog version`, `seek key`) followed by a little-endian CRC32 of
//! the body. Consumers verify the checksum and the catalog version: a
//! cursor minted before any metadata change fails with `INVALID_CURSOR`
//! rather than resuming a scan whose schema may have drifted.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("Cursor blob truncated ({len} bytes)")]
    Truncated { len: usize },
    #[error("Cursor checksum mismatch")]
    BadChecksum,
    #[error("Cursor body failed to decode")]
    BadBody,
    #[error("Cursor minted under catalog version {minted}, current is {current}")]
    CatalogDrift { minted: u64, current: u64 },
}

#[derive(serde::Serialize, serde::Deserialize)]
struct CursorBody {
    catalog_version: u64,
    next_key: Vec<u8>,
}

/// Mint a cursor pointing at `next_key`.
pub fn encode_cursor(catalog_version: u64, next_key: &[u8]) -> Vec<u8> {
    let body = CursorBody { catalog_version, next_key: next_key.to_vec() };
    // in-memory serialisation of a plain struct cannot fail
    let mut blob = bincode::serialize(&body).unwrap_or_default();
    let crc = crc32fast::hash(&blob);
    blob.extend_from_slice(&crc.to_le_bytes());
    blob
}

/// Open a cursor and return the seek key. `current_version` is the
/// catalog version of the space being scanned.
pub fn decode_cursor(blob: &[u8], current_version: u64) -> Result<Vec<u8>, CursorError> {
    if blob.len() < 4 {
        return Err(CursorError::Truncated { len: blob.len() });
    }
    let (body, crc_bytes) = blob.split_at(blob.len() - 4);
    let declared = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    if crc32fast::hash(body) != declared {
        return Err(CursorError::BadChecksum);
    }
    let decoded: CursorBody = bincode::deserialize(body).map_err(|_| CursorError::BadBody)?;
    if decoded.catalog_version != current_version {
        return Err(CursorError::CatalogDrift {
            minted: decoded.catalog_version,
            current: current_version,
        });
    }
    Ok(decoded.next_key)
}
