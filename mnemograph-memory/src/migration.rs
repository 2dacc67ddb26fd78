//! Database format versioning
//!
//! Stamps new databases with the current format version and refuses to
//! open databases written by a newer build.

use crate::error::{MemoryError, Result};
use rocksdb::DB;

/// Database version stored in metadata
pub const DB_VERSION_KEY: &[u8] = b"_db_version";
pub const CURRENT_VERSION: u32 = 1;

/// Check the stored format version, stamping it on a fresh database
pub fn ensure_version(db: &DB) -> Result<u32> {
    let stored = match db.get(DB_VERSION_KEY)? {
        Some(bytes) => {
            let bytes_slice: &[u8] = bytes.as_ref();
            let version_bytes: [u8; 4] = bytes_slice
                .try_into()
                .map_err(|_| MemoryError::InvalidPath("Invalid version format".into()))?;
            Some(u32::from_le_bytes(version_bytes))
        }
        None => None,
    };

    match stored {
        None => {
            log::debug!("Stamping new database with version {}", CURRENT_VERSION);
            db.put(DB_VERSION_KEY, CURRENT_VERSION.to_le_bytes())?;
            db.flush()?;
            Ok(CURRENT_VERSION)
        }
        Some(version) if version > CURRENT_VERSION => Err(MemoryError::Version {
            found: version,
            supported: CURRENT_VERSION,
        }),
        Some(version) => {
            log::info!(
                "Database version: {} (current: {})",
                version,
                CURRENT_VERSION
            );
            Ok(version)
        }
    }
}
