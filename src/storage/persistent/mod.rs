//! Persistent storage backend.
//!
//! The known-geofence set is persisted as a single blob:
//! - Whole-file read, whole-file write (temp file + rename)
//! - CRC32 checksum for corruption detection
//! - Magic + version header for forward compatibility
//!
//! # Layout
//!
//! ```text
//! <storage_dir>/GeofencesData
//! ┌──────┬─────┬─────────┬──────────┬──────────────────────────┬─────────┐
//! │ GEOF │ ver │ ver     │ len (LE) │ JSON [GeofenceState, ..] │ crc32   │
//! └──────┴─────┴─────────┴──────────┴──────────────────────────┴─────────┘
//!   header       frame
//! ```

mod codec;
mod file;

pub use codec::{decode_blob, encode_blob, CODEC_VERSION, MAGIC};
pub use file::{FileGeofenceStore, STORAGE_FILE_NAME};

use std::path::Path;

use crate::error::GeofenceResult;

/// Open or create a persistent geofence store in `dir`.
///
/// # Errors
/// `DiskFilePath` if the directory cannot be created.
///
/// # Example
/// ```rust,ignore
/// use geofence_tracker::storage::open_store;
///
/// let store = open_store("./geofences")?;
/// ```
pub fn open_store(dir: impl AsRef<Path>) -> GeofenceResult<FileGeofenceStore> {
    FileGeofenceStore::open(dir)
}
