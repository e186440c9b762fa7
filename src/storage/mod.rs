//! Geofence state storage.
//!
//! [`GeofenceStore`] is the abstract contract; [`InMemoryGeofenceStore`] and
//! [`FileGeofenceStore`] are the two backends.

mod memory;
pub mod persistent;
mod traits;

pub use memory::InMemoryGeofenceStore;
pub use persistent::{open_store, FileGeofenceStore, STORAGE_FILE_NAME};
pub use traits::GeofenceStore;
