//! Single-blob file store.
//!
//! The whole geofence set lives in one file. Every mutation reads the current
//! snapshot, changes it, and rewrites the file through a temp file + rename, so
//! a crash mid-write leaves either the old or the new snapshot on disk.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{GeofenceError, GeofenceResult};
use crate::geofence::{ensure_unique_ids, Geofence, GeofenceId, GeofenceState};
use crate::storage::traits::GeofenceStore;

use super::codec;

/// Fixed storage key (file name) of the geofence blob.
pub const STORAGE_FILE_NAME: &str = "GeofencesData";

const TEMP_SUFFIX: &str = ".tmp";

/// Durable [`GeofenceStore`] backed by one file.
#[derive(Debug)]
pub struct FileGeofenceStore {
    path: PathBuf,
    sync_on_write: bool,
    write_lock: Mutex<()>,
}

impl FileGeofenceStore {
    /// Opens (or prepares) the store inside `dir`.
    ///
    /// # Errors
    /// `DiskFilePath` if the directory cannot be created or is not a directory,
    /// `DiskRemove` if a stale temp file from an interrupted write cannot be
    /// removed.
    pub fn open(dir: impl AsRef<Path>) -> GeofenceResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| GeofenceError::DiskFilePath {
            message: format!("failed to create {}: {e}", dir.display()),
        })?;
        if !dir.is_dir() {
            return Err(GeofenceError::DiskFilePath {
                message: format!("{} is not a directory", dir.display()),
            });
        }

        let store = Self {
            path: dir.join(STORAGE_FILE_NAME),
            sync_on_write: true,
            write_lock: Mutex::new(()),
        };

        // A leftover temp file means a previous write never reached the rename.
        let temp = store.temp_path();
        if temp.exists() {
            fs::remove_file(&temp).map_err(|e| {
                tracing::warn!(path = %temp.display(), error = %e, "failed to remove stale geofence temp file");
                GeofenceError::DiskRemove {
                    message: format!("{}: {e}", temp.display()),
                }
            })?;
        }

        Ok(store)
    }

    /// Whether to fsync the blob before renaming it into place.
    #[must_use]
    pub const fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    /// Location of the blob file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(TEMP_SUFFIX);
        PathBuf::from(name)
    }

    fn lock(&self) -> GeofenceResult<MutexGuard<'_, ()>> {
        self.write_lock.lock().map_err(|_| GeofenceError::DiskWrite {
            message: "poisoned lock: geofence blob".to_string(),
        })
    }

    /// Reads the current snapshot. A missing file is an empty store.
    fn load(&self) -> GeofenceResult<Vec<GeofenceState>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(GeofenceError::DiskRead {
                    message: format!("{}: {e}", self.path.display()),
                })
            }
        };

        let states: Vec<GeofenceState> =
            codec::decode_blob(&bytes).map_err(|e| GeofenceError::DiskRead {
                message: format!("{}: {e}", self.path.display()),
            })?;

        let mut seen = HashSet::with_capacity(states.len());
        if let Some(dup) = states.iter().find(|s| !seen.insert(s.id())) {
            return Err(GeofenceError::DiskRead {
                message: format!("{}: duplicate id {}", self.path.display(), dup.id()),
            });
        }

        Ok(states)
    }

    /// Rewrites the whole snapshot. An empty snapshot removes the file.
    fn persist(&self, states: &[GeofenceState]) -> GeofenceResult<()> {
        if states.is_empty() {
            return match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(GeofenceError::DiskRemove {
                    message: format!("{}: {e}", self.path.display()),
                }),
            };
        }

        let write_err = |e: std::io::Error| GeofenceError::DiskWrite {
            message: format!("{}: {e}", self.path.display()),
        };

        let blob = codec::encode_blob(&states).map_err(write_err)?;
        let temp = self.temp_path();
        {
            let mut file = File::create(&temp).map_err(write_err)?;
            file.write_all(&blob).map_err(write_err)?;
            if self.sync_on_write {
                file.sync_all().map_err(write_err)?;
            }
        }
        fs::rename(&temp, &self.path).map_err(write_err)?;

        tracing::debug!(path = %self.path.display(), count = states.len(), "wrote geofences to disk");
        Ok(())
    }
}

impl GeofenceStore for FileGeofenceStore {
    fn replace_all(&self, geofences: Vec<Geofence>) -> GeofenceResult<()> {
        ensure_unique_ids(&geofences)?;
        let _guard = self.lock()?;
        let states: Vec<GeofenceState> = geofences.into_iter().map(GeofenceState::new).collect();
        self.persist(&states)
    }

    fn get(&self, id: &GeofenceId) -> GeofenceResult<Option<GeofenceState>> {
        Ok(self.load()?.into_iter().find(|s| s.id() == id))
    }

    fn update(&self, state: GeofenceState) -> GeofenceResult<()> {
        let _guard = self.lock()?;
        let mut states = self.load()?;
        let Some(slot) = states.iter_mut().find(|s| s.id() == state.id()) else {
            return Err(GeofenceError::UnknownRegion {
                id: state.id().clone(),
            });
        };
        *slot = state;
        self.persist(&states)
    }

    fn remove(&self, id: &GeofenceId) -> GeofenceResult<bool> {
        let _guard = self.lock()?;
        let mut states = self.load()?;
        let before = states.len();
        states.retain(|s| s.id() != id);
        if states.len() == before {
            return Ok(false);
        }
        self.persist(&states)?;
        Ok(true)
    }

    fn all(&self) -> GeofenceResult<Vec<GeofenceState>> {
        self.load()
    }
}
