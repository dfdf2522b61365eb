//! Transactional JSON store for the pipeline state.
//!
//! The whole [`StoreState`] lives in memory behind a mutex and is mirrored to
//! a single JSON file. A transaction runs against a copy of the state; only
//! when the closure succeeds is the copy persisted and swapped in. A failed
//! transaction leaves both memory and disk untouched.
//!
//! File format:
//! ```json
//! {
//!     "version": 1,
//!     "state": { ... StoreState ... }
//! }
//! ```
//!
//! The store is safe for concurrent use within one process; concurrent
//! writers in separate processes are not coordinated.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::{CredentialError, Result};

use super::state::StoreState;
use super::write_atomic;

const STORE_FILE_VERSION: u32 = 1;

#[derive(Serialize)]
struct StoreFileRef<'a> {
    version: u32,
    state: &'a StoreState,
}

#[derive(Deserialize)]
struct StoreFile {
    version: u32,
    state: StoreState,
}

/// Single-file store with all-or-nothing transactions.
pub struct JsonStore {
    path: Option<PathBuf>,
    state: Mutex<StoreState>,
}

impl JsonStore {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Open the store at `path`, starting empty when the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            load_state(&path)?
        } else {
            StoreState::default()
        };
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a read-only query against the current state.
    pub fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> Result<T> {
        let guard = self.lock()?;
        Ok(f(&guard))
    }

    /// Run `f` as one atomic unit.
    ///
    /// Everything `f` reads and writes happens under the store lock, so
    /// check-then-act sequences inside one transaction cannot interleave with
    /// another caller. Changes are committed only if `f` returns `Ok`.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut guard = self.lock()?;
        let mut working = guard.clone();
        let value = f(&mut working)?;
        if working != *guard {
            if let Some(path) = &self.path {
                persist(path, &working)?;
            }
            *guard = working;
        }
        Ok(value)
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| CredentialError::StorageError("store lock poisoned".into()))
    }
}

fn load_state(path: &Path) -> Result<StoreState> {
    let bytes = std::fs::read(path)?;
    let file: StoreFile = serde_json::from_slice(&bytes).map_err(|e| {
        CredentialError::InvalidFileFormat(format!(
            "failed to parse store file {}: {e}",
            path.display()
        ))
    })?;
    if file.version != STORE_FILE_VERSION {
        return Err(CredentialError::InvalidFileFormat(format!(
            "unsupported store version {}",
            file.version
        )));
    }
    Ok(file.state)
}

fn persist(path: &Path, state: &StoreState) -> Result<()> {
    let file = StoreFileRef {
        version: STORE_FILE_VERSION,
        state,
    };
    let json = serde_json::to_string_pretty(&file)
        .map_err(|e| CredentialError::SerializationError(e.to_string()))?;
    write_atomic(path, json.as_bytes())
}
