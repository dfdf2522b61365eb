//! Persistence for pipeline state and the organization key.
//!
//! # Directory layout
//!
//! The CLI keeps everything under one home directory (`~/.ccred/` by default):
//!
//! ```text
//! ~/.ccred/
//! ├── config.json
//! ├── store.json      courses, attempts, progress, certificates, policy
//! ├── org.key         encrypted organization signing key
//! ├── ledger.json     local ledger entries
//! └── metadata/
//!     └── {cid}.json  published certificate descriptors
//! ```
//!
//! # Modules
//!
//! - [`state`] — the relational model and its uniqueness rules.
//! - [`json_store`] — single-file store with all-or-nothing transactions.
//! - [`key_file`] — passphrase-encrypted organization key.

use std::path::Path;

use crate::error::Result;

pub mod json_store;
pub mod key_file;
pub mod state;

pub use json_store::JsonStore;
pub use key_file::{load_org_key, read_public_key, save_org_key, OrgKeyFile, PublicKeyInfo};
pub use state::StoreState;

/// Write `data` to `path` atomically using a sibling temporary file.
///
/// Creates the parent directory if it does not exist.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);
    std::fs::write(&tmp_path, data)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
