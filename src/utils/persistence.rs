use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    account::AccountTree,
    config::{tmp_path, write_atomic},
    errors::JournalError,
    journal::JournalSnapshot,
};

pub const SNAPSHOT_SCHEMA_VERSION: u8 = 1;

/// On-disk image of a session: its account tree plus the journal loaded into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default = "SessionSnapshot::schema_version_default")]
    pub schema_version: u8,
    pub accounts: AccountTree,
    pub journal: JournalSnapshot,
}

impl SessionSnapshot {
    pub fn new(accounts: AccountTree, journal: JournalSnapshot) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            accounts,
            journal,
        }
    }

    pub fn schema_version_default() -> u8 {
        SNAPSHOT_SCHEMA_VERSION
    }
}

/// Writes the snapshot to disk atomically by staging to a temporary file.
pub fn save_snapshot(snapshot: &SessionSnapshot, path: &Path) -> Result<(), JournalError> {
    let tmp = tmp_path(path);
    let json = serde_json::to_string_pretty(snapshot)?;
    write_atomic(&tmp, &json)?;
    fs::rename(tmp, path)?;
    Ok(())
}

/// Loads a snapshot from disk, refusing files written by a newer schema.
pub fn load_snapshot(path: &Path) -> Result<SessionSnapshot, JournalError> {
    let data = fs::read_to_string(path)?;
    let snapshot: SessionSnapshot = serde_json::from_str(&data)?;
    if snapshot.schema_version > SNAPSHOT_SCHEMA_VERSION {
        tracing::warn!(
            path = %path.display(),
            version = snapshot.schema_version,
            "snapshot written by a newer schema"
        );
        return Err(JournalError::UnsupportedSchema(snapshot.schema_version));
    }
    Ok(snapshot)
}
