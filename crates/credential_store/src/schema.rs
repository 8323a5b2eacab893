use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const CREDENTIAL_FILE_VERSION: u32 = 1;

/// On-disk layout: `{ "version": 1, "entries": { name: { value, updated_at } } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialFile {
    pub version: u32,
    #[serde(default)]
    pub entries: BTreeMap<String, CredentialEntry>,
}

impl Default for CredentialFile {
    fn default() -> Self {
        Self {
            version: CREDENTIAL_FILE_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialEntry {
    pub value: String,
    /// RFC3339 UTC timestamp of the last write.
    pub updated_at: String,
}
