use std::path::{Path, PathBuf};

pub const CREDENTIAL_DIR: [&str; 2] = [".session-sync", "credentials"];
pub const CREDENTIAL_FILE: &str = "keys.json";

/// Directory holding the credential file under `root`.
#[must_use]
pub fn credential_root(root: &Path) -> PathBuf {
    root.join(CREDENTIAL_DIR[0]).join(CREDENTIAL_DIR[1])
}

#[must_use]
pub fn credential_path(root: &Path) -> PathBuf {
    credential_root(root).join(CREDENTIAL_FILE)
}

/// Conventional key-store name for a provider's API key.
#[must_use]
pub fn provider_key_name(provider_id: &str) -> String {
    let sanitized: String = provider_id
        .trim()
        .chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '-',
        })
        .collect();
    format!("provider.{sanitized}.api_key")
}

/// Names are 1-128 characters from `[A-Za-z0-9._-]`.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
