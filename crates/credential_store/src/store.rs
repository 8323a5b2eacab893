use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::CredentialStoreError;
use crate::paths::{credential_path, is_valid_name};
use crate::schema::{CredentialEntry, CredentialFile, CREDENTIAL_FILE_VERSION};
use crate::KeyStore;

/// File-backed [`KeyStore`].
///
/// Every write replaces the whole file through a sibling temp file and a
/// rename, so readers never observe a partially written file. On unix the
/// file is created with owner-only permissions.
#[derive(Debug)]
pub struct FileKeyStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKeyStore {
    /// Opens (without creating) the store at `path`. A missing file reads as
    /// an empty store; an existing file must be a valid version 1 layout.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CredentialStoreError> {
        let store = Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        };
        store.load()?;
        Ok(store)
    }

    /// Opens the store at its conventional location under `root`.
    pub fn open_in(root: &Path) -> Result<Self, CredentialStoreError> {
        Self::open(credential_path(root))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of all stored entries, sorted.
    pub fn names(&self) -> Result<Vec<String>, CredentialStoreError> {
        Ok(self.load()?.entries.into_keys().collect())
    }

    /// Last write time of `name`, RFC3339 UTC.
    pub fn updated_at(&self, name: &str) -> Result<Option<String>, CredentialStoreError> {
        Ok(self
            .load()?
            .entries
            .remove(name)
            .map(|entry| entry.updated_at))
    }

    fn load(&self) -> Result<CredentialFile, CredentialStoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == ErrorKind::NotFound => {
                return Ok(CredentialFile::default())
            }
            Err(source) => {
                return Err(CredentialStoreError::io(
                    "reading credential file",
                    &self.path,
                    source,
                ))
            }
        };

        if raw.trim().is_empty() {
            return Ok(CredentialFile::default());
        }

        let file: CredentialFile = serde_json::from_str(&raw)
            .map_err(|source| CredentialStoreError::json_parse(&self.path, source))?;
        validate_file(&self.path, &file)?;
        Ok(file)
    }

    fn persist(&self, file: &CredentialFile) -> Result<(), CredentialStoreError> {
        let encoded = serde_json::to_vec_pretty(file)
            .map_err(|source| CredentialStoreError::json_serialize(&self.path, source))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| {
                CredentialStoreError::io("creating credential directory", parent, source)
            })?;
        }

        let temp_path = temp_path_for(&self.path);
        let result = write_private(&temp_path, &encoded).and_then(|()| {
            fs::rename(&temp_path, &self.path).map_err(|source| {
                CredentialStoreError::io("replacing credential file", &self.path, source)
            })
        });
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result
    }
}

impl KeyStore for FileKeyStore {
    fn get(&self, name: &str) -> Result<Option<String>, CredentialStoreError> {
        Ok(self.load()?.entries.remove(name).map(|entry| entry.value))
    }

    fn set(&self, name: &str, value: &str) -> Result<(), CredentialStoreError> {
        validate_entry(name, value)?;
        let _guard = lock_unpoisoned(&self.write_lock);

        let mut file = self.load()?;
        file.entries.insert(
            name.to_string(),
            CredentialEntry {
                value: value.to_string(),
                updated_at: now_rfc3339()?,
            },
        );
        self.persist(&file)
    }

    fn delete(&self, name: &str) -> Result<bool, CredentialStoreError> {
        let _guard = lock_unpoisoned(&self.write_lock);

        let mut file = self.load()?;
        if file.entries.remove(name).is_none() {
            return Ok(false);
        }
        self.persist(&file)?;
        Ok(true)
    }
}

pub(crate) fn validate_entry(name: &str, value: &str) -> Result<(), CredentialStoreError> {
    if !is_valid_name(name) {
        return Err(CredentialStoreError::InvalidName(name.to_string()));
    }
    if value.trim().is_empty() {
        return Err(CredentialStoreError::EmptyValue(name.to_string()));
    }
    Ok(())
}

fn validate_file(path: &Path, file: &CredentialFile) -> Result<(), CredentialStoreError> {
    if file.version != CREDENTIAL_FILE_VERSION {
        return Err(CredentialStoreError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: file.version,
        });
    }

    for (name, entry) in &file.entries {
        if OffsetDateTime::parse(&entry.updated_at, &Rfc3339).is_err() {
            return Err(CredentialStoreError::InvalidTimestamp {
                path: path.to_path_buf(),
                name: name.clone(),
                value: entry.updated_at.clone(),
            });
        }
    }

    Ok(())
}

fn now_rfc3339() -> Result<String, CredentialStoreError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(CredentialStoreError::ClockFormat)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "credentials".to_string());
    path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()))
}

fn write_private(path: &Path, bytes: &[u8]) -> Result<(), CredentialStoreError> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file: File = options
        .open(path)
        .map_err(|source| CredentialStoreError::io("creating temp credential file", path, source))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|source| CredentialStoreError::io("writing temp credential file", path, source))
}

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
