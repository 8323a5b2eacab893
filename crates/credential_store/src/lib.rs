//! Key-value storage for provider API keys.

mod error;
mod memory;
mod paths;
mod schema;
mod store;

pub use error::CredentialStoreError;
pub use memory::MemoryKeyStore;
pub use paths::{credential_path, credential_root, is_valid_name, provider_key_name};
pub use schema::{CredentialEntry, CredentialFile, CREDENTIAL_FILE_VERSION};
pub use store::FileKeyStore;

/// Named secret storage.
pub trait KeyStore: Send + Sync {
    fn get(&self, name: &str) -> Result<Option<String>, CredentialStoreError>;

    /// Inserts or replaces `name`.
    fn set(&self, name: &str, value: &str) -> Result<(), CredentialStoreError>;

    /// Returns whether an entry was removed.
    fn delete(&self, name: &str) -> Result<bool, CredentialStoreError>;
}
