//! Maps block id to its registered per-block password, in memory only.
//! Read-mostly, concurrent, and wiped on removal or shutdown.

use dashmap::DashMap;
use zeroize::Zeroize;

/// A password wrapped so its bytes are zeroed on drop.
struct SecretPassword(String);

impl Drop for SecretPassword {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Read-mostly block-id → password map. Never persisted; wiped on
/// `clear`/`Drop`.
#[derive(Default)]
pub struct PasswordRegistry {
    passwords: DashMap<String, SecretPassword>,
}

impl PasswordRegistry {
    /// Build an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or overwrite) the password for `block_id`.
    pub fn register(&self, block_id: impl Into<String>, password: impl Into<String>) {
        self.passwords.insert(block_id.into(), SecretPassword(password.into()));
    }

    /// Look up the password for `block_id`, if any is registered. Used
    /// by re-indexing calls that don't carry the password a second time.
    pub fn get(&self, block_id: &str) -> Option<String> {
        self.passwords.get(block_id).map(|entry| entry.0.clone())
    }

    /// Remove the password for `block_id`, zeroing it.
    pub fn remove(&self, block_id: &str) {
        self.passwords.remove(block_id);
    }

    /// Whether a password is registered for `block_id`.
    pub fn contains(&self, block_id: &str) -> bool {
        self.passwords.contains_key(block_id)
    }

    /// Number of registered passwords.
    pub fn len(&self) -> usize {
        self.passwords.len()
    }

    /// Whether the registry holds no passwords.
    pub fn is_empty(&self) -> bool {
        self.passwords.is_empty()
    }

    /// Wipe every registered password (engine shutdown).
    pub fn clear(&self) {
        self.passwords.clear();
    }
}
