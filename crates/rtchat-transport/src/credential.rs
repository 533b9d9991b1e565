//! Persistence of the bearer credential.
//!
//! The client keeps exactly one opaque credential string. It is written
//! after a successful signup or login, and removed on logout or whenever
//! the server answers 401. Storage is synchronous: it is a single small
//! value and every caller wants the answer immediately.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::TransportError;

/// Somewhere the credential can be persisted.
///
/// Shared between the HTTP client (which reads it for every request and
/// clears it on 401) and the session store (which writes it on login and
/// clears it on logout), so implementations use interior mutability.
pub trait CredentialStore: Send + Sync + 'static {
    /// Returns the persisted credential, if any.
    fn load(&self) -> Result<Option<String>, TransportError>;

    /// Persists a credential, replacing any previous one.
    fn save(&self, token: &str) -> Result<(), TransportError>;

    /// Removes the persisted credential. Clearing an empty store is not
    /// an error.
    fn clear(&self) -> Result<(), TransportError>;
}

// ---------------------------------------------------------------------------
// MemoryCredentialStore
// ---------------------------------------------------------------------------

/// Keeps the credential in memory only. Lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<String>, TransportError> {
        Ok(self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, token: &str) -> Result<(), TransportError> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(token.to_owned());
        Ok(())
    }

    fn clear(&self) -> Result<(), TransportError> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileCredentialStore
// ---------------------------------------------------------------------------

/// Keeps the credential in a single file.
///
/// The file holds nothing but the token. Surrounding whitespace is ignored
/// on load, and an empty file counts as no credential.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Creates a store backed by `path`. The file is not touched until the
    /// first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file this store reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<String>, TransportError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| token.to_owned()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TransportError::Credential(e)),
        }
    }

    fn save(&self, token: &str) -> Result<(), TransportError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(TransportError::Credential)?;
            }
        }
        std::fs::write(&self.path, token).map_err(TransportError::Credential)?;
        tracing::debug!(path = %self.path.display(), "credential saved");
        Ok(())
    }

    fn clear(&self) -> Result<(), TransportError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "credential removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TransportError::Credential(e)),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    static NEXT_FILE: AtomicU32 = AtomicU32::new(0);

    /// A path under the system temp dir that no other test uses.
    fn scratch_path() -> PathBuf {
        let n = NEXT_FILE.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir()
            .join(format!("rtchat-credential-{}-{n}", std::process::id()))
            .join("token")
    }

    // -- MemoryCredentialStore --------------------------------------------

    #[test]
    fn test_memory_store_starts_empty() {
        let store = MemoryCredentialStore::new();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_memory_store_save_then_load() {
        let store = MemoryCredentialStore::new();
        store.save("abc").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn test_memory_store_save_replaces_previous() {
        let store = MemoryCredentialStore::with_token("old");
        store.save("new").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn test_memory_store_clear_removes_token() {
        let store = MemoryCredentialStore::with_token("abc");
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    // -- FileCredentialStore ----------------------------------------------

    #[test]
    fn test_file_store_missing_file_is_none() {
        let store = FileCredentialStore::new(scratch_path());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_file_store_save_creates_parent_and_loads() {
        let store = FileCredentialStore::new(scratch_path());
        store.save("abc").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("abc"));
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_trims_whitespace() {
        let path = scratch_path();
        let store = FileCredentialStore::new(&path);
        store.save("  abc\n").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("abc"));
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_empty_file_is_none() {
        let store = FileCredentialStore::new(scratch_path());
        store.save("").unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_clear_removes_file() {
        let store = FileCredentialStore::new(scratch_path());
        store.save("abc").unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_file_store_clear_missing_file_is_ok() {
        let store = FileCredentialStore::new(scratch_path());
        assert!(store.clear().is_ok());
    }
}
