//! Credential persistence.
//!
//! Stores are consulted only at startup, to pre-seed the coordinator, and at
//! shutdown, to flush its snapshot. They never take part in resolution.
//!
//! `JsonFileStore` layout:
//!
//! ```text
//! {
//!   "credentials": [
//!     { "name": "Authorization", "value": "Bearer ...", "scope": "api.example.com" }
//!   ]
//! }
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use aas_access_common::HeaderItem;

use crate::error::{AccessError, Result};

/// Persistence for resolved headers.
pub trait CredentialStore: Send + Sync {
    /// Loads every stored header.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read or parsed.
    fn load(&self) -> Result<Vec<HeaderItem>>;

    /// Replaces the stored headers.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn save(&self, items: &[HeaderItem]) -> Result<()>;

    /// Removes every stored header.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be removed.
    fn clear(&self) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(default)]
    credentials: Vec<StoredCredential>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCredential {
    name: String,
    value: String,
    scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl From<&HeaderItem> for StoredCredential {
    fn from(item: &HeaderItem) -> Self {
        Self {
            name: item.name().to_string(),
            value: item.value().expose_secret().to_string(),
            scope: item.scope().to_string(),
            expires_at: item.expires_at(),
        }
    }
}

impl From<StoredCredential> for HeaderItem {
    fn from(stored: StoredCredential) -> Self {
        let item = Self::new(stored.name, stored.value, stored.scope);
        match stored.expires_at {
            Some(at) => item.with_expiry(at),
            None => item,
        }
    }
}

/// Stores headers in a JSON file readable only by its owner.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        Ok(())
    }
}

impl CredentialStore for JsonFileStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn load(&self) -> Result<Vec<HeaderItem>> {
        if !self.path.exists() {
            debug!("No credential store yet");
            return Ok(Vec::new());
        }

        let json = fs::read_to_string(&self.path)?;
        let stored: StoredCredentials = serde_json::from_str(&json)?;

        debug!(count = stored.credentials.len(), "Loaded credentials");
        Ok(stored.credentials.into_iter().map(HeaderItem::from).collect())
    }

    #[instrument(skip(self, items), fields(path = %self.path.display(), count = items.len()))]
    fn save(&self, items: &[HeaderItem]) -> Result<()> {
        let stored = StoredCredentials {
            credentials: items.iter().map(StoredCredential::from).collect(),
        };
        let json = serde_json::to_string_pretty(&stored)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            let mut builder = fs::DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                builder.mode(0o700);
            }
            builder
                .create(parent)
                .map_err(|e| AccessError::Store(format!("Failed to create store directory: {e}")))?;
        }

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("tmp");
        Self::write_private(&temp_path, json.as_bytes())?;
        fs::rename(&temp_path, &self.path)?;

        debug!("Saved credentials");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            debug!(path = %self.path.display(), "Removed credential store");
        }
        Ok(())
    }
}

/// Keeps headers in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<Vec<HeaderItem>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> Result<Vec<HeaderItem>> {
        Ok(self.items.lock().clone())
    }

    fn save(&self, items: &[HeaderItem]) -> Result<()> {
        *self.items.lock() = items.to_vec();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.items.lock().clear();
        Ok(())
    }
}
