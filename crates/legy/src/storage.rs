// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable key/value session store.
//!
//! Two implementations: in-memory (ephemeral) and file-backed JSON with
//! atomic write-tmp-then-rename. The store is the sole source of truth for
//! tokens and per-chat cursors across process restarts; multi-key mutations
//! go through [`SessionStore::set_many`] so a cursor pair can never tear.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};

/// Well-known store keys.
pub mod keys {
    pub const AUTH_TOKEN: &str = "authToken";
    pub const REFRESH_TOKEN: &str = "refreshToken";
    pub const TOKEN_EXPIRY_AT: &str = "tokenExpiryAt";
    pub const MID: &str = "mid";
    pub const QR_CERTIFICATE: &str = "qrCertificate";

    pub fn email_cert(account: &str) -> String {
        format!("cert:{account}")
    }

    pub fn square_sync(chat_mid: &str) -> String {
        format!("squareSync:{chat_mid}")
    }

    pub fn square_cont(chat_mid: &str) -> String {
        format!("squareCont:{chat_mid}")
    }
}

/// A key/value mutation: `None` removes the key.
pub type Mutation = (String, Option<String>);

/// Durable string key/value storage.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_many(&[(key.to_owned(), Some(value.to_owned()))])
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.set_many(&[(key.to_owned(), None)])
    }

    /// Apply all mutations as one durable write.
    fn set_many(&self, mutations: &[Mutation]) -> Result<()>;

    fn clear(&self) -> Result<()>;

    /// Snapshot of everything stored, for diagnostics and tests.
    fn snapshot(&self) -> BTreeMap<String, String>;
}

// -- In-memory ----------------------------------------------------------------

/// Ephemeral store; everything is lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        match self.data.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set_many(&self, mutations: &[Mutation]) -> Result<()> {
        let mut data = self.lock();
        for (key, value) in mutations {
            match value {
                Some(v) => {
                    data.insert(key.clone(), v.clone());
                }
                None => {
                    data.remove(key);
                }
            }
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.lock().clear();
        Ok(())
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        self.lock().clone()
    }
}

// -- File-backed --------------------------------------------------------------

/// JSON file store. The whole file is rewritten atomically on each
/// mutation (write to `<path>.tmp`, then rename over).
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    data: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| Error::Config(format!("corrupt session store {}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::Config(format!("open {}: {e}", path.display()))),
        };
        Ok(Self { path, data: Mutex::new(data) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        match self.data.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn persist(&self, data: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_string_pretty(data)
            .map_err(|e| Error::Config(format!("serialize session store: {e}")))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| Error::Config(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| Error::Config(format!("rename {}: {e}", self.path.display())))?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set_many(&self, mutations: &[Mutation]) -> Result<()> {
        let mut data = self.lock();
        for (key, value) in mutations {
            match value {
                Some(v) => {
                    data.insert(key.clone(), v.clone());
                }
                None => {
                    data.remove(key);
                }
            }
        }
        self.persist(&data)
    }

    fn clear(&self) -> Result<()> {
        let mut data = self.lock();
        data.clear();
        self.persist(&data)
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        self.lock().clone()
    }
}

// -- Typed view ---------------------------------------------------------------

/// A per-chat cursor pair. `continuation` is non-null only while a backlog
/// is being drained; once null, the sync token alone suffices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatCursor {
    pub sync_token: Option<String>,
    pub continuation: Option<String>,
}

/// Typed accessors over the raw store: the session bundle plus cursors.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn SessionStore>,
}

impl Session {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn auth_token(&self) -> Option<String> {
        self.store.get(keys::AUTH_TOKEN)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.store.get(keys::REFRESH_TOKEN)
    }

    pub fn token_expiry_at(&self) -> Option<i64> {
        self.store.get(keys::TOKEN_EXPIRY_AT).and_then(|v| v.parse().ok())
    }

    pub fn mid(&self) -> Option<String> {
        self.store.get(keys::MID)
    }

    pub fn qr_certificate(&self) -> Option<String> {
        self.store.get(keys::QR_CERTIFICATE)
    }

    pub fn email_cert(&self, account: &str) -> Option<String> {
        self.store.get(&keys::email_cert(account))
    }

    pub fn set_email_cert(&self, account: &str, cert: &str) -> Result<()> {
        self.store.set(&keys::email_cert(account), cert)
    }

    /// A stored token is usable when it exists and either has no known
    /// expiry or has not yet reached it.
    pub fn token_valid(&self, now_unix: i64) -> bool {
        if self.auth_token().is_none() {
            return false;
        }
        match self.token_expiry_at() {
            Some(expiry) => now_unix < expiry,
            None => true,
        }
    }

    /// Persist a complete login result in one durable write.
    pub fn save_login(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        expiry_at: Option<i64>,
        mid: Option<&str>,
        qr_certificate: Option<&str>,
    ) -> Result<()> {
        let mut mutations: Vec<Mutation> =
            vec![(keys::AUTH_TOKEN.to_owned(), Some(access_token.to_owned()))];
        if let Some(rt) = refresh_token {
            mutations.push((keys::REFRESH_TOKEN.to_owned(), Some(rt.to_owned())));
        }
        if let Some(exp) = expiry_at {
            mutations.push((keys::TOKEN_EXPIRY_AT.to_owned(), Some(exp.to_string())));
        }
        if let Some(mid) = mid {
            mutations.push((keys::MID.to_owned(), Some(mid.to_owned())));
        }
        if let Some(cert) = qr_certificate {
            mutations.push((keys::QR_CERTIFICATE.to_owned(), Some(cert.to_owned())));
        }
        self.store.set_many(&mutations)
    }

    pub fn set_auth_token(&self, token: &str) -> Result<()> {
        self.store.set(keys::AUTH_TOKEN, token)
    }

    pub fn set_mid(&self, mid: &str) -> Result<()> {
        self.store.set(keys::MID, mid)
    }

    pub fn cursor(&self, chat_mid: &str) -> ChatCursor {
        ChatCursor {
            sync_token: self.store.get(&keys::square_sync(chat_mid)),
            continuation: self.store.get(&keys::square_cont(chat_mid)),
        }
    }

    /// Persist a cursor pair atomically. An absent continuation clears any
    /// stored one in the same write, so the pair can never tear.
    pub fn set_cursor(&self, chat_mid: &str, sync_token: &str, continuation: Option<&str>) -> Result<()> {
        self.store.set_many(&[
            (keys::square_sync(chat_mid), Some(sync_token.to_owned())),
            (keys::square_cont(chat_mid), continuation.map(str::to_owned)),
        ])
    }

    /// Drop everything stored (logout).
    pub fn clear(&self) -> Result<()> {
        self.store.clear()
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
