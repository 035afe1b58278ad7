// Persistent session storage
//
// The token and the user profile live in one JSON document under fixed keys
// (`access_token`, `user`). Writing them as a single document is what keeps
// them paired: a save replaces both, a clear removes both, and a document
// missing either half loads as "no session".
//
// Example file (~/.config/ecoreceipt/session.json):
//   {"access_token": "eyJhbGciOi...", "user": {"id": "9f1c...", "name": "Ada"}}

use crate::models::User;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Errors from reading or writing the session document
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("session document at {path} is not valid: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A token and the profile it belongs to, as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    pub user: User,
}

/// On-disk shape. Both halves are optional so a half-written or hand-edited
/// document reads as "absent" instead of an error.
#[derive(Debug, Deserialize)]
struct SessionDocument {
    access_token: Option<String>,
    user: Option<User>,
}

impl SessionDocument {
    fn into_session(self) -> Option<StoredSession> {
        match (self.access_token, self.user) {
            (Some(access_token), Some(user)) if !access_token.is_empty() => Some(StoredSession {
                access_token,
                user,
            }),
            _ => None,
        }
    }
}

/// Durable key-value storage for the auth token and user profile.
///
/// Implementations must save and clear token and user together. No expiry is
/// evaluated here; only the server decides whether a token is still valid.
pub trait SessionStore: Send + Sync {
    fn save(&self, token: &str, user: &User) -> Result<(), StoreError>;

    fn load(&self) -> Result<Option<StoredSession>, StoreError>;

    fn clear(&self) -> Result<(), StoreError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// File-backed store
// ─────────────────────────────────────────────────────────────────────────────

/// Session store backed by a single JSON file
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location: ~/.config/ecoreceipt/session.json
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("ecoreceipt").join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }
}

impl SessionStore for FileSessionStore {
    fn save(&self, token: &str, user: &User) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let bytes = serde_json::to_vec_pretty(&StoredSession {
            access_token: token.to_string(),
            user: user.clone(),
        })?;

        // Write then rename so a crash never leaves a token without its user
        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, bytes).map_err(|e| self.io_err(e))?;
        restrict_permissions(&tmp_path);

        match fs::rename(&tmp_path, &self.path) {
            Ok(()) => {}
            Err(rename_err) => {
                if self.path.exists() {
                    fs::remove_file(&self.path).map_err(|e| self.io_err(e))?;
                    fs::rename(&tmp_path, &self.path).map_err(|e| self.io_err(e))?;
                } else {
                    return Err(self.io_err(rename_err));
                }
            }
        }

        tracing::debug!("Session saved to {}", self.path.display());
        Ok(())
    }

    fn load(&self) -> Result<Option<StoredSession>, StoreError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };

        let document: SessionDocument =
            serde_json::from_slice(&data).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        Ok(document.into_session())
    }

    fn clear(&self) -> Result<(), StoreError> {
        for path in [&self.path, &self.tmp_path()] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(self.io_err(e)),
            }
        }
        tracing::debug!("Session cleared at {}", self.path.display());
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Could not restrict permissions on {}: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────────────────────────

/// Process-local session store, for embedding and tests
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<StoredSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with a session, as if saved by an earlier run
    pub fn with_session(token: impl Into<String>, user: User) -> Self {
        Self {
            session: Mutex::new(Some(StoredSession {
                access_token: token.into(),
                user,
            })),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<StoredSession>> {
        // A poisoned lock still holds a consistent Option
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&self, token: &str, user: &User) -> Result<(), StoreError> {
        *self.slot() = Some(StoredSession {
            access_token: token.to_string(),
            user: user.clone(),
        });
        Ok(())
    }

    fn load(&self) -> Result<Option<StoredSession>, StoreError> {
        Ok(self.slot().clone())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.slot() = None;
        Ok(())
    }
}
