//! Session persistence
//!
//! Holds the single session (credential hash, token pair, expiration) in
//! memory behind a tokio Mutex and mirrors it to a JSON file. All writes use
//! atomic temp-file + rename, so a crash never leaves a half-written session
//! and a concurrent reader never observes a partial update.
//!
//! The store is bound to a credential hash when opened. A persisted session
//! created under a different hash is cleared before anything else can read it.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::token::TokenPair;

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A token pair together with its absolute expiration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredToken {
    pub pair: TokenPair,
    /// Expiration as unix timestamp in milliseconds
    pub expires_at: u64,
}

impl StoredToken {
    /// Stamp a freshly issued pair with `now + expires_in`.
    pub fn issued_now(pair: TokenPair) -> Self {
        let expires_at = now_millis().saturating_add(pair.expires_in.saturating_mul(1000));
        Self { pair, expires_at }
    }

    /// Expired once the expiration instant is reached.
    pub fn is_expired_at(&self, now_millis: u64) -> bool {
        self.expires_at <= now_millis
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }
}

/// The persisted session. A token is either stored with its expiration or
/// not at all.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    pub credential_hash: String,
    pub token: Option<StoredToken>,
}

impl SessionState {
    pub fn empty(credential_hash: impl Into<String>) -> Self {
        Self {
            credential_hash: credential_hash.into(),
            token: None,
        }
    }

    /// Logged in iff both access and refresh tokens are present.
    pub fn is_logged_in(&self) -> bool {
        self.token.as_ref().is_some_and(|t| t.pair.is_complete())
    }
}

/// On-disk layout: three named fields.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedSession {
    #[serde(default)]
    credential_hash: Option<String>,
    #[serde(default)]
    token_response: Option<TokenPair>,
    #[serde(default)]
    token_expiration: Option<u64>,
}

impl PersistedSession {
    fn from_state(state: &SessionState) -> Self {
        Self {
            credential_hash: Some(state.credential_hash.clone()),
            token_response: state.token.as_ref().map(|t| t.pair.clone()),
            token_expiration: state.token.as_ref().map(|t| t.expires_at),
        }
    }

    fn into_state(self) -> SessionState {
        let token = match (self.token_response, self.token_expiration) {
            (Some(pair), Some(expires_at)) => Some(StoredToken { pair, expires_at }),
            (None, None) => None,
            _ => {
                warn!("persisted session has token without expiration (or vice versa), discarding");
                None
            }
        };
        SessionState {
            credential_hash: self.credential_hash.unwrap_or_default(),
            token,
        }
    }
}

/// Thread-safe session store, optionally backed by a file.
pub struct TokenStore {
    path: Option<PathBuf>,
    state: Mutex<SessionState>,
}

impl TokenStore {
    /// Open the file-backed store bound to `credential_hash`.
    ///
    /// A missing file is a cold start (empty session, file created). If the
    /// persisted hash differs, the stored token is cleared and the new hash
    /// recorded before the store is returned.
    pub async fn open(path: PathBuf, credential_hash: &str) -> Result<Self> {
        let persisted = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Storage(format!("reading session file: {e}")))?;
            match serde_json::from_str::<PersistedSession>(&contents) {
                Ok(p) => p.into_state(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "session file unreadable, starting empty");
                    SessionState::default()
                }
            }
        } else {
            info!(path = %path.display(), "session file not found, starting with empty session");
            SessionState::default()
        };

        let state = bind_hash(persisted, credential_hash);
        write_atomic(&path, &state).await?;

        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// Store that lives only as long as the process.
    pub fn in_memory(credential_hash: &str) -> Self {
        Self {
            path: None,
            state: Mutex::new(SessionState::empty(credential_hash)),
        }
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot of the current session.
    pub async fn read(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    /// Replace the whole session and persist it.
    ///
    /// The in-memory copy is updated even if persisting fails, so the running
    /// process keeps the newest token; the error is returned to the caller.
    pub async fn write(&self, new_state: SessionState) -> Result<()> {
        let mut state = self.state.lock().await;
        *state = new_state;
        debug!(logged_in = state.is_logged_in(), "session updated");
        self.persist(&state).await
    }

    /// Drop the token and expiration. The credential hash is kept.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.token.take().is_some() {
            debug!("session cleared");
        }
        self.persist(&state).await
    }

    async fn persist(&self, state: &SessionState) -> Result<()> {
        match &self.path {
            Some(path) => write_atomic(path, state).await,
            None => Ok(()),
        }
    }
}

/// Clear the token when it was stored under another credential hash.
fn bind_hash(mut state: SessionState, credential_hash: &str) -> SessionState {
    if state.credential_hash != credential_hash {
        if state.token.is_some() {
            info!("credential hash changed, discarding stored session");
        }
        state.token = None;
        state.credential_hash = credential_hash.to_owned();
    }
    state
}

/// Temp file next to `path`, named after it so stores sharing a directory
/// never write to the same temp file.
fn temp_path(path: &Path) -> PathBuf {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "session".to_owned());
    dir.join(format!(".{file_name}.tmp.{}", std::process::id()))
}

/// Write the session to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains OAuth tokens.
async fn write_atomic(path: &Path, state: &SessionState) -> Result<()> {
    let json = serde_json::to_string_pretty(&PersistedSession::from_state(state))
        .map_err(|e| Error::Storage(format!("serializing session: {e}")))?;

    let tmp_path = temp_path(path);

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Storage(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Storage(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Storage(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(access: &str, refresh: &str, expires_at: u64) -> StoredToken {
        StoredToken {
            pair: TokenPair {
                access_token: access.into(),
                refresh_token: refresh.into(),
                expires_in: 3600,
            },
            expires_at,
        }
    }

    #[test]
    fn temp_path_is_per_target_file() {
        let a = temp_path(Path::new("/var/lib/app/a.json"));
        let b = temp_path(Path::new("/var/lib/app/b.json"));
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(Path::new("/var/lib/app")));
        assert!(
            a.file_name().unwrap().to_string_lossy().starts_with(".a.json.tmp."),
            "got: {}",
            a.display()
        );
        assert_eq!(temp_path(Path::new("session.json")).parent(), Some(Path::new(".")));
    }

    #[tokio::test]
    async fn stores_sharing_a_directory_keep_their_own_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let first = TokenStore::open(dir.path().join("first.json"), "h1").await.unwrap();
        let second = TokenStore::open(dir.path().join("second.json"), "h2").await.unwrap();

        let (w1, w2) = tokio::join!(
            first.write(SessionState {
                credential_hash: "h1".into(),
                token: Some(stored("A1", "R1", 1_000)),
            }),
            second.write(SessionState {
                credential_hash: "h2".into(),
                token: Some(stored("A2", "R2", 2_000)),
            }),
        );
        w1.unwrap();
        w2.unwrap();

        let reopened_first = TokenStore::open(dir.path().join("first.json"), "h1").await.unwrap();
        let reopened_second = TokenStore::open(dir.path().join("second.json"), "h2").await.unwrap();
        assert_eq!(
            reopened_first.read().await.token.unwrap().pair.access_token,
            "A1"
        );
        assert_eq!(
            reopened_second.read().await.token.unwrap().pair.access_token,
            "A2"
        );
    }

    #[tokio::test]
    async fn write_then_read_roundtrips_all_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = TokenStore::open(path.clone(), "h1").await.unwrap();
        let state = SessionState {
            credential_hash: "h1".into(),
            token: Some(stored("A", "R", 1_735_500_000_000)),
        };
        store.write(state.clone()).await.unwrap();
        assert_eq!(store.read().await, state);

        // And across a reopen
        let reopened = TokenStore::open(path, "h1").await.unwrap();
        assert_eq!(reopened.read().await, state);
    }

    #[tokio::test]
    async fn different_hash_clears_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = TokenStore::open(path.clone(), "h1").await.unwrap();
        store
            .write(SessionState {
                credential_hash: "h1".into(),
                token: Some(stored("A", "R", 1_735_500_000_000)),
            })
            .await
            .unwrap();
        drop(store);

        let rebound = TokenStore::open(path.clone(), "h2").await.unwrap();
        let state = rebound.read().await;
        assert_eq!(state.credential_hash, "h2");
        assert!(state.token.is_none());

        // The clear was persisted, not only applied in memory
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(!contents.contains("\"A\""), "stale token on disk: {contents}");
    }

    #[tokio::test]
    async fn cold_start_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        assert!(!path.exists());
        let store = TokenStore::open(path.clone(), "h1").await.unwrap();
        assert!(path.exists());
        assert_eq!(store.read().await, SessionState::empty("h1"));
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn persisted_layout_has_three_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = TokenStore::open(path.clone(), "h1").await.unwrap();
        store
            .write(SessionState {
                credential_hash: "h1".into(),
                token: Some(stored("A", "R", 42)),
            })
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value["credential_hash"], "h1");
        assert_eq!(value["token_response"]["access_token"], "A");
        assert_eq!(value["token_response"]["refresh_token"], "R");
        assert_eq!(value["token_response"]["expires_in"], 3600);
        assert_eq!(value["token_expiration"], 42);
    }

    #[tokio::test]
    async fn token_without_expiration_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let json = r#"{
            "credential_hash": "h1",
            "token_response": {"access_token": "A", "refresh_token": "R", "expires_in": 60}
        }"#;
        tokio::fs::write(&path, json).await.unwrap();

        let store = TokenStore::open(path, "h1").await.unwrap();
        assert!(store.read().await.token.is_none());
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, "{{{ not json").await.unwrap();

        let store = TokenStore::open(path, "h1").await.unwrap();
        assert_eq!(store.read().await, SessionState::empty("h1"));
    }

    #[tokio::test]
    async fn clear_is_idempotent_and_keeps_hash() {
        let store = TokenStore::in_memory("h1");
        store
            .write(SessionState {
                credential_hash: "h1".into(),
                token: Some(stored("A", "R", 42)),
            })
            .await
            .unwrap();

        store.clear().await.unwrap();
        assert_eq!(store.read().await, SessionState::empty("h1"));
        store.clear().await.unwrap();
        assert_eq!(store.read().await, SessionState::empty("h1"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let _store = TokenStore::open(path.clone(), "h1").await.unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "session file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn concurrent_readers_never_see_partial_state() {
        let store = std::sync::Arc::new(TokenStore::in_memory("h1"));
        let mut handles = vec![];
        for i in 0..10u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .write(SessionState {
                        credential_hash: "h1".into(),
                        token: Some(stored(&format!("A{i}"), &format!("R{i}"), i)),
                    })
                    .await
                    .unwrap();
                let seen = store.read().await;
                let token = seen.token.expect("token present after write");
                // Access, refresh, and expiration always come from the same write
                let n = token.expires_at;
                assert_eq!(token.pair.access_token, format!("A{n}"));
                assert_eq!(token.pair.refresh_token, format!("R{n}"));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }

    #[test]
    fn expiration_boundary_is_inclusive() {
        let token = stored("A", "R", 1_000);
        assert!(!token.is_expired_at(999));
        assert!(token.is_expired_at(1_000));
        assert!(token.is_expired_at(1_001));
    }

    #[test]
    fn issued_now_with_zero_lifetime_is_already_expired() {
        let token = StoredToken::issued_now(TokenPair {
            access_token: "A".into(),
            refresh_token: "R".into(),
            expires_in: 0,
        });
        assert!(token.is_expired());
    }

    #[test]
    fn logged_in_requires_both_tokens() {
        let mut state = SessionState {
            credential_hash: "h".into(),
            token: Some(stored("A", "R", 1)),
        };
        assert!(state.is_logged_in());
        state.token = Some(stored("A", "", 1));
        assert!(!state.is_logged_in());
        state.token = None;
        assert!(!state.is_logged_in());
    }
}
