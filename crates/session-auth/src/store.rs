//! File-backed credential source
//!
//! Restores the token bundle from a JSON file at startup and persists every
//! update. All writes use atomic temp-file + rename to prevent corruption on
//! crash. A tokio Mutex serializes concurrent persists (refresh-time updates
//! racing a login); the in-memory bundle lives behind a std `RwLock` so
//! `tokens()` never waits on disk I/O.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{PoisonError, RwLock};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::credentials::{CredentialSource, SessionHook, TokenBundle};
use crate::error::{Error, Result};

/// Credential source persisted to a JSON file (`{"access": ..., "refresh": ...}`).
pub struct FileCredentialStore {
    path: PathBuf,
    state: RwLock<TokenBundle>,
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Restore tokens from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (cold start, not logged in).
    pub async fn load(path: PathBuf) -> Result<Self> {
        let tokens = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let tokens: TokenBundle = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            info!(
                path = %path.display(),
                has_access = tokens.access.is_some(),
                has_refresh = tokens.refresh.is_some(),
                "restored credentials"
            );
            tokens
        } else {
            info!(path = %path.display(), "credential file not found, starting unauthenticated");
            let tokens = TokenBundle::default();
            write_atomic(&path, &tokens).await?;
            tokens
        };

        Ok(Self {
            path,
            state: RwLock::new(tokens),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.tokens();
        write_atomic(&self.path, &snapshot).await
    }
}

impl CredentialSource for FileCredentialStore {
    fn tokens(&self) -> TokenBundle {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The in-memory merge happens before the write, so a failed persist
    /// still leaves the new tokens usable for this process.
    fn update_tokens(
        &self,
        partial: TokenBundle,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(partial);
        Box::pin(async move {
            self.persist().await?;
            debug!(path = %self.path.display(), "updated tokens");
            Ok(())
        })
    }

    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = TokenBundle::default();
        Box::pin(async move {
            self.persist().await?;
            info!(path = %self.path.display(), "cleared persisted tokens");
            Ok(())
        })
    }
}

impl SessionHook for FileCredentialStore {
    fn on_logout(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if let Err(e) = self.clear().await {
                warn!(path = %self.path.display(), error = %e, "failed to clear tokens on logout");
            }
        })
    }
}

/// Write the token bundle to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains bearer tokens.
async fn write_atomic(path: &Path, tokens: &TokenBundle) -> Result<()> {
    let json = serde_json::to_string_pretty(tokens)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        Some(_) => Path::new("."),
        None => return Err(Error::Io("credential path has no parent directory".into())),
    };

    let tmp_path = dir.join(format!(".tokens.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn roundtrip_update_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let store = FileCredentialStore::load(path.clone()).await.unwrap();
        store
            .update_tokens(TokenBundle::new("at_1", "rt_1"))
            .await
            .unwrap();

        let restored = FileCredentialStore::load(path).await.unwrap();
        assert_eq!(restored.tokens(), TokenBundle::new("at_1", "rt_1"));
    }

    #[tokio::test]
    async fn cold_start_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        assert!(!path.exists());
        let store = FileCredentialStore::load(path.clone()).await.unwrap();
        assert!(store.tokens().is_empty());
        assert!(path.exists());

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: TokenBundle = serde_json::from_str(&contents).unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn partial_update_persists_merged_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let store = FileCredentialStore::load(path.clone()).await.unwrap();
        store
            .update_tokens(TokenBundle::new("at_1", "rt_1"))
            .await
            .unwrap();
        store
            .update_tokens(TokenBundle::access_only("at_2"))
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let on_disk: TokenBundle = serde_json::from_str(&contents).unwrap();
        assert_eq!(on_disk, TokenBundle::new("at_2", "rt_1"));
    }

    #[tokio::test]
    async fn logout_hook_clears_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, r#"{"access":"at_1","refresh":"rt_1"}"#).unwrap();

        let store = FileCredentialStore::load(path.clone()).await.unwrap();
        store.on_logout().await;

        assert!(store.tokens().is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "{}");
    }

    #[tokio::test]
    async fn clear_empties_memory_and_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let store = FileCredentialStore::load(path.clone()).await.unwrap();
        store
            .update_tokens(TokenBundle::new("at_1", "rt_1"))
            .await
            .unwrap();
        store.clear().await.unwrap();

        assert!(store.tokens().is_empty());
        let restored = FileCredentialStore::load(path).await.unwrap();
        assert!(restored.tokens().is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        tokio::fs::write(&path, "not json").await.unwrap();

        let result = FileCredentialStore::load(path).await;
        assert!(matches!(result, Err(Error::CredentialParse(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");

        let store = FileCredentialStore::load(path.clone()).await.unwrap();
        store
            .update_tokens(TokenBundle::new("at_1", "rt_1"))
            .await
            .unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "credential file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn concurrent_updates_dont_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = Arc::new(FileCredentialStore::load(path.clone()).await.unwrap());

        let mut handles = vec![];
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update_tokens(TokenBundle::access_only(format!("at_{i}")))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let on_disk: TokenBundle = serde_json::from_str(&contents).unwrap();
        assert!(on_disk.access.is_some());
        assert_eq!(on_disk, store.tokens());
    }
}
