//! Per-user storage of sealed tokens.
//!
//! The file backend keeps the `{"<user id>": {"token": "<blob>"}}` layout of
//! the bot's `tokens.json` so existing files keep working.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ghrun_core::{current_unix_timestamp, write_text_atomic};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::cipher::EncryptedCredential;

#[derive(Debug, thiserror::Error)]
/// Failures raised by token store backends.
pub enum StoreError {
    #[error("user id must not be empty")]
    InvalidUserId,
    #[error("failed to read token store {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("token store {path} is corrupt: {message}")]
    Corrupt { path: String, message: String },
    #[error("failed to persist token store {path}: {message}")]
    Persist { path: String, message: String },
    #[error("remote token store request failed{}: {message}", status_suffix(.status))]
    Remote { status: Option<u16>, message: String },
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|status| format!(" with status {status}"))
        .unwrap_or_default()
}

/// Maps a user identity to at most one sealed credential.
///
/// `put` must be durable before it returns and `delete` is idempotent.
/// Operations on different users never affect each other's entries.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Short backend label used in logs.
    fn backend(&self) -> &'static str;

    async fn get(&self, user_id: &str) -> Result<Option<EncryptedCredential>, StoreError>;

    async fn put(&self, user_id: &str, credential: EncryptedCredential) -> Result<(), StoreError>;

    async fn delete(&self, user_id: &str) -> Result<(), StoreError>;
}

pub(crate) fn normalize_user_id(user_id: &str) -> Result<&str, StoreError> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidUserId);
    }
    Ok(trimmed)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct StoredTokenEntry {
    token: EncryptedCredential,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_unix: Option<u64>,
}

type TokenFile = BTreeMap<String, StoredTokenEntry>;

/// JSON-file backend. Mutations are serialized in-process and each one
/// replaces the file atomically.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    write_gate: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_gate: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_entries(&self) -> Result<TokenFile, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(TokenFile::new());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.display().to_string(),
                    source,
                });
            }
        };
        if raw.trim().is_empty() {
            return Ok(TokenFile::new());
        }
        serde_json::from_str::<TokenFile>(&raw).map_err(|error| StoreError::Corrupt {
            path: self.path.display().to_string(),
            message: error.to_string(),
        })
    }

    /// Encodes and atomically replaces the file. The fsync-heavy write runs on
    /// the blocking pool; callers hold `write_gate` across the await.
    async fn save_entries(&self, entries: &TokenFile) -> Result<(), StoreError> {
        let persist_error = |message: String| StoreError::Persist {
            path: self.path.display().to_string(),
            message,
        };
        let mut encoded = serde_json::to_string_pretty(entries)
            .map_err(|error| persist_error(error.to_string()))?;
        encoded.push('\n');
        let path = self.path.clone();
        let join = tokio::task::spawn_blocking(move || write_text_atomic(&path, &encoded));
        join.await
            .map_err(|error| persist_error(format!("token store write task failed: {error}")))?
            .map_err(|error| persist_error(format!("{error:#}")))
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn get(&self, user_id: &str) -> Result<Option<EncryptedCredential>, StoreError> {
        let user_id = normalize_user_id(user_id)?;
        let entries = self.load_entries().await?;
        Ok(entries.get(user_id).map(|entry| entry.token.clone()))
    }

    async fn put(&self, user_id: &str, credential: EncryptedCredential) -> Result<(), StoreError> {
        let user_id = normalize_user_id(user_id)?;
        let _guard = self.write_gate.lock().await;
        let mut entries = self.load_entries().await?;
        entries.insert(
            user_id.to_string(),
            StoredTokenEntry {
                token: credential,
                updated_unix: Some(current_unix_timestamp()),
            },
        );
        tracing::debug!(
            store = %self.path.display(),
            entries = entries.len(),
            "saving token store after upsert"
        );
        self.save_entries(&entries).await
    }

    async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        let user_id = normalize_user_id(user_id)?;
        let _guard = self.write_gate.lock().await;
        let mut entries = self.load_entries().await?;
        if entries.remove(user_id).is_none() {
            return Ok(());
        }
        tracing::debug!(
            store = %self.path.display(),
            entries = entries.len(),
            "saving token store after delete"
        );
        self.save_entries(&entries).await
    }
}

/// Process-local backend; contents are lost on exit.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    entries: RwLock<BTreeMap<String, EncryptedCredential>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, user_id: &str) -> Result<Option<EncryptedCredential>, StoreError> {
        let user_id = normalize_user_id(user_id)?;
        Ok(self.entries.read().await.get(user_id).cloned())
    }

    async fn put(&self, user_id: &str, credential: EncryptedCredential) -> Result<(), StoreError> {
        let user_id = normalize_user_id(user_id)?;
        self.entries
            .write()
            .await
            .insert(user_id.to_string(), credential);
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        let user_id = normalize_user_id(user_id)?;
        self.entries.write().await.remove(user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;
    use tempfile::tempdir;

    use super::*;
    use crate::cipher::CredentialCipher;

    fn blob(value: &str) -> EncryptedCredential {
        EncryptedCredential::from_stored(value)
    }

    #[tokio::test]
    async fn unit_missing_file_reads_as_empty() {
        let temp = tempdir().expect("tempdir");
        let store = FileTokenStore::new(temp.path().join("tokens.json"));
        assert_eq!(store.get("42").await.expect("get"), None);
        store.delete("42").await.expect("delete on missing file is a no-op");
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn functional_put_get_overwrite_delete() {
        let temp = tempdir().expect("tempdir");
        let store = FileTokenStore::new(temp.path().join("tokens.json"));

        store.put("42", blob("first")).await.expect("put");
        assert_eq!(store.get("42").await.expect("get"), Some(blob("first")));

        store.put("42", blob("second")).await.expect("overwrite");
        assert_eq!(store.get("42").await.expect("get"), Some(blob("second")));

        store.delete("42").await.expect("delete");
        assert_eq!(store.get("42").await.expect("get"), None);
        store.delete("42").await.expect("second delete is idempotent");
    }

    #[tokio::test]
    async fn functional_file_layout_matches_tokens_json_shape() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("tokens.json");
        let store = FileTokenStore::new(&path);
        store.put("1001", blob("c2VhbGVk")).await.expect("put");

        let parsed: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(parsed["1001"]["token"].as_str(), Some("c2VhbGVk"));
        assert!(parsed["1001"]["updated_unix"].as_u64().is_some());
    }

    #[tokio::test]
    async fn regression_reads_entries_without_updated_unix() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("tokens.json");
        std::fs::write(&path, r#"{ "7": { "token": "bGVnYWN5" } }"#).expect("seed");
        let store = FileTokenStore::new(&path);
        assert_eq!(store.get("7").await.expect("get"), Some(blob("bGVnYWN5")));
        assert_eq!(store.get(" 7 ").await.expect("trimmed get"), Some(blob("bGVnYWN5")));
    }

    #[tokio::test]
    async fn regression_corrupt_file_is_reported_and_left_untouched() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("tokens.json");
        std::fs::write(&path, "{ not json").expect("seed");
        let store = FileTokenStore::new(&path);

        let error = store.put("1", blob("x")).await.expect_err("corrupt file must fail");
        assert!(matches!(error, StoreError::Corrupt { .. }));
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "{ not json");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn regression_put_persists_from_single_threaded_runtime() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("state").join("tokens.json");
        let store = FileTokenStore::new(&path);
        store.put("5", blob("c2Vhbw==")).await.expect("put");
        assert!(path.exists());
        let reopened = FileTokenStore::new(&path);
        assert_eq!(reopened.get("5").await.expect("get"), Some(blob("c2Vhbw==")));
    }

    #[tokio::test]
    async fn regression_empty_user_id_is_rejected() {
        let store = InMemoryTokenStore::new();
        assert!(matches!(
            store.put("  ", blob("x")).await,
            Err(StoreError::InvalidUserId)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn integration_concurrent_put_and_delete_do_not_cross_users() {
        let temp = tempdir().expect("tempdir");
        let store = Arc::new(FileTokenStore::new(temp.path().join("tokens.json")));
        store.put("user-b", blob("b-token")).await.expect("seed b");

        let mut tasks = Vec::new();
        for round in 0..25 {
            let writer = store.clone();
            tasks.push(tokio::spawn(async move {
                writer
                    .put("user-a", blob(&format!("a-token-{round}")))
                    .await
            }));
            let deleter = store.clone();
            tasks.push(tokio::spawn(async move { deleter.delete("user-b").await }));
            let bystander = store.clone();
            tasks.push(tokio::spawn(async move {
                bystander
                    .put(&format!("user-{round}"), blob("bystander"))
                    .await
            }));
        }
        for task in tasks {
            task.await.expect("join").expect("store op");
        }

        let a = store.get("user-a").await.expect("get a").expect("a present");
        assert!(a.as_str().starts_with("a-token-"));
        assert_eq!(store.get("user-b").await.expect("get b"), None);
        for round in 0..25 {
            assert_eq!(
                store.get(&format!("user-{round}")).await.expect("get"),
                Some(blob("bystander"))
            );
        }
    }

    #[tokio::test]
    async fn functional_sealed_token_survives_store_roundtrip() {
        let temp = tempdir().expect("tempdir");
        let store = FileTokenStore::new(temp.path().join("tokens.json"));
        let cipher = CredentialCipher::from_secret("deployment-secret");

        store
            .put("42", cipher.encrypt("ghp_example123").expect("encrypt"))
            .await
            .expect("put");
        let reopened = FileTokenStore::new(store.path());
        let sealed = reopened.get("42").await.expect("get").expect("present");
        assert_eq!(cipher.decrypt(&sealed).expect("decrypt"), "ghp_example123");
    }

    #[tokio::test]
    async fn unit_in_memory_store_isolates_users() {
        let store = InMemoryTokenStore::new();
        store.put("a", blob("1")).await.expect("put a");
        store.put("b", blob("2")).await.expect("put b");
        store.delete("b").await.expect("delete b");
        store.delete("b").await.expect("delete b again");
        assert_eq!(store.get("a").await.expect("get a"), Some(blob("1")));
        assert_eq!(store.len().await, 1);
    }
}
