//! Process-local registry of artifacts awaiting gated download
//!
//! Maps an opaque artifact id to the file on disk, its owner and its creation
//! time. Entries older than `max_age` are treated as gone even before the
//! sweeper removes them. State lives in memory only, so a restart forgets
//! every pending download.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::GateError;

/// One registered artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactEntry {
    pub location: PathBuf,
    /// Principal id of the owner
    pub owner: String,
    /// Name offered to the client on download
    pub filename: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ArtifactRegistry {
    entries: RwLock<HashMap<String, ArtifactEntry>>,
    max_age: Duration,
}

impl ArtifactRegistry {
    pub fn new(max_age: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_age,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Register an artifact, replacing any entry with the same id. A replaced
    /// entry's file is deleted unless it sits at the new location.
    pub async fn register(
        &self,
        artifact_id: &str,
        location: PathBuf,
        owner: &str,
        filename: &str,
    ) {
        self.register_at(artifact_id, location, owner, filename, Utc::now())
            .await
    }

    pub async fn register_at(
        &self,
        artifact_id: &str,
        location: PathBuf,
        owner: &str,
        filename: &str,
        now: DateTime<Utc>,
    ) {
        let entry = ArtifactEntry {
            location,
            owner: owner.to_string(),
            filename: filename.to_string(),
            created_at: now,
        };
        debug!(
            "Registered artifact {} at {}",
            artifact_id,
            entry.location.display()
        );
        let replaced = self
            .entries
            .write()
            .await
            .insert(artifact_id.to_string(), entry.clone());
        if let Some(old) = replaced {
            if old.location != entry.location {
                delete_file(&old.location).await;
            }
        }
    }

    /// Look up an artifact on behalf of `requester`
    pub async fn resolve(
        &self,
        artifact_id: &str,
        requester: &str,
    ) -> Result<ArtifactEntry, GateError> {
        self.resolve_at(artifact_id, requester, Utc::now()).await
    }

    /// Checks, in order: registered, younger than `max_age`, file still on
    /// disk, owned by `requester`. Stale entries are dropped on the way.
    pub async fn resolve_at(
        &self,
        artifact_id: &str,
        requester: &str,
        now: DateTime<Utc>,
    ) -> Result<ArtifactEntry, GateError> {
        let entry = self
            .entries
            .read()
            .await
            .get(artifact_id)
            .cloned()
            .ok_or_else(|| GateError::NotFound(artifact_id.to_string()))?;

        if now - entry.created_at >= self.max_age {
            debug!("Artifact {} is past its maximum age", artifact_id);
            self.remove_if_unchanged(artifact_id, &entry).await;
            delete_file(&entry.location).await;
            return Err(GateError::NotFound(artifact_id.to_string()));
        }

        if !file_exists(&entry.location).await {
            warn!(
                "Artifact {} lost its file {}",
                artifact_id,
                entry.location.display()
            );
            self.remove_if_unchanged(artifact_id, &entry).await;
            return Err(GateError::NotFound(artifact_id.to_string()));
        }

        if entry.owner != requester {
            return Err(GateError::Forbidden(artifact_id.to_string()));
        }

        Ok(entry)
    }

    /// Forget an artifact and delete its file
    pub async fn release(&self, artifact_id: &str) -> Option<ArtifactEntry> {
        let entry = self.entries.write().await.remove(artifact_id)?;
        delete_file(&entry.location).await;
        debug!("Released artifact {}", artifact_id);
        Some(entry)
    }

    /// Remove every entry older than `max_age`, deleting its file
    pub async fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now()).await
    }

    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<ArtifactEntry> = {
            let mut entries = self.entries.write().await;
            let ids: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| now - entry.created_at >= self.max_age)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| entries.remove(id)).collect()
        };

        for entry in &expired {
            delete_file(&entry.location).await;
        }
        if !expired.is_empty() {
            info!("Swept {} expired artifacts", expired.len());
        }
        expired.len()
    }

    /// Run [`Self::sweep_expired`] every `interval` until the task is aborted
    pub fn spawn_sweeper(self: Arc<Self>, interval: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep_expired().await;
            }
        })
    }

    /// Drop every entry and delete every file. Used at shutdown.
    pub async fn clear(&self) -> usize {
        let drained: Vec<ArtifactEntry> = self
            .entries
            .write()
            .await
            .drain()
            .map(|(_, e)| e)
            .collect();
        for entry in &drained {
            delete_file(&entry.location).await;
        }
        drained.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Remove `artifact_id` unless it was re-registered since `seen` was read
    async fn remove_if_unchanged(&self, artifact_id: &str, seen: &ArtifactEntry) {
        let mut entries = self.entries.write().await;
        if entries.get(artifact_id) == Some(seen) {
            entries.remove(artifact_id);
        }
    }
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn delete_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn artifact(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"docx bytes").unwrap();
        path
    }

    fn registry() -> ArtifactRegistry {
        ArtifactRegistry::new(Duration::hours(2))
    }

    #[tokio::test]
    async fn test_register_then_resolve() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let path = artifact(&dir, "a.docx");

        registry.register("a", path.clone(), "owner-1", "report.docx").await;
        let entry = registry.resolve("a", "owner-1").await.unwrap();

        assert_eq!(entry.location, path);
        assert_eq!(entry.filename, "report.docx");
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        assert_eq!(
            registry().resolve("missing", "owner-1").await.unwrap_err(),
            GateError::NotFound("missing".to_string())
        );
    }

    #[tokio::test]
    async fn test_other_owner_is_forbidden() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        registry
            .register("a", artifact(&dir, "a.docx"), "owner-1", "a.docx")
            .await;

        assert_eq!(
            registry.resolve("a", "owner-2").await.unwrap_err(),
            GateError::Forbidden("a".to_string())
        );
        // The owner can still fetch it
        assert!(registry.resolve("a", "owner-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_file_removes_entry() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let path = artifact(&dir, "a.docx");
        registry.register("a", path.clone(), "owner-1", "a.docx").await;

        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            registry.resolve("a", "owner-1").await,
            Err(GateError::NotFound(_))
        ));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_entry_past_max_age_is_not_found_and_deleted() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let path = artifact(&dir, "a.docx");
        let created = Utc::now();
        registry
            .register_at("a", path.clone(), "owner-1", "a.docx", created)
            .await;

        assert!(registry
            .resolve_at("a", "owner-1", created + Duration::hours(1))
            .await
            .is_ok());
        assert!(matches!(
            registry
                .resolve_at("a", "owner-1", created + Duration::hours(2))
                .await,
            Err(GateError::NotFound(_))
        ));
        assert!(registry.is_empty().await);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_register_twice_overwrites() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        registry
            .register("a", artifact(&dir, "first.docx"), "owner-1", "first.docx")
            .await;
        registry
            .register("a", artifact(&dir, "second.docx"), "owner-2", "second.docx")
            .await;

        assert_eq!(registry.len().await, 1);
        let entry = registry.resolve("a", "owner-2").await.unwrap();
        assert_eq!(entry.filename, "second.docx");
    }

    #[tokio::test]
    async fn test_register_over_existing_deletes_replaced_file() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let first = artifact(&dir, "first.docx");
        let second = artifact(&dir, "second.docx");

        registry.register("a", first.clone(), "owner-1", "first.docx").await;
        registry.register("a", second.clone(), "owner-1", "second.docx").await;

        assert!(!first.exists());
        assert!(second.exists());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_register_same_location_keeps_file() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let path = artifact(&dir, "a.docx");

        registry.register("a", path.clone(), "owner-1", "a.docx").await;
        registry.register("a", path.clone(), "owner-1", "renamed.docx").await;

        assert!(path.exists());
        let entry = registry.resolve("a", "owner-1").await.unwrap();
        assert_eq!(entry.filename, "renamed.docx");
    }

    #[tokio::test]
    async fn test_release_deletes_file() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let path = artifact(&dir, "a.docx");
        registry.register("a", path.clone(), "owner-1", "a.docx").await;

        assert!(registry.release("a").await.is_some());
        assert!(!path.exists());
        assert!(registry.release("a").await.is_none());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let now = Utc::now();
        let old = artifact(&dir, "old.docx");
        let fresh = artifact(&dir, "fresh.docx");
        registry
            .register_at("old", old.clone(), "o", "old.docx", now - Duration::hours(3))
            .await;
        registry
            .register_at("fresh", fresh.clone(), "o", "fresh.docx", now)
            .await;

        assert_eq!(registry.sweep_expired_at(now).await, 1);
        assert_eq!(registry.len().await, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[tokio::test]
    async fn test_clear_deletes_everything() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let a = artifact(&dir, "a.docx");
        let b = artifact(&dir, "b.docx");
        registry.register("a", a.clone(), "o", "a.docx").await;
        registry.register("b", b.clone(), "o", "b.docx").await;

        assert_eq!(registry.clear().await, 2);
        assert!(registry.is_empty().await);
        assert!(!a.exists() && !b.exists());
    }

    #[tokio::test]
    async fn test_sweeper_task_runs_on_interval() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(ArtifactRegistry::new(Duration::zero()));
        registry
            .register("a", artifact(&dir, "a.docx"), "o", "a.docx")
            .await;

        let handle = registry
            .clone()
            .spawn_sweeper(std::time::Duration::from_millis(20));
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        assert!(registry.is_empty().await);
        handle.abort();
    }

    #[tokio::test]
    async fn test_concurrent_resolves_do_not_block() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(registry());
        registry
            .register("a", artifact(&dir, "a.docx"), "o", "a.docx")
            .await;

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.resolve("a", "o").await })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
    }
}
