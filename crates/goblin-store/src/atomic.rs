//! Atomic JSON document store: one file, one writer, no torn writes.
//!
//! Reads are served from an in-memory copy after the first load. Every
//! mutation is queued to a single writer task, so mutations issued
//! concurrently still commit one after another in submission order.
//! A commit writes a uniquely named temp sibling and renames it over the
//! target; the cached copy only changes once the rename has succeeded.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use goblin_core::{GoblinError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;

/// A versioned JSON document that an [`AtomicFileStore`] can hold.
///
/// A file whose `version` differs from [`Document::VERSION`] is treated
/// like a missing file and replaced by `Default::default()`.
pub trait Document: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static {
    const VERSION: u32;

    fn version(&self) -> u32;
}

type Mutation<D> = Box<dyn FnOnce(D) -> D + Send>;

enum Job<D> {
    Mutate {
        mutation: Mutation<D>,
        reply: Option<oneshot::Sender<Result<D>>>,
    },
    Barrier(oneshot::Sender<()>),
}

struct Shared<D> {
    path: PathBuf,
    cache: RwLock<Option<D>>,
}

impl<D: Document> Shared<D> {
    async fn load(&self) -> D {
        if let Some(doc) = self.cache.read().await.as_ref() {
            return doc.clone();
        }
        let mut cache = self.cache.write().await;
        if let Some(doc) = cache.as_ref() {
            return doc.clone();
        }
        let doc = read_document::<D>(&self.path).await;
        *cache = Some(doc.clone());
        doc
    }

    async fn commit(&self, doc: D) -> Result<D> {
        let bytes = serde_json::to_vec_pretty(&doc)?;
        write_atomic(&self.path, &bytes).await?;
        *self.cache.write().await = Some(doc.clone());
        Ok(doc)
    }
}

/// Durable single-document store with serialized writers.
pub struct AtomicFileStore<D: Document> {
    shared: Arc<Shared<D>>,
    tx: mpsc::UnboundedSender<Job<D>>,
    writer: JoinHandle<()>,
}

impl<D: Document> AtomicFileStore<D> {
    /// Open a store backed by `path`. Nothing is read until the first load.
    ///
    /// Spawns the writer task, so this must run inside a tokio runtime.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let shared = Arc::new(Shared {
            path: path.into(),
            cache: RwLock::new(None),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_writer(shared.clone(), rx));
        Self { shared, tx, writer }
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Last committed document (or the default if nothing valid is on disk).
    pub async fn load(&self) -> D {
        self.shared.load().await
    }

    /// Apply `f` to the latest document and commit the result.
    ///
    /// Resolves once this mutation (and every one queued before it) has
    /// been written. On failure the cached document is left untouched. If
    /// `f` panics the call returns a `Store` error and later mutations
    /// still run.
    pub async fn mutate<F>(&self, f: F) -> Result<D>
    where
        F: FnOnce(D) -> D + Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Job::Mutate {
                mutation: Box::new(f),
                reply: Some(reply),
            })
            .map_err(|_| GoblinError::Closed)?;
        rx.await.map_err(|_| GoblinError::Closed)?
    }

    /// Queue a mutation without waiting for it. Ordering with other
    /// mutations is preserved; a failed commit is logged.
    pub fn mutate_detached<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(D) -> D + Send + 'static,
    {
        self.tx
            .send(Job::Mutate {
                mutation: Box::new(f),
                reply: None,
            })
            .map_err(|_| GoblinError::Closed)
    }

    /// Replace the whole document.
    pub async fn replace(&self, doc: D) -> Result<D> {
        self.mutate(move |_| doc).await
    }

    /// Wait until every mutation queued so far has been committed (or failed).
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Job::Barrier(tx))
            .map_err(|_| GoblinError::Closed)?;
        rx.await.map_err(|_| GoblinError::Closed)
    }

    /// Drain pending writes and stop the writer task.
    pub async fn close(self) {
        let Self { tx, writer, shared } = self;
        drop(tx);
        if let Err(e) = writer.await {
            tracing::warn!("⚠️ Store writer for {} ended abnormally: {e}", shared.path.display());
        }
    }
}

async fn run_writer<D: Document>(shared: Arc<Shared<D>>, mut rx: mpsc::UnboundedReceiver<Job<D>>) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Mutate { mutation, reply } => {
                let current = shared.load().await;
                // A panicking mutation fails its own job; the writer keeps serving.
                let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| mutation(current))) {
                    Ok(next) => shared.commit(next).await,
                    Err(_) => Err(GoblinError::Store(format!(
                        "Mutation of {} panicked; document left unchanged",
                        shared.path.display()
                    ))),
                };
                match reply {
                    Some(reply) => {
                        // The caller may have stopped waiting; the write is durable regardless.
                        let _ = reply.send(outcome);
                    }
                    None => {
                        if let Err(e) = outcome {
                            tracing::warn!("⚠️ Failed to persist {}: {e}", shared.path.display());
                        }
                    }
                }
            }
            Job::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Store writer for {} stopped", shared.path.display());
}

async fn read_document<D: Document>(path: &Path) -> D {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No document at {}, starting empty", path.display());
            return D::default();
        }
        Err(e) => {
            tracing::warn!("⚠️ Failed to read {}: {e}", path.display());
            return D::default();
        }
    };
    match serde_json::from_str::<D>(&raw) {
        Ok(doc) if doc.version() == D::VERSION => doc,
        Ok(doc) => {
            tracing::warn!(
                "⚠️ Ignoring {} (version {}, expected {})",
                path.display(),
                doc.version(),
                D::VERSION
            );
            D::default()
        }
        Err(e) => {
            tracing::warn!("⚠️ Failed to parse {}: {e}", path.display());
            D::default()
        }
    }
}

/// Write `bytes` to `path` via a temp sibling and a rename.
///
/// Readers see either the previous file or the complete new one. Temp
/// names are unique per call, so concurrent writers to the same path
/// never share a temp file.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| GoblinError::Store(format!("Invalid store path: {}", path.display())))?;
    let tmp = parent.join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()));

    let written = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        version: u32,
        value: u64,
        #[serde(default)]
        log: Vec<u64>,
    }

    impl Default for Counter {
        fn default() -> Self {
            Self { version: 1, value: 0, log: Vec::new() }
        }
    }

    impl Document for Counter {
        const VERSION: u32 = 1;
        fn version(&self) -> u32 {
            self.version
        }
    }

    #[tokio::test]
    async fn test_missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = AtomicFileStore::<Counter>::open(dir.path().join("counter.json"));
        assert_eq!(store.load().await, Counter::default());
    }

    #[tokio::test]
    async fn test_mutate_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("counter.json");

        let store = AtomicFileStore::<Counter>::open(&path);
        let written = store
            .mutate(|mut c| {
                c.value = 42;
                c
            })
            .await
            .unwrap();
        assert_eq!(store.load().await, written);
        store.close().await;

        let reopened = AtomicFileStore::<Counter>::open(&path);
        assert_eq!(reopened.load().await.value, 42);
    }

    #[tokio::test]
    async fn test_garbage_and_wrong_version_are_default() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "{ not json").unwrap();
        let store = AtomicFileStore::<Counter>::open(&garbage);
        assert_eq!(store.load().await, Counter::default());

        let future = dir.path().join("future.json");
        std::fs::write(&future, r#"{"version":2,"value":9}"#).unwrap();
        let store = AtomicFileStore::<Counter>::open(&future);
        assert_eq!(store.load().await.value, 0);
    }

    #[tokio::test]
    async fn test_concurrent_mutations_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.json");
        let store = Arc::new(AtomicFileStore::<Counter>::open(&path));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .mutate(|mut c| {
                        c.value += 1;
                        c
                    })
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.load().await.value, 50);
        let on_disk: Counter = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.value, 50);
    }

    #[tokio::test]
    async fn test_detached_mutations_keep_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.json");
        let store = AtomicFileStore::<Counter>::open(&path);

        for i in 1..=20u64 {
            store
                .mutate_detached(move |mut c| {
                    c.value = i;
                    c.log.push(i);
                    c
                })
                .unwrap();
        }
        store.flush().await.unwrap();

        let doc = store.load().await;
        assert_eq!(doc.value, 20);
        assert_eq!(doc.log, (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_cache() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "i am a file").unwrap();

        let store = AtomicFileStore::<Counter>::open(blocker.join("counter.json"));
        let result = store
            .mutate(|mut c| {
                c.value = 7;
                c
            })
            .await;
        assert!(result.is_err());
        assert_eq!(store.load().await.value, 0);
    }

    #[tokio::test]
    async fn test_panicking_mutation_does_not_stop_writer() {
        let dir = tempfile::tempdir().unwrap();
        let store = AtomicFileStore::<Counter>::open(dir.path().join("counter.json"));
        store
            .mutate(|mut c| {
                c.value = 1;
                c
            })
            .await
            .unwrap();

        let result = store.mutate(|_| -> Counter { panic!("bad mutation") }).await;
        assert!(matches!(result, Err(GoblinError::Store(_))));
        assert_eq!(store.load().await.value, 1);

        store
            .mutate(|mut c| {
                c.value += 1;
                c
            })
            .await
            .unwrap();
        store.flush().await.unwrap();
        assert_eq!(store.load().await.value, 2);
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = AtomicFileStore::<Counter>::open(dir.path().join("counter.json"));
        for _ in 0..5 {
            store
                .mutate(|mut c| {
                    c.value += 1;
                    c
                })
                .await
                .unwrap();
        }
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["counter.json".to_string()]);
    }
}
