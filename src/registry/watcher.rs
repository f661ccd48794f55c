//! Directory watcher driving registry hot reload
//!
//! Watches one directory non-recursively for create/delete events and feeds
//! them to a [`WatchHandler`] on a tokio task, decoupled from the OS watcher
//! thread that `notify` runs. A failing handler invocation is logged and never
//! stops the event loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Callbacks invoked per filesystem event.
///
/// Events arrive in filesystem-report order with no cross-event atomicity: a
/// key file and its password file created back-to-back are two independent
/// events, and the handler must tolerate a missing sibling.
#[async_trait::async_trait]
pub trait WatchHandler: Send + Sync {
    async fn file_created(&self, path: &Path);
    async fn file_deleted(&self, path: &Path);
}

#[derive(Debug)]
enum WatchEvent {
    Created(PathBuf),
    Deleted(PathBuf),
}

/// Errors starting a directory watch
#[derive(Debug, thiserror::Error)]
#[error("Failed to watch {dir}: {source}")]
pub struct WatchError {
    pub dir: String,
    #[source]
    source: notify::Error,
}

/// A running watch on one directory.
///
/// Holds the OS watch handle; dropping (or [`stop`](Self::stop)) releases it
/// and ends the dispatch task.
pub struct DirectoryWatcher {
    dir: PathBuf,
    // Kept alive for the watch duration; dropping unregisters the OS watch
    _watcher: RecommendedWatcher,
    task: tokio::task::JoinHandle<()>,
}

impl DirectoryWatcher {
    /// Register the watch and start dispatching events to `handler`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(dir: &Path, handler: Arc<dyn WatchHandler>) -> Result<Self, WatchError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            // Runs on the notify thread; forward onto the runtime and return
            match result {
                Ok(event) => forward_event(&tx, event),
                Err(e) => warn!(error = %e, "Filesystem watch error"),
            }
        })
        .map_err(|source| WatchError { dir: dir.display().to_string(), source })?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError { dir: dir.display().to_string(), source })?;

        let task = tokio::spawn(dispatch_loop(rx, handler));
        info!(dir = %dir.display(), "Watching signer directory");

        Ok(Self { dir: dir.to_path_buf(), _watcher: watcher, task })
    }

    /// Release the OS watch handle and end event dispatch.
    ///
    /// Called on process shutdown so the watch does not outlive the registry.
    pub fn stop(self) {
        info!(dir = %self.dir.display(), "Stopping signer directory watch");
        self.task.abort();
        // _watcher drops here, releasing the OS handle
    }
}

fn forward_event(tx: &mpsc::UnboundedSender<WatchEvent>, event: Event) {
    let created = match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => true,
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => false,
        _ => return,
    };
    for path in event.paths {
        let event =
            if created { WatchEvent::Created(path) } else { WatchEvent::Deleted(path) };
        // Send fails only once the dispatch task is gone, i.e. after stop()
        let _ = tx.send(event);
    }
}

async fn dispatch_loop(mut rx: mpsc::UnboundedReceiver<WatchEvent>, handler: Arc<dyn WatchHandler>) {
    while let Some(event) = rx.recv().await {
        debug!(?event, "Filesystem event");
        // One bad event must not kill future hot reloading
        let outcome = match &event {
            WatchEvent::Created(path) => {
                tokio::spawn({
                    let handler = handler.clone();
                    let path = path.clone();
                    async move { handler.file_created(&path).await }
                })
                .await
            }
            WatchEvent::Deleted(path) => {
                tokio::spawn({
                    let handler = handler.clone();
                    let path = path.clone();
                    async move { handler.file_deleted(&path).await }
                })
                .await
            }
        };
        if let Err(e) = outcome {
            warn!(?event, error = %e, "Watch callback panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        created: Mutex<Vec<PathBuf>>,
        deleted: Mutex<Vec<PathBuf>>,
    }

    #[async_trait::async_trait]
    impl WatchHandler for RecordingHandler {
        async fn file_created(&self, path: &Path) {
            self.created.lock().await.push(path.to_path_buf());
        }

        async fn file_deleted(&self, path: &Path) {
            self.deleted.lock().await.push(path.to_path_buf());
        }
    }

    /// Panics in one callback must not stop later deliveries
    struct PanickyHandler {
        inner: Arc<RecordingHandler>,
    }

    #[async_trait::async_trait]
    impl WatchHandler for PanickyHandler {
        async fn file_created(&self, path: &Path) {
            if path.extension().and_then(|e| e.to_str()) == Some("boom") {
                panic!("bad event");
            }
            self.inner.file_created(path).await;
        }

        async fn file_deleted(&self, path: &Path) {
            self.inner.file_deleted(path).await;
        }
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
        for _ in 0..100 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_create_and_delete_events_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let handler = Arc::new(RecordingHandler::default());
        let watcher = DirectoryWatcher::start(dir.path(), handler.clone()).unwrap();

        let file = dir.path().join("one.key");
        std::fs::write(&file, "00").unwrap();
        assert!(
            wait_for(|| handler.created.try_lock().map(|c| !c.is_empty()).unwrap_or(false)).await,
            "create event never arrived"
        );

        std::fs::remove_file(&file).unwrap();
        assert!(
            wait_for(|| handler.deleted.try_lock().map(|d| !d.is_empty()).unwrap_or(false)).await,
            "delete event never arrived"
        );

        watcher.stop();
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_stop_loop() {
        let dir = tempfile::tempdir().unwrap();
        let inner = Arc::new(RecordingHandler::default());
        let handler = Arc::new(PanickyHandler { inner: inner.clone() });
        let watcher = DirectoryWatcher::start(dir.path(), handler).unwrap();

        std::fs::write(dir.path().join("first.boom"), "00").unwrap();
        std::fs::write(dir.path().join("second.key"), "00").unwrap();

        assert!(
            wait_for(|| {
                inner
                    .created
                    .try_lock()
                    .map(|c| c.iter().any(|p| p.extension().is_some_and(|e| e == "key")))
                    .unwrap_or(false)
            })
            .await,
            "event after panic never arrived"
        );

        watcher.stop();
    }
}
