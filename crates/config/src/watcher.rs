use notify::{Event, EventKind};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Watches a config file for changes and sends a notification on every write.
///
/// The parent directory is watched rather than the file itself so that
/// editors which save by rename-and-replace are still picked up, and so the
/// file may be created after startup.
///
/// # Example
/// ```no_run
/// # async fn demo() {
/// use cpumon_config::ConfigWatcher;
///
/// let (_watcher, mut rx) = ConfigWatcher::spawn("/home/user/.config/cpumon/cpumon.toml");
/// while rx.recv().await.is_some() {
///     println!("config changed, reloading");
/// }
/// # }
/// ```
pub struct ConfigWatcher {
    path: PathBuf,
}

impl ConfigWatcher {
    /// Spawn a filesystem watcher for `path`.
    /// Returns the watcher handle and a receiver that fires on every detected change.
    pub fn spawn(path: impl AsRef<Path>) -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        let path = path.as_ref().to_path_buf();
        let watcher = Self { path: path.clone() };

        tokio::spawn(watch_loop(path, tx));

        (watcher, rx)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn watch_loop(path: PathBuf, tx: mpsc::Sender<()>) {
    use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
    use std::time::Duration;

    let (sync_tx, mut sync_rx) = mpsc::channel::<notify::Result<Event>>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res| {
            let _ = sync_tx.blocking_send(res);
        },
        Config::default().with_poll_interval(Duration::from_secs(2)),
    ) {
        Ok(w) => w,
        Err(e) => {
            error!("Failed to create filesystem watcher: {e}");
            return;
        }
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
        error!("Failed to watch '{}': {e}", dir.display());
        return;
    }

    info!("Watching config file: {}", path.display());

    while let Some(event) = sync_rx.recv().await {
        match event {
            Ok(e) => {
                if is_relevant(&e, &path) {
                    // A full channel already holds a pending reload; coalesce.
                    if let Err(mpsc::error::TrySendError::Closed(())) = tx.try_send(()) {
                        break; // receiver dropped
                    }
                }
            }
            Err(e) => warn!("Watcher error: {e}"),
        }
    }
}

/// `true` when `event` modifies or creates the watched file.
fn is_relevant(event: &Event, path: &Path) -> bool {
    let touches_file = event
        .paths
        .iter()
        .any(|p| p == path || (p.file_name().is_some() && p.file_name() == path.file_name()));
    touches_file && matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn writes_to_the_watched_file_are_relevant() {
        let target = Path::new("/cfg/cpumon.toml");
        assert!(is_relevant(
            &event(EventKind::Modify(ModifyKind::Any), "/cfg/cpumon.toml"),
            target
        ));
        assert!(is_relevant(
            &event(EventKind::Create(CreateKind::File), "/cfg/cpumon.toml"),
            target
        ));
    }

    #[test]
    fn siblings_and_removals_are_ignored() {
        let target = Path::new("/cfg/cpumon.toml");
        assert!(!is_relevant(
            &event(EventKind::Modify(ModifyKind::Any), "/cfg/other.toml"),
            target
        ));
        assert!(!is_relevant(
            &event(EventKind::Remove(RemoveKind::File), "/cfg/cpumon.toml"),
            target
        ));
    }
}
