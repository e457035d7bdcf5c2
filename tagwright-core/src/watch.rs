//! Directory watching that feeds debounced re-scans.
//!
//! A thin wrapper around `notify`: every changed path under the root is pushed
//! into a [`DebouncedHandle`], so the consumer behind it re-scans once per
//! burst of filesystem activity instead of once per event.

use std::fmt;
use std::path::{Path, PathBuf};

use notify::event::EventKind;
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::config::WatchConfig;
use crate::debounce::DebouncedHandle;
use crate::error::Result;

/// Live watch on one directory. Dropping it stops the notify stream.
pub struct DirectoryWatch {
    root: PathBuf,
    recursive: bool,
    _watcher: RecommendedWatcher,
}

impl fmt::Debug for DirectoryWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryWatch")
            .field("root", &self.root)
            .field("recursive", &self.recursive)
            .finish()
    }
}

impl DirectoryWatch {
    /// Starts watching `root`. The debounce window itself belongs to the
    /// queue behind `sink`; see [`WatchConfig::debounce`].
    pub fn start(
        root: impl Into<PathBuf>,
        config: &WatchConfig,
        sink: DebouncedHandle<PathBuf>,
    ) -> Result<Self> {
        let root = root.into();
        let event_root = root.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => forward_event(&event_root, event, &sink),
                Err(err) => {
                    warn!(root = %event_root.display(), error = %err, "directory watch error");
                }
            },
            NotifyConfig::default(),
        )?;

        let mode = if config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(&root, mode)?;

        info!(root = %root.display(), recursive = config.recursive, "directory watch started");
        Ok(Self {
            root,
            recursive: config.recursive,
            _watcher: watcher,
        })
    }

    /// Directory being watched.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn forward_event(root: &Path, event: Event, sink: &DebouncedHandle<PathBuf>) {
    if matches!(event.kind, EventKind::Access(_)) || sink.is_shut_down() {
        return;
    }

    debug!(root = %root.display(), kind = ?event.kind, paths = event.paths.len(), "fs event");
    if event.paths.is_empty() {
        // Overflow or backend rescan hint: the whole root is suspect.
        sink.push(root.to_path_buf());
        return;
    }
    for path in event.paths {
        sink.push(path);
    }
}
