//! File watcher feeding the rebuild trigger.
//!
//! Architecture:
//! ```text
//! notify → bridge thread (filter) → Debouncer (pure timing) → PendingTrigger
//! ```
//!
//! Every directory gets its own non-recursive watch, except ignored ones
//! and everything below them. Directories that appear later are attached
//! by the bridge thread as their events come in.
//!
//! The watcher only marks a rebuild as owed. The next inbound request claims
//! the trigger and runs the rebuild.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use notify::EventKind;
use notify::RecommendedWatcher;
use notify::event::ModifyKind;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;

use crate::core::PendingTrigger;

// Pure timing and deduplication.
mod debouncer;
// Which events count as source changes.
mod filter;
// Per-directory watch registration.
mod tree;
// Shared change types.
mod types;


use debouncer::Debouncer;
pub use filter::ChangeFilter;
use tree::WatchDir;
pub use types::ChangeKind;

/// Filtered change, as sent from the bridge thread to the debounce loop.
type Change = (PathBuf, ChangeKind);

/// How often the bridge thread checks whether the debounce loop is gone.
const BRIDGE_POLL: Duration = Duration::from_millis(200);

/// Watcher over the project root.
pub struct Watcher {
    /// Channel to receive notify events (sync -> async bridge)
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    /// Watcher handle (must be kept alive)
    watcher: RecommendedWatcher,
    filter: ChangeFilter,
    window: Duration,
    trigger: Arc<PendingTrigger>,
}

impl Watcher {
    /// Start watching immediately. Events buffer until `run` is polled.
    pub fn new(
        filter: ChangeFilter,
        window: Duration,
        trigger: Arc<PendingTrigger>,
    ) -> notify::Result<Self> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;
        let watched = tree::attach(&mut watcher, &filter, filter.root())?;
        crate::log!("watch"; "{} ({} directories)", filter.root().display(), watched);

        Ok(Self {
            notify_rx,
            watcher,
            filter,
            window,
            trigger,
        })
    }

    /// Run until the task is dropped.
    pub async fn run(self) {
        let Self {
            notify_rx,
            watcher,
            filter,
            window,
            trigger,
        } = self;

        let (async_tx, async_rx) = mpsc::channel::<Change>(64);

        // notify has no async API; forward filtered changes from a thread.
        // The thread owns the watcher and ends once the loop side is gone.
        std::thread::spawn(move || {
            let mut watcher = watcher;
            loop {
                let result = match notify_rx.recv_timeout(BRIDGE_POLL) {
                    Ok(result) => result,
                    Err(RecvTimeoutError::Timeout) if async_tx.is_closed() => return,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => return,
                };
                match result {
                    Ok(event) => {
                        attach_new_dirs(&mut watcher, &event, &filter);
                        for change in changes_of(&event, &filter) {
                            if async_tx.blocking_send(change).is_err() {
                                return; // Receiver dropped
                            }
                        }
                    }
                    Err(e) => crate::log!("watch"; "notify error: {}", e),
                }
            }
        });

        debounce_loop(async_rx, window, &trigger).await;
    }
}

/// Watch directories that were created or moved in, with their contents.
fn attach_new_dirs(watcher: &mut impl WatchDir, event: &notify::Event, filter: &ChangeFilter) {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_))
    ) {
        return;
    }
    for path in &event.paths {
        if !path.is_dir() || filter.is_ignored(path) {
            continue;
        }
        match tree::attach(watcher, filter, path) {
            Ok(watched) => {
                crate::debug!("watch"; "attached {} ({} directories)", path.display(), watched);
            }
            Err(e) => crate::log!("watch"; "cannot watch {}: {}", path.display(), e),
        }
    }
}

/// Accepted changes carried by one notify event.
fn changes_of(event: &notify::Event, filter: &ChangeFilter) -> Vec<Change> {
    let Some(kind) = ChangeFilter::classify(&event.kind) else {
        return Vec::new();
    };
    event
        .paths
        .iter()
        .filter(|path| filter.accepts(path))
        .map(|path| (path.clone(), kind))
        .collect()
}

/// Coalesce changes and set the trigger once per quiet period.
///
/// Single task, so the action never overlaps itself. Ends when the sender
/// side closes.
async fn debounce_loop(
    mut rx: mpsc::Receiver<Change>,
    window: Duration,
    trigger: &PendingTrigger,
) {
    let mut debouncer = Debouncer::new(window);

    loop {
        tokio::select! {
            biased;
            change = rx.recv() => match change {
                Some((path, kind)) => debouncer.add(path, kind),
                None => break,
            },
            _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                if let Some(changes) = debouncer.take_if_ready() {
                    fire(&changes, trigger);
                }
            }
        }
    }
}

fn fire(changes: &FxHashMap<PathBuf, ChangeKind>, trigger: &PendingTrigger) {
    let summary = match changes.iter().next() {
        Some((path, kind)) if changes.len() == 1 => {
            let name = path.file_name().map_or_else(
                || path.display().to_string(),
                |name| name.to_string_lossy().into_owned(),
            );
            format!("{} {}", kind.label(), name)
        }
        _ => format!("{} files changed", changes.len()),
    };

    if trigger.set() {
        crate::log!("watch"; "{}, rebuild pending", summary);
    } else {
        crate::debug!("watch"; "{}, rebuild already pending", summary);
    }
}
