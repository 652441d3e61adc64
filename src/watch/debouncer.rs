use std::path::PathBuf;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::time::Instant;

use super::types::ChangeKind;

/// Sleep used when nothing is pending.
const IDLE_SLEEP: Duration = Duration::from_secs(86400);

/// Pure debouncer: only handles timing and event deduplication.
///
/// Every event resets the quiet period. Once `window` has passed since the
/// last event, the batch is ready and is taken exactly once.
pub(super) struct Debouncer {
    window: Duration,
    /// Path → latest ChangeKind (dedup via key uniqueness)
    pub(super) changes: FxHashMap<PathBuf, ChangeKind>,
    pub(super) last_event: Option<Instant>,
}

impl Debouncer {
    pub(super) fn new(window: Duration) -> Self {
        Self {
            window,
            changes: FxHashMap::default(),
            last_event: None,
        }
    }

    pub(super) fn add(&mut self, path: PathBuf, kind: ChangeKind) {
        crate::debug!("watch"; "{}: {}", kind.label(), path.display());
        self.changes.insert(path, kind);
        self.last_event = Some(Instant::now());
    }

    /// Take the batch if the quiet period has elapsed.
    pub(super) fn take_if_ready(&mut self) -> Option<FxHashMap<PathBuf, ChangeKind>> {
        if !self.is_ready() {
            return None;
        }
        self.last_event = None;
        Some(std::mem::take(&mut self.changes))
    }

    pub(super) fn is_ready(&self) -> bool {
        let Some(last_event) = self.last_event else {
            return false;
        };
        last_event.elapsed() >= self.window && !self.changes.is_empty()
    }

    /// Precise sleep duration until the batch could be ready.
    pub(super) fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return IDLE_SLEEP;
        };
        self.window
            .saturating_sub(last_event.elapsed())
            .max(Duration::from_millis(1))
    }
}
