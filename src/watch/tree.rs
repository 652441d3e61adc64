use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use super::ChangeFilter;

/// Watches a single directory, not its children.
pub(super) trait WatchDir {
    fn watch_dir(&mut self, dir: &Path) -> notify::Result<()>;
}

impl WatchDir for RecommendedWatcher {
    fn watch_dir(&mut self, dir: &Path) -> notify::Result<()> {
        self.watch(dir, RecursiveMode::NonRecursive)
    }
}

/// Watch `dir` and every directory below it, skipping ignored names.
///
/// Ignored directories get no OS watch at all, so a large `node_modules`
/// costs nothing. Only a failure on `dir` itself is an error; a
/// subdirectory that cannot be watched is logged and skipped along with
/// its children. Returns the number of directories watched.
pub(super) fn attach(
    watcher: &mut impl WatchDir,
    filter: &ChangeFilter,
    dir: &Path,
) -> notify::Result<usize> {
    watcher.watch_dir(dir)?;

    let mut watched = 1;
    let mut pending = subdirs(dir, filter);
    while let Some(sub) = pending.pop() {
        match watcher.watch_dir(&sub) {
            Ok(()) => {
                watched += 1;
                pending.extend(subdirs(&sub, filter));
            }
            Err(e) => crate::log!("watch"; "cannot watch {}: {}", sub.display(), e),
        }
    }
    Ok(watched)
}

/// Directories directly under `dir` that are not ignored. Symlinks are not
/// followed.
fn subdirs(dir: &Path, filter: &ChangeFilter) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_dir()))
        .map(|entry| entry.path())
        .filter(|path| !filter.is_ignored(path))
        .collect()
}
