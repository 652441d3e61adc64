use std::path::{Component, Path, PathBuf};

use notify::EventKind;
use notify::event::ModifyKind;

use super::types::ChangeKind;

/// Decides which raw notify events count as source changes.
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    root: PathBuf,
    extensions: Vec<String>,
    ignore: Vec<String>,
}

impl ChangeFilter {
    pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>, ignore: Vec<String>) -> Self {
        Self {
            root: root.into(),
            extensions,
            ignore,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an event kind to a change, dropping access and metadata noise.
    pub fn classify(kind: &EventKind) -> Option<ChangeKind> {
        match kind {
            EventKind::Create(_) => Some(ChangeKind::Created),
            EventKind::Remove(_) => Some(ChangeKind::Removed),
            // chmod/touch noise would rebuild in a loop
            EventKind::Modify(ModifyKind::Metadata(_)) => None,
            EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Renamed),
            EventKind::Modify(_) => Some(ChangeKind::Modified),
            _ => None,
        }
    }

    /// Whether a change at `path` should trigger a rebuild.
    pub fn accepts(&self, path: &Path) -> bool {
        !is_temp_file(path) && !self.is_ignored(path) && self.has_watched_extension(path)
    }

    /// Whether any component of `path` below the root is an ignored name.
    pub(super) fn is_ignored(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative.components().any(|component| match component {
            Component::Normal(name) => self.ignore.iter().any(|ignored| name == ignored.as_str()),
            _ => false,
        })
    }

    fn has_watched_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|want| want == ext))
    }
}

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with(".#")
        || name == "4913"
}
