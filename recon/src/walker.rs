//! Depth-first directory traversal with directory boundary events

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// One step of a tree walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEvent {
    /// A directory is about to be processed. Never fired for the walk root.
    EnterDir(PathBuf),
    /// A directory has finished processing, including empty directories.
    LeaveDir(PathBuf),
    /// A regular file.
    File(PathBuf),
}

/// Lazy, depth-first walk of a directory tree.
///
/// Yields every reachable regular file exactly once, plus enter/leave
/// events for each subdirectory. Unreadable entries are skipped with a
/// warning rather than failing the walk. Sibling order follows the
/// filesystem listing and is unspecified. Symlinks are not followed.
/// A walk is not resumable; restart by constructing a new walker.
pub struct TreeWalker {
    root: PathBuf,
    iter: walkdir::IntoIter,
    open_dirs: Vec<PathBuf>,
    pending: VecDeque<WalkEvent>,
}

impl TreeWalker {
    /// Create a walker over `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let iter = WalkDir::new(&root).follow_links(false).into_iter();

        Self {
            root,
            iter,
            open_dirs: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    /// The root this walker was started from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Queue leave events for every open directory that is not an ancestor
    /// of `path`. Directories close innermost-first.
    fn close_finished_dirs(&mut self, path: &Path) {
        loop {
            match self.open_dirs.last() {
                Some(open) if !path.starts_with(open) => {
                    if let Some(finished) = self.open_dirs.pop() {
                        self.pending.push_back(WalkEvent::LeaveDir(finished));
                    }
                }
                _ => break,
            }
        }
    }
}

impl Iterator for TreeWalker {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            match self.iter.next() {
                None => {
                    // End of traversal: close whatever is still open.
                    return self.open_dirs.pop().map(WalkEvent::LeaveDir);
                }
                Some(Err(err)) => {
                    warn!("Skipping unreadable entry: {}", err);
                }
                Some(Ok(entry)) => {
                    let path = entry.path().to_path_buf();
                    self.close_finished_dirs(&path);

                    if entry.file_type().is_dir() {
                        if path != self.root {
                            self.open_dirs.push(path.clone());
                            self.pending.push_back(WalkEvent::EnterDir(path));
                        }
                    } else if entry.file_type().is_file() {
                        self.pending.push_back(WalkEvent::File(path));
                    }
                    // Symlinks and special files are not part of the walk.
                }
            }
        }
    }
}
