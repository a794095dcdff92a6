//! Uniform lookup/iteration over the reference side of a reconciliation

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::pathkey;
use crate::record::FileRecord;
use crate::store::IndexStore;
use crate::walker::{TreeWalker, WalkEvent};

/// The side of reconciliation being compared against: a second directory
/// tree or a persisted index, behind one capability set.
///
/// Tree-backed lookups verify existence only; the returned ephemeral
/// record carries an empty fingerprint and callers that need content
/// equality fingerprint the underlying file themselves. Store-backed
/// lookups return the stored fingerprint.
pub trait ReferenceSet: Send + Sync {
    /// Point lookup by key.
    fn lookup(&self, key: &str) -> Result<Option<FileRecord>>;

    /// Visit every record in the reference set.
    fn for_each(&self, f: &mut dyn FnMut(FileRecord) -> Result<()>) -> Result<()>;
}

/// Reference backed by a second live directory tree.
pub struct TreeReference {
    root: PathBuf,
}

impl TreeReference {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Re-derive the absolute path a key points at on this side.
    pub fn absolute(&self, key: &str) -> PathBuf {
        pathkey::absolute_path(&self.root, key)
    }
}

impl ReferenceSet for TreeReference {
    fn lookup(&self, key: &str) -> Result<Option<FileRecord>> {
        let candidate = self.absolute(key);

        if candidate.is_file() {
            Ok(Some(FileRecord::new(key.to_string(), String::new(), None)))
        } else {
            Ok(None)
        }
    }

    fn for_each(&self, f: &mut dyn FnMut(FileRecord) -> Result<()>) -> Result<()> {
        for event in TreeWalker::new(&self.root) {
            if let WalkEvent::File(path) = event {
                let key = pathkey::relative_key(&self.root, &path)?;
                f(FileRecord::new(key, String::new(), None))?;
            }
        }

        Ok(())
    }
}

impl ReferenceSet for IndexStore {
    fn lookup(&self, key: &str) -> Result<Option<FileRecord>> {
        self.find_by_key(key)
    }

    fn for_each(&self, f: &mut dyn FnMut(FileRecord) -> Result<()>) -> Result<()> {
        IndexStore::for_each(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn tree_lookup_checks_existence() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir(root.join("sub")).unwrap();
        std::fs::write(root.join("sub").join("f.txt"), b"f").unwrap();

        let reference = TreeReference::new(root);

        let hit = reference.lookup("/sub/f.txt").unwrap();
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().key, "/sub/f.txt");

        assert!(reference.lookup("/sub/missing.txt").unwrap().is_none());
        // Directories are not files; they never match a key.
        assert!(reference.lookup("/sub").unwrap().is_none());
    }

    #[test]
    fn tree_for_each_visits_every_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::write(root.join("a"), b"a").unwrap();
        std::fs::create_dir(root.join("d")).unwrap();
        std::fs::write(root.join("d").join("b"), b"b").unwrap();

        let reference = TreeReference::new(root);
        let mut keys = Vec::new();
        reference
            .for_each(&mut |record| {
                keys.push(record.key);
                Ok(())
            })
            .unwrap();

        keys.sort();
        assert_eq!(keys, vec!["/a".to_string(), "/d/b".to_string()]);
    }

    #[test]
    fn store_reference_returns_stored_fingerprints() {
        let store = IndexStore::in_memory().unwrap();
        store
            .insert(&FileRecord::new("/a".into(), "CBF43926".into(), None))
            .unwrap();

        let reference: &dyn ReferenceSet = &store;
        let hit = reference.lookup("/a").unwrap().unwrap();
        assert_eq!(hit.fingerprint, "CBF43926");

        let mut visited = 0;
        reference
            .for_each(&mut |_| {
                visited += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(visited, 1);
    }
}
