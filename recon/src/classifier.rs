//! Content-type classification

use std::path::Path;

/// Assigns a MIME-like label to a file. Synchronous and side-effect-free;
/// returning `None` is a valid classification, not an error.
pub trait Classifier: Send + Sync {
    fn detect(&self, path: &Path) -> Option<String>;
}

/// Production classifier backed by extension lookup.
#[derive(Debug, Default)]
pub struct MimeClassifier;

impl Classifier for MimeClassifier {
    fn detect(&self, path: &Path) -> Option<String> {
        mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string())
    }
}

/// Classifier that labels nothing. Used in tests and type-less runs.
#[derive(Debug, Default)]
pub struct NullClassifier;

impl Classifier for NullClassifier {
    fn detect(&self, _path: &Path) -> Option<String> {
        None
    }
}
