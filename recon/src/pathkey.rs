//! Root-relative key derivation

use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use crate::error::{ReconError, Result};

/// Derive the root-relative key for a file under `root`.
///
/// The key begins with the path separator and strips exactly the root
/// prefix, component-wise. A root whose name recurs as a directory name
/// below it therefore cannot corrupt the key, which plain substring
/// removal would.
pub fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        ReconError::config_error(format!(
            "'{}' is not under root '{}'",
            path.display(),
            root.display()
        ))
    })?;

    Ok(format!("{}{}", MAIN_SEPARATOR, relative.display()))
}

/// Re-derive the absolute path a key points at under `root`.
pub fn absolute_path(root: &Path, key: &str) -> PathBuf {
    root.join(key.trim_start_matches(MAIN_SEPARATOR))
}
