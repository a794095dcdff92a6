//! Classification report accumulation

use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{ReconError, Result};

/// The four classification outcomes for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Match,
    Diff,
    Miss,
    Extra,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Tag::Match => "MATCH",
            Tag::Diff => "DIFF",
            Tag::Miss => "MISS",
            Tag::Extra => "EXTRA",
        };
        write!(f, "{}", tag)
    }
}

/// Write-only destination for classification events.
///
/// Events may arrive interleaved from concurrent workers; each event is a
/// single atomic line append. No read-back or deduplication is performed.
pub trait ReportSink: Send + Sync {
    /// Record one classified key.
    fn event(&self, tag: Tag, key: &str) -> Result<()> {
        self.line(&format!("{}: {}", tag, key))
    }

    /// Append one raw line (headers, prune confirmations).
    fn line(&self, text: &str) -> Result<()>;
}

/// Line-buffered sink writing straight to stdout.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

impl ReportSink for ConsoleSink {
    fn line(&self, text: &str) -> Result<()> {
        println!("{}", text);
        Ok(())
    }
}

/// Append-only file sink, created fresh at run start.
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    /// Create the report file, truncating any prior content.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| {
            ReconError::report_error(format!(
                "Failed to create report file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for FileSink {
    fn line(&self, text: &str) -> Result<()> {
        let mut file = self
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        writeln!(file, "{}", text).map_err(|e| {
            ReconError::report_error(format!(
                "Failed to write report file '{}': {}",
                self.path.display(),
                e
            ))
        })
    }
}
