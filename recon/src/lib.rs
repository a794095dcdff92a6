//! Reconciliation Engine Library
//!
//! Reconciles the state of a filesystem subtree against a reference —
//! either a second subtree or a persisted index — and classifies every
//! path as matching, changed, missing, or extra:
//! - Lazy depth-first traversal with directory boundary events
//! - Streaming CRC-32 content fingerprints with bounded memory
//! - SQLite-backed persisted index with keyset pagination
//! - Bounded worker pool for checksum and classification units
//! - Console or file report sinks
//! - CSV export of a persisted index

pub mod checksum;
pub mod classifier;
pub mod engine;
pub mod error;
pub mod export;
pub mod pathkey;
pub mod record;
pub mod reference;
pub mod report;
pub mod scheduler;
pub mod store;
pub mod walker;

// Re-export main types and functions
pub use checksum::{ChecksumAlgorithm, Checksummer};
pub use classifier::{Classifier, MimeClassifier, NullClassifier};
pub use engine::{ReconOptions, Reconciler, ReportTarget, RunSummary};
pub use error::{ReconError, Result};
pub use export::export_csv;
pub use record::FileRecord;
pub use reference::{ReferenceSet, TreeReference};
pub use report::{ConsoleSink, FileSink, ReportSink, Tag};
pub use scheduler::{default_concurrency, FileJob, JobHandler, WorkerPool};
pub use store::IndexStore;
pub use walker::{TreeWalker, WalkEvent};

// Test modules
#[cfg(test)]
mod engine_tests;
