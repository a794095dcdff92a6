//! Reconciliation engine that merges a tree walk against a reference set

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::checksum::{ChecksumAlgorithm, Checksummer, DEFAULT_BUFFER_SIZE};
use crate::classifier::Classifier;
use crate::error::{ReconError, Result};
use crate::pathkey;
use crate::record::FileRecord;
use crate::reference::{ReferenceSet, TreeReference};
use crate::report::{ConsoleSink, FileSink, ReportSink, Tag};
use crate::scheduler::{default_concurrency, FileJob, JobHandler, WorkerPool};
use crate::store::IndexStore;
use crate::walker::{TreeWalker, WalkEvent};

/// Where classification events are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum ReportTarget {
    /// Line-buffered standard output.
    #[default]
    Console,
    /// A report file, created fresh at run start.
    File(PathBuf),
}

/// Options for reconciliation runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconOptions {
    /// Log each file as it is processed
    pub verbose: bool,
    /// Index mode: leave existing entries untouched
    pub no_update: bool,
    /// Index mode: delete entries whose files were never encountered
    pub prune_missing: bool,
    /// Compare mode: overwrite the reference copy of MISS/DIFF files
    pub copy_on_diff: bool,
    /// Report destination
    pub report: ReportTarget,
    /// Fingerprint algorithm, fixed for the whole run
    pub algorithm: ChecksumAlgorithm,
    /// Read buffer size for fingerprinting
    pub buffer_size: usize,
    /// Bound on concurrently in-flight checksum+classify units
    pub max_concurrency: usize,
}

impl Default for ReconOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            no_update: false,
            prune_missing: false,
            copy_on_diff: false,
            report: ReportTarget::Console,
            algorithm: ChecksumAlgorithm::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_concurrency: default_concurrency(),
        }
    }
}

/// Outcome counts for one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Files encountered on the primary walk
    pub files: usize,
    pub matches: usize,
    pub diffs: usize,
    pub misses: usize,
    pub extras: usize,
    /// Records created in the store (index mode)
    pub created: usize,
    /// Records updated in the store (index mode)
    pub updated: usize,
    /// Records pruned from the store (index mode with prune)
    pub pruned: usize,
    /// Files copied onto the reference (compare mode with copy-on-diff)
    pub copied: usize,
    /// Files skipped because of per-file errors or `no_update`
    pub skipped: usize,
}

impl RunSummary {
    /// Whether the run found both sides fully in agreement.
    pub fn is_clean(&self) -> bool {
        self.diffs == 0 && self.misses == 0 && self.extras == 0
    }
}

#[derive(Debug, Default)]
struct Counters {
    files: AtomicUsize,
    matches: AtomicUsize,
    diffs: AtomicUsize,
    misses: AtomicUsize,
    extras: AtomicUsize,
    created: AtomicUsize,
    updated: AtomicUsize,
    pruned: AtomicUsize,
    copied: AtomicUsize,
    skipped: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> RunSummary {
        RunSummary {
            files: self.files.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
            diffs: self.diffs.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            extras: self.extras.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            pruned: self.pruned.load(Ordering::Relaxed),
            copied: self.copied.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// First run-fatal error raised by any worker; surfaced once the pool has
/// drained.
type FatalSlot = Arc<Mutex<Option<ReconError>>>;

fn park_fatal(slot: &FatalSlot, err: ReconError) {
    error!("{}", err);
    let mut guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if guard.is_none() {
        *guard = Some(err);
    }
}

fn take_fatal(slot: &FatalSlot) -> Result<()> {
    let mut guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    match guard.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn emit(sink: &dyn ReportSink, tag: Tag, key: &str) {
    if let Err(err) = sink.event(tag, key) {
        warn!("Failed to record report event: {}", err);
    }
}

fn put(sink: &dyn ReportSink, text: &str) {
    if let Err(err) = sink.line(text) {
        warn!("Failed to write report line: {}", err);
    }
}

/// Reconciles a primary directory tree against a reference set and drives
/// the configured side effects (persist, prune, copy).
pub struct Reconciler {
    options: ReconOptions,
    classifier: Arc<dyn Classifier>,
}

impl Reconciler {
    /// Create a reconciler with explicit options and classifier.
    pub fn new(options: ReconOptions, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            options,
            classifier,
        }
    }

    pub fn options(&self) -> &ReconOptions {
        &self.options
    }

    /// Index `root` into the store: new files become records, changed
    /// files update their record, and with `prune_missing` records whose
    /// files were never encountered are deleted.
    pub async fn index(&self, root: impl AsRef<Path>, store: Arc<IndexStore>) -> Result<RunSummary> {
        let root = check_root(root.as_ref())?;
        let sink = self.make_sink()?;
        write_index_header(sink.as_ref(), &root, store.as_ref());

        let pending = if self.options.prune_missing {
            let keys: HashSet<String> = store.all_keys()?.into_iter().collect();
            Some(Arc::new(Mutex::new(keys)))
        } else {
            None
        };

        let counters = Arc::new(Counters::default());
        let fatal: FatalSlot = Arc::new(Mutex::new(None));

        let context = Arc::new(IndexContext {
            store: Arc::clone(&store),
            classifier: Arc::clone(&self.classifier),
            sink: Arc::clone(&sink),
            counters: Arc::clone(&counters),
            pending: pending.clone(),
            verbose: self.options.verbose,
            no_update: self.options.no_update,
            fatal: Arc::clone(&fatal),
        });

        info!("Indexing directory: {}", root.display());
        let mut pool = self.spawn_pool(context);
        self.drive_walk(&root, &pool).await;
        pool.shutdown().await;
        take_fatal(&fatal)?;

        if let Some(pending) = pending {
            let leftovers: Vec<String> = {
                let guard = pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                guard.iter().cloned().collect()
            };

            for key in leftovers {
                prune_one(store.as_ref(), &key, sink.as_ref(), &counters);
            }
        }

        Ok(counters.snapshot())
    }

    /// Validate `root` against the store without modifying it: files not
    /// in the index and index entries not on disk are both `MISS`, changed
    /// content is `DIFF`.
    pub async fn validate(
        &self,
        root: impl AsRef<Path>,
        store: Arc<IndexStore>,
    ) -> Result<RunSummary> {
        let root = check_root(root.as_ref())?;
        let sink = self.make_sink()?;
        write_validate_header(sink.as_ref(), &root, store.as_ref());

        let counters = Arc::new(Counters::default());
        let fatal: FatalSlot = Arc::new(Mutex::new(None));

        let context = Arc::new(ValidateContext {
            store: Arc::clone(&store),
            sink: Arc::clone(&sink),
            counters: Arc::clone(&counters),
            verbose: self.options.verbose,
            fatal: Arc::clone(&fatal),
        });

        info!("Validating directory: {}", root.display());
        let mut pool = self.spawn_pool(context);
        self.drive_walk(&root, &pool).await;
        pool.shutdown().await;
        take_fatal(&fatal)?;

        // Complementary direction: records whose files are gone.
        sweep_reference(store.as_ref(), &root, Tag::Miss, sink.as_ref(), &counters)?;

        Ok(counters.snapshot())
    }

    /// Compare the `base` tree against the `other` tree, optionally
    /// overwriting diverged files on the other side.
    pub async fn compare(
        &self,
        base: impl AsRef<Path>,
        other: impl AsRef<Path>,
    ) -> Result<RunSummary> {
        let base = check_root(base.as_ref())?;
        let other = check_root(other.as_ref())?;
        let sink = self.make_sink()?;
        write_compare_header(sink.as_ref(), &base, &other, self.options.copy_on_diff);

        let counters = Arc::new(Counters::default());
        let reference = Arc::new(TreeReference::new(&other));

        let context = Arc::new(CompareContext {
            reference: Arc::clone(&reference),
            sink: Arc::clone(&sink),
            counters: Arc::clone(&counters),
            verbose: self.options.verbose,
            copy_on_diff: self.options.copy_on_diff,
        });

        info!(
            "Comparing '{}' against '{}'",
            base.display(),
            other.display()
        );
        let mut pool = self.spawn_pool(context);
        self.drive_walk(&base, &pool).await;
        pool.shutdown().await;

        // Reverse direction: files that only the other side has.
        sweep_reference(reference.as_ref(), &base, Tag::Extra, sink.as_ref(), &counters)?;

        Ok(counters.snapshot())
    }

    fn spawn_pool<H: JobHandler + 'static>(&self, handler: Arc<H>) -> WorkerPool {
        WorkerPool::spawn(
            self.options.max_concurrency,
            handler,
            self.options.algorithm,
            self.options.buffer_size,
        )
    }

    /// Walk the primary root sequentially, feeding files to the pool.
    async fn drive_walk(&self, root: &Path, pool: &WorkerPool) {
        for event in TreeWalker::new(root) {
            match event {
                WalkEvent::File(path) => match pathkey::relative_key(root, &path) {
                    Ok(key) => pool.schedule(FileJob { path, key }).await,
                    Err(err) => warn!("Skipping '{}': {}", path.display(), err),
                },
                WalkEvent::EnterDir(dir) => debug!("Entering directory: {}", dir.display()),
                WalkEvent::LeaveDir(dir) => debug!("Finished directory: {}", dir.display()),
            }
        }
    }

    fn make_sink(&self) -> Result<Arc<dyn ReportSink>> {
        match &self.options.report {
            ReportTarget::Console => Ok(Arc::new(ConsoleSink::new())),
            ReportTarget::File(path) => {
                let sink = FileSink::create(path)?;
                info!("Report will be saved to: {}", sink.path().display());
                Ok(Arc::new(sink))
            }
        }
    }
}

/// The primary root must be an existing directory; anything else is a
/// configuration error caught before traversal begins.
fn check_root(path: &Path) -> Result<PathBuf> {
    if !path.is_dir() {
        return Err(ReconError::config_error(format!(
            "'{}' does not exist or is not a directory",
            path.display()
        )));
    }

    Ok(path.to_path_buf())
}

/// Second pass shared by validate and compare: every reference entry whose
/// derived path is absent from the primary side gets `tag`.
fn sweep_reference(
    reference: &dyn ReferenceSet,
    primary_root: &Path,
    tag: Tag,
    sink: &dyn ReportSink,
    counters: &Counters,
) -> Result<()> {
    reference.for_each(&mut |record| {
        let candidate = pathkey::absolute_path(primary_root, &record.key);

        if !candidate.exists() {
            emit(sink, tag, &record.key);
            match tag {
                Tag::Miss => counters.misses.fetch_add(1, Ordering::Relaxed),
                Tag::Extra => counters.extras.fetch_add(1, Ordering::Relaxed),
                _ => 0,
            };
        }

        Ok(())
    })
}

fn prune_one(store: &IndexStore, key: &str, sink: &dyn ReportSink, counters: &Counters) {
    let record = match store.find_by_key(key) {
        Ok(Some(record)) => record,
        Ok(None) => return,
        Err(err) => {
            error!("Failed to look up '{}' for pruning: {}", key, err);
            return;
        }
    };

    let Some(id) = record.id else { return };

    match store.delete(id) {
        Ok(true) => {
            counters.pruned.fetch_add(1, Ordering::Relaxed);
            put(sink, &format!("PRUNED: {}", key));
            info!("Removed missing '{}' from the index", key);
        }
        Ok(false) => error!("Failed to remove missing '{}' from the index", key),
        Err(err) => error!("Store error while removing '{}': {}", key, err),
    }
}

async fn copy_file(source: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            ReconError::copy_error(
                source,
                destination,
                format!("Failed to create parent directory: {}", e),
            )
        })?;
    }

    fs::copy(source, destination).await.map_err(|e| {
        ReconError::copy_error(source, destination, format!("Failed to copy file: {}", e))
    })?;

    Ok(())
}

fn write_index_header(sink: &dyn ReportSink, root: &Path, store: &IndexStore) {
    put(sink, "======================== INDEX REPORT ========================");
    put(sink, &format!("Generated: {}", Utc::now().format("%Y-%m-%d %H:%M:%S")));
    put(sink, &format!("Directory: {}", root.display()));
    if let Some(path) = store.path() {
        put(sink, &format!("Database: {}", path.display()));
    }
    put(sink, "MISS - newly indexed file");
    put(sink, "DIFF - content changed since the last indexing");
    put(sink, "==============================================================");
}

fn write_validate_header(sink: &dyn ReportSink, root: &Path, store: &IndexStore) {
    put(sink, "===================== VALIDATION REPORT ======================");
    put(sink, &format!("Generated: {}", Utc::now().format("%Y-%m-%d %H:%M:%S")));
    put(sink, &format!("Directory: {}", root.display()));
    if let Some(path) = store.path() {
        put(sink, &format!("Database: {}", path.display()));
    }
    put(sink, "DIFF - content fingerprint differs from the index");
    put(sink, "MISS - present on only one side (directory or index)");
    put(sink, "==============================================================");
}

fn write_compare_header(sink: &dyn ReportSink, base: &Path, other: &Path, copy_on_diff: bool) {
    put(sink, "========================= DIFF REPORT ========================");
    put(sink, &format!("Generated: {}", Utc::now().format("%Y-%m-%d %H:%M:%S")));
    put(sink, &format!("Base directory: {}", base.display()));
    put(sink, &format!("Other directory: {}", other.display()));
    put(sink, "DIFF - content fingerprints differ");
    put(sink, "MISS - missing in the other directory");
    put(sink, "EXTRA - extra in the other directory");
    if copy_on_diff {
        put(sink, "MISS and DIFF files will be copied to the other directory");
    }
    put(sink, "==============================================================");
}

struct IndexContext {
    store: Arc<IndexStore>,
    classifier: Arc<dyn Classifier>,
    sink: Arc<dyn ReportSink>,
    counters: Arc<Counters>,
    pending: Option<Arc<Mutex<HashSet<String>>>>,
    verbose: bool,
    no_update: bool,
    fatal: FatalSlot,
}

#[async_trait]
impl JobHandler for IndexContext {
    async fn handle(&self, job: FileJob, checksummer: &mut Checksummer) {
        self.counters.files.fetch_add(1, Ordering::Relaxed);

        if self.verbose {
            info!("Indexing file: {}", job.path.display());
        }

        let existing = match self.store.find_by_key(&job.key) {
            Ok(existing) => existing,
            Err(err) => {
                park_fatal(&self.fatal, err);
                return;
            }
        };

        if existing.is_some() {
            if let Some(pending) = &self.pending {
                pending
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .remove(&job.key);
            }
        }

        match existing {
            None => {
                let fingerprint = match checksummer.fingerprint_file(&job.path).await {
                    Ok(fingerprint) => fingerprint,
                    Err(err) => {
                        warn!("Skipping '{}': {}", job.path.display(), err);
                        self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                };

                let content_type = self.classifier.detect(&job.path);
                let record = FileRecord::new(job.key.clone(), fingerprint, content_type);

                match self.store.insert(&record) {
                    Ok(_) => {
                        self.counters.created.fetch_add(1, Ordering::Relaxed);
                        self.counters.misses.fetch_add(1, Ordering::Relaxed);
                        emit(self.sink.as_ref(), Tag::Miss, &job.key);
                    }
                    Err(err) => park_fatal(&self.fatal, err),
                }
            }
            Some(mut record) => {
                if self.no_update {
                    self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                    return;
                }

                let fingerprint = match checksummer.fingerprint_file(&job.path).await {
                    Ok(fingerprint) => fingerprint,
                    Err(err) => {
                        warn!("Skipping '{}': {}", job.path.display(), err);
                        self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                };

                let content_type = self.classifier.detect(&job.path);

                if fingerprint == record.fingerprint {
                    self.counters.matches.fetch_add(1, Ordering::Relaxed);

                    // The classifier can change its mind without the
                    // content changing; that still counts as an update.
                    if content_type != record.content_type {
                        record.content_type = content_type;
                        record.updated_at = Some(Utc::now());
                        self.persist_update(&record);
                    }
                } else {
                    self.counters.diffs.fetch_add(1, Ordering::Relaxed);
                    emit(self.sink.as_ref(), Tag::Diff, &job.key);

                    record.fingerprint = fingerprint;
                    record.content_type = content_type;
                    record.updated_at = Some(Utc::now());
                    self.persist_update(&record);
                }
            }
        }
    }
}

impl IndexContext {
    fn persist_update(&self, record: &FileRecord) {
        match self.store.update(record) {
            Ok(true) => {
                self.counters.updated.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => warn!("Record for '{}' vanished during update", record.key),
            Err(err) => park_fatal(&self.fatal, err),
        }
    }
}

struct ValidateContext {
    store: Arc<IndexStore>,
    sink: Arc<dyn ReportSink>,
    counters: Arc<Counters>,
    verbose: bool,
    fatal: FatalSlot,
}

#[async_trait]
impl JobHandler for ValidateContext {
    async fn handle(&self, job: FileJob, checksummer: &mut Checksummer) {
        self.counters.files.fetch_add(1, Ordering::Relaxed);

        if self.verbose {
            info!("Validating file: {}", job.path.display());
        }

        let existing = match self.store.find_by_key(&job.key) {
            Ok(existing) => existing,
            Err(err) => {
                park_fatal(&self.fatal, err);
                return;
            }
        };

        match existing {
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                emit(self.sink.as_ref(), Tag::Miss, &job.key);
            }
            Some(record) => {
                let fingerprint = match checksummer.fingerprint_file(&job.path).await {
                    Ok(fingerprint) => fingerprint,
                    Err(err) => {
                        warn!("Skipping '{}': {}", job.path.display(), err);
                        self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                };

                if fingerprint == record.fingerprint {
                    self.counters.matches.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.counters.diffs.fetch_add(1, Ordering::Relaxed);
                    emit(self.sink.as_ref(), Tag::Diff, &job.key);
                }
            }
        }
    }
}

struct CompareContext {
    reference: Arc<TreeReference>,
    sink: Arc<dyn ReportSink>,
    counters: Arc<Counters>,
    verbose: bool,
    copy_on_diff: bool,
}

#[async_trait]
impl JobHandler for CompareContext {
    async fn handle(&self, job: FileJob, checksummer: &mut Checksummer) {
        self.counters.files.fetch_add(1, Ordering::Relaxed);

        if self.verbose {
            info!("Comparing file: {}", job.path.display());
        }

        let present = match self.reference.lookup(&job.key) {
            Ok(present) => present.is_some(),
            Err(err) => {
                warn!("Skipping '{}': {}", job.path.display(), err);
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        if !present {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            emit(self.sink.as_ref(), Tag::Miss, &job.key);

            if self.copy_on_diff {
                self.copy_to_reference(&job).await;
            }
            return;
        }

        let other_path = self.reference.absolute(&job.key);

        let base_fingerprint = match checksummer.fingerprint_file(&job.path).await {
            Ok(fingerprint) => fingerprint,
            Err(err) => {
                warn!("Skipping '{}': {}", job.path.display(), err);
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let other_fingerprint = match checksummer.fingerprint_file(&other_path).await {
            Ok(fingerprint) => fingerprint,
            Err(err) => {
                warn!("Skipping '{}': {}", other_path.display(), err);
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        if base_fingerprint == other_fingerprint {
            self.counters.matches.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.diffs.fetch_add(1, Ordering::Relaxed);
            emit(self.sink.as_ref(), Tag::Diff, &job.key);

            if self.copy_on_diff {
                self.copy_to_reference(&job).await;
            }
        }
    }
}

impl CompareContext {
    async fn copy_to_reference(&self, job: &FileJob) {
        let destination = self.reference.absolute(&job.key);

        match copy_file(&job.path, &destination).await {
            Ok(()) => {
                self.counters.copied.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                error!("{}", err);
                put(self.sink.as_ref(), &format!("COPY FAILED: {}", job.key));
            }
        }
    }
}
