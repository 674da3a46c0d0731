//! Run coordination: index building, correlation, reporting, tagging.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use humansize::{format_size, BINARY};
use rayon::prelude::*;
use tracing::{debug, error, info};

use crate::correlate::mode::NATIVE_FROM_LINE_VERSION;
use crate::correlate::{
    CorrelationEngine, CorrelationResult, ExtractionMode, FormatVersion, LabelGrouper, Outcome,
};
use crate::error::{Result, XrefError};
use crate::host::{
    emails_in_containers_query, mbox_container_query, BulkAnnotator, CaseStore, ProgressSink,
    EMAIL_QUERY,
};
use crate::index::{MboxXrefBuilder, XmlDocumentIndex};
use crate::model::item::Item;
use crate::report::StatusCsvWriter;

/// File name stem shared by every artifact of a run.
const ARTIFACT_STEM: &str = "AssociateGoogleEmailData";

/// Timestamp prefix of run artifacts.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H-%M-%S";

/// Output files of one run, all inside the log directory.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub log_directory: PathBuf,
    pub log_file: PathBuf,
    pub xref_csv: PathBuf,
    pub status_csv: PathBuf,
}

impl RunPaths {
    /// Create the log directory and name this run's artifacts.
    pub fn prepare(log_directory: &Path) -> Result<Self> {
        if log_directory.as_os_str().is_empty() {
            return Err(XrefError::Setup("log directory must not be empty".into()));
        }
        std::fs::create_dir_all(log_directory).map_err(|e| {
            XrefError::Setup(format!(
                "cannot create log directory '{}': {e}",
                log_directory.display()
            ))
        })?;
        let stamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        Ok(Self::with_timestamp(log_directory, &stamp))
    }

    pub fn with_timestamp(log_directory: &Path, stamp: &str) -> Self {
        let name = |suffix: &str| log_directory.join(format!("{stamp}_{ARTIFACT_STEM}{suffix}"));
        Self {
            log_directory: log_directory.to_path_buf(),
            log_file: name("Log.txt"),
            xref_csv: name("Xref.csv"),
            status_csv: name("PerItemStatus.csv"),
        }
    }
}

/// Settings for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub xml_files: Vec<PathBuf>,
    /// Explicit MBOX containers for the legacy xref. When empty, the case's
    /// MBOX items are used.
    pub mbox_files: Vec<PathBuf>,
    /// Restrict the run to emails inside these MBOX container items.
    pub selected_mbox_guids: Vec<String>,
    pub apply_label_tags: bool,
    pub tag_prefix: String,
    /// Force legacy resolution for data processed before format 7.4.
    pub data_is_pre_74: bool,
    pub host_version: FormatVersion,
    /// Correlation worker threads; 1 keeps report rows in item order.
    pub workers: usize,
    pub read_buffer_size: Option<usize>,
    pub paths: RunPaths,
}

/// Aggregate counters. Monotonic within a run, safe to bump from any worker.
#[derive(Debug, Default)]
pub struct RunCounters {
    errors: AtomicU64,
    warnings: AtomicU64,
    matches: AtomicU64,
    skipped_attached: AtomicU64,
}

/// Point-in-time copy of [`RunCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub errors: u64,
    pub warnings: u64,
    pub matches: u64,
    pub skipped_attached: u64,
}

impl fmt::Display for CounterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Errors: {}, Warnings: {}, Matches: {}, Skipped Attached Emails: {}",
            self.errors, self.warnings, self.matches, self.skipped_attached
        )
    }
}

impl RunCounters {
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
            skipped_attached: self.skipped_attached.load(Ordering::Relaxed),
        }
    }

    fn bump(&self, counter: &AtomicU64, progress: &dyn ProgressSink) {
        counter.fetch_add(1, Ordering::Relaxed);
        progress.set_substatus(&self.snapshot().to_string());
    }

    pub fn error(&self, progress: &dyn ProgressSink) {
        self.bump(&self.errors, progress);
    }

    pub fn warning(&self, progress: &dyn ProgressSink) {
        self.bump(&self.warnings, progress);
    }

    /// Count one correlation outcome.
    pub fn outcome(&self, outcome: Outcome, progress: &dyn ProgressSink) {
        if outcome.is_success() {
            self.bump(&self.matches, progress);
        } else if outcome.is_warning() {
            self.bump(&self.warnings, progress);
        } else {
            self.bump(&self.skipped_attached, progress);
        }
    }
}

/// What a finished run produced.
#[derive(Debug)]
pub struct RunReport {
    pub mode: ExtractionMode,
    pub counters: CounterSnapshot,
    pub elapsed: Duration,
    pub documents: usize,
    pub xref_records: usize,
    /// Per-item results in completion order, the same order as the status CSV rows.
    pub results: Vec<CorrelationResult>,
    pub status_csv: Option<PathBuf>,
    pub xref_csv: Option<PathBuf>,
}

/// Sequences a whole run against injected host collaborators.
pub struct RunCoordinator<'a> {
    options: RunOptions,
    case: &'a mut dyn CaseStore,
    annotator: &'a mut dyn BulkAnnotator,
    progress: &'a dyn ProgressSink,
    counters: RunCounters,
}

impl<'a> RunCoordinator<'a> {
    pub fn new(
        options: RunOptions,
        case: &'a mut dyn CaseStore,
        annotator: &'a mut dyn BulkAnnotator,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            options,
            case,
            annotator,
            progress,
            counters: RunCounters::default(),
        }
    }

    /// Execute the run.
    ///
    /// Only setup failures (no parsable XML, no worker pool, unwritable
    /// status report) are returned as errors; everything per file or per
    /// item is logged and counted.
    pub fn run(mut self) -> Result<RunReport> {
        let started = Instant::now();
        let progress = self.progress;
        progress.set_substatus(&self.counters.snapshot().to_string());
        progress.log(&format!(
            "Logging output to: {}",
            self.options.paths.log_file.display()
        ));

        let index = self.build_document_index()?;

        let mode = ExtractionMode::select(&self.options.host_version, self.options.data_is_pre_74);
        if self
            .options
            .host_version
            .is_at_least(&NATIVE_FROM_LINE_VERSION)
        {
            progress.log(&format!(
                "Detected host format version {} (7.4 or higher)",
                self.options.host_version
            ));
        }
        if self.options.data_is_pre_74 {
            progress.log("Forcing legacy MBOX xref resolution for data processed before 7.4");
        }
        info!(%mode, "Extraction mode selected");

        let mut report = RunReport {
            mode,
            counters: CounterSnapshot::default(),
            elapsed: Duration::ZERO,
            documents: index.document_count(),
            xref_records: 0,
            results: Vec::new(),
            status_csv: None,
            xref_csv: None,
        };

        let xref = match mode {
            ExtractionMode::Native => {
                progress.set_main_status(
                    "Host format 7.4 or higher, skipping xref build from MBOX files...",
                );
                None
            }
            ExtractionMode::Legacy => {
                progress.set_main_status("Extracting Xref from MBOX Files...");
                let containers = self.locate_containers();
                if containers.is_empty() {
                    progress.log("Case contains no MBOX (application/mbox) items");
                    self.counters.warning(progress);
                    return Ok(self.finish(report, started));
                }
                let xref = self.build_xref(&containers);
                report.xref_records = xref.size();
                progress.log(&format!("Saving Xref CSV: {}", self.options.paths.xref_csv.display()));
                match xref.save(&self.options.paths.xref_csv) {
                    Ok(()) => report.xref_csv = Some(self.options.paths.xref_csv.clone()),
                    Err(e) => {
                        progress.log(&format!("!!! Error while saving Xref CSV: {e}"));
                        self.counters.error(progress);
                    }
                }
                Some(xref)
            }
        };

        let engine = match &xref {
            Some(xref) => CorrelationEngine::legacy(xref, &index),
            None => CorrelationEngine::native(&index),
        };

        let mut items = self.find_email_items();
        let (results, grouper) = self.correlate(&engine, &mut items)?;
        report.status_csv = Some(self.options.paths.status_csv.clone());
        report.results = results;
        progress.log(&format!(
            "Matched Email Items: {}",
            self.counters.snapshot().matches
        ));

        let matched_guids: HashSet<&str> = report
            .results
            .iter()
            .filter(|r| r.success())
            .map(|r| r.item_guid.as_str())
            .collect();
        let matched: Vec<Item> = items
            .into_iter()
            .filter(|item| matched_guids.contains(item.guid.as_str()))
            .collect();
        if let Err(e) = self.case.save_custom_metadata(&matched) {
            progress.log(&format!("!!! Error while saving custom metadata: {e}"));
            self.counters.error(progress);
        }

        if self.options.apply_label_tags {
            self.apply_label_tags(grouper);
        }

        Ok(self.finish(report, started))
    }

    fn build_document_index(&self) -> Result<XmlDocumentIndex> {
        let progress = self.progress;
        progress.set_main_status("Parsing XML files...");
        let mut index = XmlDocumentIndex::new();
        let mut failed = 0usize;

        for path in &self.options.xml_files {
            progress.log(&format!("Parsing: {}", path.display()));
            match index.parse(path) {
                Ok(file_report) => {
                    for tag_error in &file_report.tag_errors {
                        progress.log(&format!(
                            "!!! Error in XML file '{}': {tag_error}",
                            path.display()
                        ));
                        self.counters.error(progress);
                    }
                }
                Err(e) => {
                    progress.log(&format!(
                        "!!! Error while parsing XML file '{}':",
                        path.display()
                    ));
                    progress.log(&e.to_string());
                    self.counters.error(progress);
                    failed += 1;
                }
            }
        }

        if failed == self.options.xml_files.len() {
            error!(failed, "No XML file could be parsed");
            return Err(XrefError::NoXmlParsed { failed });
        }

        progress.log(&format!("Total Document Nodes Parsed: {}", index.nodes_parsed()));
        progress.log("Distinct 'TagName' Values:");
        for name in index.distinct_tag_names() {
            progress.log(&format!("\t{name}"));
        }
        Ok(index)
    }

    /// MBOX containers feeding the legacy xref, as `(display name, path)`.
    fn locate_containers(&self) -> Vec<(String, PathBuf)> {
        if !self.options.mbox_files.is_empty() {
            return self
                .options
                .mbox_files
                .iter()
                .map(|p| (p.display().to_string(), p.clone()))
                .collect();
        }

        let progress = self.progress;
        let items = match self.case.search(&mbox_container_query()) {
            Ok(items) => items,
            Err(e) => {
                progress.log(&format!("!!! Error while searching for MBOX items: {e}"));
                self.counters.error(progress);
                return Vec::new();
            }
        };

        let selected = &self.options.selected_mbox_guids;
        items
            .into_iter()
            .filter(|item| selected.is_empty() || selected.contains(&item.guid))
            .filter_map(|item| match item.binary_path {
                Some(path) => Some((item.localised_name, path)),
                None => {
                    progress.log(&format!(
                        "!!! Error: MBOX item '{}' ({}) has no readable binary",
                        item.localised_name, item.guid
                    ));
                    self.counters.error(progress);
                    None
                }
            })
            .collect()
    }

    fn build_xref(&self, containers: &[(String, PathBuf)]) -> MboxXrefBuilder {
        let progress = self.progress;
        let mut xref = MboxXrefBuilder::new();
        if let Some(size) = self.options.read_buffer_size {
            xref = xref.with_read_buffer_size(size);
        }

        let total = containers.len() as u64;
        progress.set_progress(0, total);
        for (i, (name, path)) in containers.iter().enumerate() {
            progress.set_progress(i as u64 + 1, total);
            let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            progress.log(&format!(
                "  Processing MBOX: {name} ({})",
                format_size(size, BINARY)
            ));
            if let Err(e) = xref.build_from_path(path, None) {
                progress.log(&format!("!!! Error while parsing MBOX '{name}':"));
                progress.log(&e.to_string());
                self.counters.error(progress);
            }
        }
        progress.log(&format!("MBox Xref Records Found: {}", xref.size()));
        xref
    }

    fn find_email_items(&self) -> Vec<Item> {
        let progress = self.progress;
        let selected = &self.options.selected_mbox_guids;
        let query = if selected.is_empty() {
            progress.set_main_status("Finding Email Items...");
            EMAIL_QUERY.to_string()
        } else {
            let query = emails_in_containers_query(selected);
            progress.log(&format!("Query: {query}"));
            progress.set_main_status(&format!(
                "Finding Email Items for {} selected MBOX items...",
                selected.len()
            ));
            query
        };

        match self.case.search(&query) {
            Ok(items) => {
                progress.log(&format!("Email Item Count: {}", items.len()));
                items
            }
            Err(e) => {
                progress.log(&format!("!!! Error while searching for email items: {e}"));
                self.counters.error(progress);
                Vec::new()
            }
        }
    }

    /// Resolve every item, writing one status row per item as it completes.
    fn correlate(
        &self,
        engine: &CorrelationEngine<'_>,
        items: &mut [Item],
    ) -> Result<(Vec<CorrelationResult>, LabelGrouper)> {
        let progress = self.progress;
        let counters = &self.counters;
        let total = items.len() as u64;
        progress.set_main_status("Correlating Email Items...");
        progress.set_progress(0, total);

        // Rows and results share one lock so both come out in the same order.
        let ledger = Mutex::new((
            StatusCsvWriter::create(&self.options.paths.status_csv)?,
            Vec::with_capacity(items.len()),
        ));
        let grouper = Mutex::new(LabelGrouper::new());
        let done = AtomicU64::new(0);

        let process = |item: &mut Item| {
            let result = engine.resolve(item);
            counters.outcome(result.outcome, progress);
            log_disposition(progress, &result);

            if result.success() {
                lock(&grouper).add_all(&result.labels, &result.item_guid);
            }
            let mut guard = lock(&ledger);
            if let Err(e) = guard.0.write_result(&result) {
                progress.log(&format!("!!! Error while writing status row: {e}"));
                counters.error(progress);
            }
            guard.1.push(result);
            drop(guard);
            progress.set_progress(done.fetch_add(1, Ordering::Relaxed) + 1, total);
        };

        let workers = self.options.workers.max(1);
        if workers == 1 {
            items.iter_mut().for_each(process);
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| XrefError::Setup(format!("cannot start worker pool: {e}")))?;
            debug!(workers, "Correlating in parallel");
            pool.install(|| items.par_iter_mut().for_each(process));
        }

        let (status, results) = ledger.into_inner().unwrap_or_else(|e| e.into_inner());
        let rows = status.rows();
        status.finish()?;
        info!(rows, path = %self.options.paths.status_csv.display(), "Status report written");

        Ok((
            results,
            grouper.into_inner().unwrap_or_else(|e| e.into_inner()),
        ))
    }

    fn apply_label_tags(&mut self, mut grouper: LabelGrouper) {
        let progress = self.progress;
        progress.set_main_status("Applying Labels as Tags...");
        for (tag, guids) in grouper.flush(&self.options.tag_prefix) {
            progress.log(&format!(
                "\tApplying tag '{tag}' to {} items...",
                guids.len()
            ));
            if let Err(e) = self.annotator.add_tag(&tag, &guids) {
                progress.log(&format!("!!! Error while applying tag '{tag}': {e}"));
                self.counters.error(progress);
            }
        }
    }

    fn finish(self, mut report: RunReport, started: Instant) -> RunReport {
        let progress = self.progress;
        report.elapsed = started.elapsed();
        report.counters = self.counters.snapshot();
        progress.set_main_status(&format!("Completed {}", format_elapsed(report.elapsed)));
        progress.set_progress(1, 1);
        progress.set_substatus(&report.counters.to_string());
        progress.log(&report.counters.to_string());
        report
    }
}

fn log_disposition(progress: &dyn ProgressSink, result: &CorrelationResult) {
    match result.outcome {
        Outcome::Matched => {}
        Outcome::NoMessageId | Outcome::NoMboxFromLineProperty => {
            progress.log(&result.issue_message);
        }
        _ => {
            progress.log(&result.issue_message);
            progress.log(&format!("\tGUID: {}", result.item_guid));
            progress.log(&format!("\tMessage-ID: {}", result.message_id_column()));
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// `HH:MM:SS` rendering of a run duration.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
