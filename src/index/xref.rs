//! MBOX `From ` identifier to `Message-ID` cross-reference.
//!
//! Exports written before host format 7.4 carry no per-item record of the
//! MBOX boundary an email came from, so the link between an email's
//! `Message-ID` and the export's external file name is rebuilt here by
//! scanning the containers themselves.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::model::xref::MboxXrefRecord;
use crate::parser::header::{normalize_message_id, parse_xref_headers};
use crate::parser::mbox::{scan_headers, MboxParser, DEFAULT_READ_BUFFER_SIZE};
use crate::report;

/// Accumulates xref records across any number of MBOX containers.
///
/// Records are kept in scan order. Lookups go through a `Message-ID` map in
/// which the most recently scanned record wins.
#[derive(Debug, Default)]
pub struct MboxXrefBuilder {
    records: Vec<MboxXrefRecord>,
    by_message_id: HashMap<String, usize>,
    read_buffer_size: Option<usize>,
}

impl MboxXrefBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read buffer size used by [`build_from_path`](Self::build_from_path).
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = Some(size);
        self
    }

    /// Scan one MBOX container file and append its records.
    ///
    /// Returns the number of records this container contributed.
    pub fn build_from_path(
        &mut self,
        path: &Path,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<usize> {
        let parser = MboxParser::new(path)?
            .with_read_buffer_size(self.read_buffer_size.unwrap_or(DEFAULT_READ_BUFFER_SIZE));
        info!(path = %path.display(), size = parser.file_size(), "Scanning MBOX for xref");

        let before = self.records.len();
        let mut skipped = 0usize;
        parser.parse_headers_only(
            &mut |offset, _length, headers| {
                if !self.push_headers(headers) {
                    skipped += 1;
                    debug!(offset, "Message without From id or Message-ID");
                }
                true
            },
            progress,
        )?;
        self.log_container_done(path.display().to_string(), before, skipped);
        Ok(self.records.len() - before)
    }

    /// Scan one MBOX container from any buffered reader.
    pub fn build<R: BufRead>(&mut self, name: &str, reader: R) -> std::io::Result<usize> {
        let before = self.records.len();
        let mut skipped = 0usize;
        scan_headers(
            reader,
            0,
            &mut |_offset, _length, headers| {
                if !self.push_headers(headers) {
                    skipped += 1;
                }
                true
            },
            None,
        )?;
        self.log_container_done(name.to_string(), before, skipped);
        Ok(self.records.len() - before)
    }

    /// Look up the `From ` identifier for a `Message-ID`.
    ///
    /// Angle brackets and surrounding whitespace are ignored.
    pub fn from_id_for(&self, message_id: &str) -> Option<&str> {
        let key = normalize_message_id(message_id);
        self.by_message_id
            .get(&key)
            .map(|&idx| self.records[idx].from_id.as_str())
    }

    /// Number of records collected so far.
    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in scan order.
    pub fn records(&self) -> &[MboxXrefRecord] {
        &self.records
    }

    /// Write every record as CSV with header `From,Message-ID`.
    pub fn save(&self, path: &Path) -> Result<()> {
        report::csv::write_xref_csv(path, &self.records)
    }

    /// Append one record. A later record with the same `Message-ID`
    /// replaces the earlier one for lookups.
    pub fn insert(&mut self, record: MboxXrefRecord) {
        let idx = self.records.len();
        if let Some(previous) = self.by_message_id.insert(record.message_id.clone(), idx) {
            let prev = &self.records[previous];
            if prev.from_id != record.from_id {
                warn!(
                    message_id = %record.message_id,
                    previous = %prev.from_id,
                    replacement = %record.from_id,
                    "Duplicate Message-ID in MBOX xref, keeping the latest"
                );
            }
        }
        self.records.push(record);
    }

    fn push_headers(&mut self, headers: &[u8]) -> bool {
        match parse_xref_headers(headers) {
            Some((from_id, message_id)) => {
                self.insert(MboxXrefRecord {
                    from_id,
                    message_id,
                });
                true
            }
            None => false,
        }
    }

    fn log_container_done(&self, name: String, before: usize, skipped: usize) {
        let added = self.records.len() - before;
        if added == 0 {
            warn!(container = %name, "No xref records found in container");
        }
        info!(
            container = %name,
            records = added,
            skipped,
            total = self.records.len(),
            "Xref container scanned"
        );
    }
}
