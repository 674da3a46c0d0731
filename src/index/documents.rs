//! Document index built from one or more export XML files.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Result, XrefError};
use crate::model::document::Document;
use crate::parser::xml::parse_export;

/// Summary of one successfully parsed XML file.
#[derive(Debug, Default)]
pub struct XmlFileReport {
    /// `Document` nodes read from the file.
    pub documents: usize,
    /// Documents whose external file name was already indexed.
    pub merged: usize,
    /// Tags dropped because their value could not be converted.
    pub tag_errors: Vec<XrefError>,
}

/// Documents keyed by external file name, merged across files.
///
/// Parsing is incremental: call [`parse`](Self::parse) once per file. A file
/// that fails to parse contributes nothing; documents from other files are
/// unaffected.
#[derive(Debug, Default)]
pub struct XmlDocumentIndex {
    documents: Vec<Document>,
    by_file_name: HashMap<String, usize>,
    tag_names: BTreeSet<String>,
    nodes_parsed: usize,
}

impl XmlDocumentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one XML export file and merge its documents.
    pub fn parse(&mut self, path: &Path) -> Result<XmlFileReport> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                XrefError::FileNotFound(path.to_path_buf())
            } else {
                XrefError::io(path, e)
            }
        })?;
        self.parse_reader(BufReader::new(file), path)
    }

    /// Parse an export from any buffered reader; `path` is used for errors.
    pub fn parse_reader<R: BufRead>(&mut self, reader: R, path: &Path) -> Result<XmlFileReport> {
        let parsed = parse_export(reader, path)?;

        let mut report = XmlFileReport {
            documents: parsed.documents.len(),
            tag_errors: parsed.tag_errors,
            ..Default::default()
        };

        for doc in parsed.documents {
            self.tag_names
                .extend(doc.tags.iter().map(|t| t.name.clone()));
            match self.by_file_name.get(&doc.external_file_name) {
                Some(&idx) => {
                    debug!(file_name = %doc.external_file_name, "Merging repeated document");
                    self.documents[idx].merge(doc);
                    report.merged += 1;
                }
                None => {
                    self.by_file_name
                        .insert(doc.external_file_name.clone(), self.documents.len());
                    self.documents.push(doc);
                }
            }
        }
        self.nodes_parsed += report.documents;

        info!(
            path = %path.display(),
            documents = report.documents,
            merged = report.merged,
            tag_errors = report.tag_errors.len(),
            "Parsed XML export"
        );
        Ok(report)
    }

    /// Exact lookup by external file name.
    pub fn get(&self, external_file_name: &str) -> Option<&Document> {
        self.by_file_name
            .get(external_file_name)
            .map(|&idx| &self.documents[idx])
    }

    /// Distinct documents, in first-seen order.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Number of distinct external file names.
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Total `Document` nodes read, counting repeats.
    pub fn nodes_parsed(&self) -> usize {
        self.nodes_parsed
    }

    /// Every tag name seen in any document, sorted.
    pub fn distinct_tag_names(&self) -> &BTreeSet<String> {
        &self.tag_names
    }
}
