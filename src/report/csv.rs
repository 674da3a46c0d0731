//! CSV reports: the MBOX xref table and the per-item status ledger.
//!
//! Output is UTF-8 without BOM, RFC 4180 quoting, one `\n`-terminated row per
//! record, header row always present.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::correlate::CorrelationResult;
use crate::error::{Result, XrefError};
use crate::model::xref::MboxXrefRecord;

/// Header of the xref report.
pub const XREF_HEADER: [&str; 2] = ["From", "Message-ID"];

/// Header of the per-item status report.
pub const STATUS_HEADER: [&str; 6] = [
    "Item GUID",
    "Item Name",
    "Item Message ID",
    "Resolved From Line",
    "Success",
    "Issue Message",
];

/// Write the `From ` id ↔ `Message-ID` records.
pub fn write_xref_csv(path: &Path, records: &[MboxXrefRecord]) -> Result<()> {
    let file = File::create(path).map_err(|e| XrefError::io(path, e))?;
    let mut out = BufWriter::new(file);
    let write = |out: &mut BufWriter<File>| -> std::io::Result<()> {
        write_row(out, &XREF_HEADER)?;
        for record in records {
            write_row(out, &[&record.from_id, &record.message_id])?;
        }
        out.flush()
    };
    write(&mut out).map_err(|e| XrefError::io(path, e))
}

/// Write a complete status report in one go.
pub fn write_status_csv(path: &Path, results: &[CorrelationResult]) -> Result<()> {
    let mut writer = StatusCsvWriter::create(path)?;
    for result in results {
        writer.write_result(result)?;
    }
    writer.finish()
}

/// Streaming status report: rows are appended as items complete.
pub struct StatusCsvWriter {
    path: PathBuf,
    out: BufWriter<File>,
    rows: usize,
}

impl StatusCsvWriter {
    /// Create the file and write the header row.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| XrefError::io(path, e))?;
        let mut out = BufWriter::new(file);
        write_row(&mut out, &STATUS_HEADER).map_err(|e| XrefError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            out,
            rows: 0,
        })
    }

    pub fn write_result(&mut self, result: &CorrelationResult) -> Result<()> {
        let success = if result.success() { "true" } else { "false" };
        write_row(
            &mut self.out,
            &[
                result.item_guid.as_str(),
                result.item_name.as_str(),
                result.message_id_column(),
                result.from_line_column(),
                success,
                result.issue_message.as_str(),
            ],
        )
        .map_err(|e| XrefError::io(&self.path, e))?;
        self.rows += 1;
        Ok(())
    }

    /// Data rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn finish(mut self) -> Result<()> {
        self.out.flush().map_err(|e| XrefError::io(&self.path, e))
    }
}

/// One row of a status report read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub item_guid: String,
    pub item_name: String,
    pub message_id: String,
    pub resolved_from_line: String,
    pub success: bool,
    pub issue_message: String,
}

/// Read a status report written by [`StatusCsvWriter`].
pub fn read_status_csv(path: &Path) -> Result<Vec<StatusRow>> {
    let content = std::fs::read_to_string(path).map_err(|e| XrefError::io(path, e))?;
    let mut records = parse_csv(&content).into_iter();

    match records.next() {
        Some(header) if header == STATUS_HEADER => {}
        Some(header) => {
            return Err(XrefError::Report(format!(
                "{}: unexpected status header {:?}",
                path.display(),
                header
            )))
        }
        None => {
            return Err(XrefError::Report(format!(
                "{}: empty status report",
                path.display()
            )))
        }
    }

    records
        .enumerate()
        .map(|(i, fields)| {
            let [item_guid, item_name, message_id, resolved_from_line, success, issue_message]: [String; 6] =
                fields.try_into().map_err(|f: Vec<String>| {
                    XrefError::Report(format!(
                        "{}: row {} has {} fields, expected 6",
                        path.display(),
                        i + 2,
                        f.len()
                    ))
                })?;
            Ok(StatusRow {
                item_guid,
                item_name,
                message_id,
                resolved_from_line,
                success: success == "true",
                issue_message,
            })
        })
        .collect()
}

fn write_row<W: Write, S: AsRef<str>>(out: &mut W, fields: &[S]) -> std::io::Result<()> {
    let row = fields
        .iter()
        .map(|f| csv_escape(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(out, "{row}")
}

/// Escape a value for CSV (RFC 4180).
///
/// Wraps in double quotes if the value contains commas, quotes, or newlines.
fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Split RFC 4180 content into records. Quoted fields may span lines.
fn parse_csv(content: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_escape_simple() {
        assert_eq!(csv_escape("hello"), "hello");
    }

    #[test]
    fn test_csv_escape_comma() {
        assert_eq!(csv_escape("hello, world"), "\"hello, world\"");
    }

    #[test]
    fn test_csv_escape_quotes() {
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_csv_escape_newline() {
        assert_eq!(csv_escape("line1\nline2"), "\"line1\nline2\"");
    }

    #[test]
    fn test_parse_csv_quoted_fields() {
        let records = parse_csv("a,\"b, c\",\"say \"\"hi\"\"\"\r\n\"multi\nline\",,x\n");
        assert_eq!(
            records,
            vec![
                vec!["a".to_string(), "b, c".to_string(), "say \"hi\"".to_string()],
                vec!["multi\nline".to_string(), String::new(), "x".to_string()],
            ]
        );
    }

    #[test]
    fn test_xref_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xref.csv");
        write_xref_csv(
            &path,
            &[MboxXrefRecord {
                from_id: "0-a.mbox".into(),
                message_id: "m,1@x".into(),
            }],
        )
        .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "From,Message-ID\n0-a.mbox,\"m,1@x\"\n");
    }
}
