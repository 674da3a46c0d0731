//! Durable run reports.

pub mod csv;

pub use self::csv::{read_status_csv, write_status_csv, write_xref_csv, StatusCsvWriter, StatusRow};
