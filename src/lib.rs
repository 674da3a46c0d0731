//! `takeout-xref`: attach Google Takeout mail metadata to case email items.
//!
//! A Takeout export ships MBOX containers next to XML files describing each
//! message (labels, dates, custom tags). This crate parses the XML, resolves
//! every email item of a case back to the MBOX boundary it came from, copies
//! the matching document's tags into the item's custom metadata, and applies
//! the Gmail labels as tags.

pub mod config;
pub mod correlate;
pub mod error;
pub mod host;
pub mod index;
pub mod model;
pub mod parser;
pub mod report;
pub mod run;
