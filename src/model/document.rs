//! Export documents and the typed tags attached to them.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::{Result, XrefError};

/// chrono rendering of the export's `yyyy-MM-dd'T'HH:mm:ss.SSSZ` pattern.
pub const DATE_TIME_PATTERN: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// Separator used by `List` tag values and the `Labels` tag.
pub const LIST_SEPARATOR: char = ',';

/// How a tag's raw value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagDataType {
    String,
    DateTime,
    List,
}

impl TagDataType {
    /// Map the export's `TagDataType` attribute to a data type.
    ///
    /// `Text` and `String` are plain strings; unknown types are kept as strings.
    pub fn from_export(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "datetime" => Self::DateTime,
            "list" => Self::List,
            _ => Self::String,
        }
    }
}

/// A typed value, both as parsed from a tag and as written to custom metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum MetadataValue {
    Text(String),
    DateTime(DateTime<FixedOffset>),
    List(Vec<String>),
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::DateTime(dt) => write!(f, "{}", dt.format(DATE_TIME_PATTERN)),
            Self::List(items) => f.write_str(&items.join(", ")),
        }
    }
}

/// One metadata annotation from a `Tag` node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub data_type: TagDataType,
    pub value: MetadataValue,
}

impl Tag {
    /// Convert a raw tag according to its data type.
    ///
    /// Fails only for `DateTime` values that do not match [`DATE_TIME_PATTERN`].
    pub fn parse(name: &str, data_type: TagDataType, raw_value: &str) -> Result<Self> {
        let value = match data_type {
            TagDataType::String => MetadataValue::Text(raw_value.to_string()),
            TagDataType::DateTime => {
                let parsed = parse_export_date_time(raw_value).ok_or_else(|| {
                    XrefError::InvalidDateTime {
                        tag: name.to_string(),
                        value: raw_value.to_string(),
                    }
                })?;
                MetadataValue::DateTime(parsed)
            }
            TagDataType::List => MetadataValue::List(split_list(raw_value)),
        };
        Ok(Self {
            name: name.to_string(),
            data_type,
            value,
        })
    }
}

/// Parse a timestamp in the export's fixed pattern.
///
/// A trailing `Z` is read as `+0000`, as the exporter writes UTC that way.
pub fn parse_export_date_time(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    let normalized;
    let input = match raw.strip_suffix('Z') {
        Some(stem) => {
            normalized = format!("{stem}+0000");
            normalized.as_str()
        }
        None => raw,
    };
    DateTime::parse_from_str(input, DATE_TIME_PATTERN).ok()
}

/// Split a delimiter-joined value, trimming entries and dropping empties.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(LIST_SEPARATOR)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Everything the export knows about one external file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Name of the external file, equal to the MBOX `From ` identifier.
    pub external_file_name: String,
    pub labels: BTreeSet<String>,
    pub tags: Vec<Tag>,
}

impl Document {
    pub fn new(external_file_name: impl Into<String>) -> Self {
        Self {
            external_file_name: external_file_name.into(),
            labels: BTreeSet::new(),
            tags: Vec::new(),
        }
    }

    /// Union another record for the same file into this one.
    ///
    /// Labels are a set union; tags are appended unless an identical tag is
    /// already present, so nothing recorded earlier is overwritten.
    pub fn merge(&mut self, other: Document) {
        debug_assert_eq!(self.external_file_name, other.external_file_name);
        self.labels.extend(other.labels);
        for tag in other.tags {
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
    }
}
