//! Per-item correlation: item → Message-ID → `From ` id → export document.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::mode::ExtractionMode;
use crate::index::{MboxXrefBuilder, XmlDocumentIndex};
use crate::model::document::MetadataValue;
use crate::model::item::{Item, FIELD_EXTERNAL_FILE_NAME, PROP_MBOX_FROM_LINE, PROP_MESSAGE_ID};

/// Captured `MBOX From Line` property → container-relative identifier.
static FROM_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^From ([0-9]+-[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}\.mbox).*$",
    )
    .expect("valid MBOX From Line pattern")
});

const NO_MESSAGE_ID_COLUMN: &str = "No Message ID Property";
const UNRESOLVED_FROM_LINE_COLUMN: &str = "Unable to resolve From line";

/// Terminal state of one item's correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Matched,
    NoMessageId,
    NoFromId,
    NoMboxFromLineProperty,
    NoDocument,
    SkippedAttachedNoFromId,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        self == Self::Matched
    }

    /// Outcomes counted as warnings. Attached emails are counted separately.
    pub fn is_warning(self) -> bool {
        matches!(
            self,
            Self::NoMessageId | Self::NoFromId | Self::NoMboxFromLineProperty | Self::NoDocument
        )
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Matched => "matched",
            Self::NoMessageId => "no Message-ID",
            Self::NoFromId => "no MBOX id",
            Self::NoMboxFromLineProperty => "no MBOX From Line property",
            Self::NoDocument => "no XML document",
            Self::SkippedAttachedNoFromId => "attached email without MBOX id",
        };
        f.write_str(s)
    }
}

/// Disposition of one item. Created once, never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub item_guid: String,
    pub item_name: String,
    pub message_id: Option<String>,
    pub resolved_from_id: Option<String>,
    pub outcome: Outcome,
    pub issue_message: String,
    /// Labels of the matched document; empty unless `Matched`.
    pub labels: Vec<String>,
}

impl CorrelationResult {
    pub fn success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Value of the status report's `Item Message ID` column.
    pub fn message_id_column(&self) -> &str {
        self.message_id.as_deref().unwrap_or(NO_MESSAGE_ID_COLUMN)
    }

    /// Value of the status report's `Resolved From Line` column.
    pub fn from_line_column(&self) -> &str {
        match (&self.resolved_from_id, self.outcome) {
            (Some(id), _) => id,
            (None, Outcome::NoFromId | Outcome::SkippedAttachedNoFromId) => {
                UNRESOLVED_FROM_LINE_COLUMN
            }
            (None, _) => "",
        }
    }
}

/// Where `From ` identifiers come from for this run.
#[derive(Debug, Clone, Copy)]
enum Resolver<'a> {
    Legacy(&'a MboxXrefBuilder),
    Native,
}

/// Resolves items against the read-only indices.
///
/// Holds only shared references, so one engine can serve every worker thread.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationEngine<'a> {
    resolver: Resolver<'a>,
    index: &'a XmlDocumentIndex,
}

impl<'a> CorrelationEngine<'a> {
    /// Engine resolving through a previously built MBOX xref.
    pub fn legacy(xref: &'a MboxXrefBuilder, index: &'a XmlDocumentIndex) -> Self {
        Self {
            resolver: Resolver::Legacy(xref),
            index,
        }
    }

    /// Engine resolving through each item's `MBOX From Line` property.
    pub fn native(index: &'a XmlDocumentIndex) -> Self {
        Self {
            resolver: Resolver::Native,
            index,
        }
    }

    pub fn mode(&self) -> ExtractionMode {
        match self.resolver {
            Resolver::Legacy(_) => ExtractionMode::Legacy,
            Resolver::Native => ExtractionMode::Native,
        }
    }

    /// Correlate one item.
    ///
    /// On `Matched`, the item's custom metadata gains `XmlExternalFileName`
    /// and one field per document tag. Writing the same values again is a
    /// no-op, so resolving an item twice gives the same result.
    pub fn resolve(&self, item: &mut Item) -> CorrelationResult {
        let mut result = CorrelationResult {
            item_guid: item.guid.clone(),
            item_name: item.localised_name.clone(),
            message_id: None,
            resolved_from_id: None,
            outcome: Outcome::Matched,
            issue_message: String::new(),
            labels: Vec::new(),
        };

        let Some(message_id) = item.property(PROP_MESSAGE_ID).map(str::to_string) else {
            return self.terminal(
                result,
                Outcome::NoMessageId,
                format!("!!! WARNING: Skipping item without 'Message-ID': {}", item.guid),
            );
        };
        result.message_id = Some(message_id.clone());

        let from_id = match self.resolver {
            Resolver::Legacy(xref) => xref.from_id_for(&message_id).map(str::to_string),
            Resolver::Native => {
                let Some(from_line) = item.property(PROP_MBOX_FROM_LINE) else {
                    return self.terminal(
                        result,
                        Outcome::NoMboxFromLineProperty,
                        format!(
                            "!!! WARNING: Skipping item without 'MBOX From Line' property: {}, data may have been processed in version before 7.4",
                            item.guid
                        ),
                    );
                };
                let extracted = extract_from_line_id(from_line);
                if extracted.is_none() {
                    debug!(guid = %item.guid, from_line, "MBOX From Line does not carry an MBOX id");
                }
                extracted
            }
        };

        let Some(from_id) = from_id else {
            return if item.is_top_level {
                self.terminal(
                    result,
                    Outcome::NoFromId,
                    "!!! WARNING: Skipping item without associated MBOX id".to_string(),
                )
            } else {
                self.terminal(
                    result,
                    Outcome::SkippedAttachedNoFromId,
                    "*** Skipping attached email item without associated MBOX id".to_string(),
                )
            };
        };
        result.resolved_from_id = Some(from_id.clone());

        let Some(document) = self.index.get(&from_id) else {
            return self.terminal(
                result,
                Outcome::NoDocument,
                "!!! WARNING: Skipping item without associated XML file".to_string(),
            );
        };

        item.custom_metadata.insert(
            FIELD_EXTERNAL_FILE_NAME.to_string(),
            MetadataValue::Text(from_id),
        );
        for tag in &document.tags {
            item.custom_metadata
                .insert(tag.name.clone(), tag.value.clone());
        }
        result.labels = document.labels.iter().cloned().collect();
        debug!(
            guid = %item.guid,
            file_name = %document.external_file_name,
            tags = document.tags.len(),
            labels = result.labels.len(),
            "Matched item to export document"
        );
        result
    }

    fn terminal(
        &self,
        mut result: CorrelationResult,
        outcome: Outcome,
        issue_message: String,
    ) -> CorrelationResult {
        let message_id = result.message_id.as_deref().unwrap_or("");
        debug!(guid = %result.item_guid, message_id, %outcome, "{issue_message}");
        result.outcome = outcome;
        result.issue_message = issue_message;
        result
    }
}

/// Pull the container-relative identifier out of a captured separator line.
pub fn extract_from_line_id(from_line: &str) -> Option<String> {
    FROM_LINE
        .captures(from_line.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_line_id() {
        assert_eq!(
            extract_from_line_id(
                "From 12-aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee.mbox@xxx Mon Jan 01 00:00:00 +0000 2018"
            )
            .as_deref(),
            Some("12-aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee.mbox")
        );
        assert_eq!(extract_from_line_id("From someone@example.com Mon Jan 01"), None);
        assert_eq!(
            extract_from_line_id("From 0-AAAAAAAA-bbbb-cccc-dddd-eeeeeeeeeeee.mbox"),
            None
        );
    }

    #[test]
    fn test_status_columns() {
        let mut result = CorrelationResult {
            item_guid: "g".into(),
            item_name: "n".into(),
            message_id: None,
            resolved_from_id: None,
            outcome: Outcome::NoMessageId,
            issue_message: String::new(),
            labels: Vec::new(),
        };
        assert_eq!(result.message_id_column(), "No Message ID Property");
        assert_eq!(result.from_line_column(), "");

        result.outcome = Outcome::SkippedAttachedNoFromId;
        assert_eq!(result.from_line_column(), "Unable to resolve From line");

        result.resolved_from_id = Some("f.mbox".into());
        result.outcome = Outcome::NoDocument;
        assert_eq!(result.from_line_column(), "f.mbox");
    }

    #[test]
    fn test_outcome_classification() {
        assert!(Outcome::Matched.is_success());
        assert!(Outcome::NoDocument.is_warning());
        assert!(!Outcome::SkippedAttachedNoFromId.is_warning());
        assert!(!Outcome::Matched.is_warning());
    }
}
