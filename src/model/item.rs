//! Case items as seen through the host case store.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::document::MetadataValue;

/// Item property holding the RFC 5322 `Message-ID`.
pub const PROP_MESSAGE_ID: &str = "Message-ID";

/// Item property holding the captured MBOX separator line (7.4+ processing).
pub const PROP_MBOX_FROM_LINE: &str = "MBOX From Line";

/// Custom metadata field recording which export file an item was matched to.
pub const FIELD_EXTERNAL_FILE_NAME: &str = "XmlExternalFileName";

/// MIME type of MBOX container items.
pub const MBOX_MIME_TYPE: &str = "application/mbox";

/// One item of the case.
///
/// `properties` are read-only extraction metadata; `custom_metadata` is the
/// writable annotation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    pub guid: String,
    pub localised_name: String,
    /// `false` for emails found inside another item (attached emails).
    pub is_top_level: bool,
    pub mime_type: String,
    /// Item kind, e.g. `email`, `container`.
    pub kind: String,
    /// GUIDs of every ancestor, outermost first.
    pub path_guids: Vec<String>,
    pub properties: BTreeMap<String, String>,
    pub custom_metadata: BTreeMap<String, MetadataValue>,
    /// Where the item's binary can be read (containers only).
    pub binary_path: Option<PathBuf>,
}

impl Item {
    /// Non-blank property value.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}
