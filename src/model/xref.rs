//! MBOX cross-reference record.

use serde::{Deserialize, Serialize};

/// One `From ` boundary paired with the `Message-ID` of the message behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MboxXrefRecord {
    /// Container-relative identifier from the separator line
    /// (`<int>-<uuid>.mbox`). Doubles as the export's external file name.
    pub from_id: String,

    /// Normalized `Message-ID` header value (no angle brackets).
    pub message_id: String,
}
