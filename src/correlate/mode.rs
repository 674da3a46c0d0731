//! Extraction mode selection.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::XrefError;

/// First host format version that records the MBOX `From ` line per item.
pub const NATIVE_FROM_LINE_VERSION: FormatVersion = FormatVersion {
    parts: [7, 4, 0],
};

/// Dotted numeric version of the host's data format, e.g. `7.4` or `8.2.1`.
///
/// Missing components compare as zero, so `7.4` equals `7.4.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatVersion {
    parts: [u32; 3],
}

impl FormatVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            parts: [major, minor, patch],
        }
    }

    pub fn is_at_least(&self, other: &FormatVersion) -> bool {
        *self >= *other
    }
}

impl Ord for FormatVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts.cmp(&other.parts)
    }
}

impl PartialOrd for FormatVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for FormatVersion {
    type Err = XrefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = [0u32; 3];
        let mut count = 0;
        for (i, piece) in s.trim().split('.').enumerate() {
            if i >= parts.len() {
                // Build numbers and beyond do not affect mode selection
                break;
            }
            parts[i] = piece
                .trim()
                .parse()
                .map_err(|_| XrefError::InvalidVersion(s.to_string()))?;
            count += 1;
        }
        if count == 0 {
            return Err(XrefError::InvalidVersion(s.to_string()));
        }
        Ok(Self { parts })
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.parts[0], self.parts[1], self.parts[2])
    }
}

/// How each item's MBOX `From ` identifier is found.
///
/// Resolved once per run; every item goes through the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Look the item's `Message-ID` up in an xref built from the MBOX containers.
    Legacy,
    /// Read the item's captured `MBOX From Line` property.
    Native,
}

impl ExtractionMode {
    /// Native when the host format is 7.4 or later and legacy is not forced.
    pub fn select(host_version: &FormatVersion, force_legacy: bool) -> Self {
        if host_version.is_at_least(&NATIVE_FROM_LINE_VERSION) && !force_legacy {
            Self::Native
        } else {
            Self::Legacy
        }
    }

    pub fn needs_xref(self) -> bool {
        self == Self::Legacy
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => f.write_str("legacy (MBOX xref)"),
            Self::Native => f.write_str("native (MBOX From Line property)"),
        }
    }
}
