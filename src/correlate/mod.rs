//! Correlation of case items with export documents.

pub mod engine;
pub mod labels;
pub mod mode;

pub use engine::{CorrelationEngine, CorrelationResult, Outcome};
pub use labels::LabelGrouper;
pub use mode::{ExtractionMode, FormatVersion};
