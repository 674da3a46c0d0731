//! Cross-reference indices: MBOX xref table and the export document index.

pub mod documents;
pub mod xref;

pub use documents::XmlDocumentIndex;
pub use xref::MboxXrefBuilder;
