//! Data model: export documents and their tags, case items, xref records.

pub mod document;
pub mod item;
pub mod xref;
