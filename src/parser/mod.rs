//! Input parsing: MBOX boundary scanning, header extraction, and export XML.

pub mod header;
pub mod mbox;
pub mod xml;
