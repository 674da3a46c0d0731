//! Contracts with the host case-management system.
//!
//! The correlation core never talks to the host directly; everything it needs
//! goes through these three traits, injected into
//! [`RunCoordinator`](crate::run::RunCoordinator).

pub mod console;
pub mod json_case;

use crate::error::Result;
use crate::model::item::{Item, MBOX_MIME_TYPE};

/// Query selecting every email item in the case.
pub const EMAIL_QUERY: &str = "kind:email";

/// Query selecting the emails inside the given containers.
pub fn emails_in_containers_query(container_guids: &[String]) -> String {
    format!("path-guid:({}) AND kind:email", container_guids.join(" OR "))
}

/// Query selecting every MBOX container item.
pub fn mbox_container_query() -> String {
    format!("mime-type:\"{MBOX_MIME_TYPE}\"")
}

/// Item store and search surface of the case.
pub trait CaseStore {
    /// Run a case query and return the matching items.
    fn search(&self, query: &str) -> Result<Vec<Item>>;

    /// Persist the custom metadata of the given items.
    fn save_custom_metadata(&mut self, items: &[Item]) -> Result<()>;
}

/// Bulk tagging facility.
pub trait BulkAnnotator {
    /// Apply `tag_name` to every listed item in one operation.
    fn add_tag(&mut self, tag_name: &str, item_guids: &[String]) -> Result<()>;
}

/// Progress and log display. Advisory only; implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn log(&self, message: &str);
    fn set_main_status(&self, status: &str);
    fn set_progress(&self, done: u64, total: u64);
    fn set_substatus(&self, text: &str);
}
