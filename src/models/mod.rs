//! Todoist resource models.
//!
//! Models type the fields the server inspects and keep every other field the
//! API returns in a flattened `extra` map, so tool output never drops data.

mod comment;
mod label;
mod project;
mod task;

pub use comment::*;
pub use label::*;
pub use project::*;
pub use task::*;

use serde::{Deserialize, Serialize};

/// One page of a cursor-paginated list endpoint.
///
/// A missing `results` field decodes as an empty page; a `null` cursor marks
/// the end of the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}
