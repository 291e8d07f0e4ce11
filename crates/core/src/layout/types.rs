//! Types for layout planning.

use serde::{Deserialize, Serialize};

/// One entry of a rewrite plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// File name inside the item's source folder.
    pub source_name: String,
    /// File name written under the destination folder.
    pub output_name: String,
    /// Rewritten to an index-coded name (otherwise passed through).
    pub process: bool,
    /// Not copied at all.
    pub no_copy: bool,
    /// Printed sheet position within the book.
    pub sheet_index: u32,
    /// Physical copy the sheet belongs to; 0 when unset.
    pub book_index: u32,
}

impl FileRecord {
    /// A file copied under its own name.
    pub fn pass_through(name: &str) -> Self {
        Self {
            source_name: name.to_string(),
            output_name: name.to_string(),
            process: false,
            no_copy: false,
            sheet_index: 0,
            book_index: 0,
        }
    }
}

/// Result of transforming one line item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutOutcome {
    /// The item cannot be transformed (no alias on the SKU); nothing written.
    Skipped { reason: String },
    /// Files were written under the alias folder.
    Transformed {
        alias: String,
        files_copied: usize,
        sheets: u32,
    },
}
