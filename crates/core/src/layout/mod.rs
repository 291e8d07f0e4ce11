//! File layout rewriting.
//!
//! Turns the files of one order line item into production sheet files named
//! `{book:03}-{sheet:02}{ext}` under the destination root:
//! - `planner` classifies files and computes the rename plan (pure)
//! - `transformer` resolves the alias and applies the plan on disk
//! - `archive` unpacks downloaded order archives

mod archive;
mod planner;
mod transformer;
mod types;

pub use archive::extract_archive;
pub use planner::{
    apply_copy_rule, classify_file, output_name, plan_layout, surface_index, ALLOWED_EXTENSIONS,
    PREVIEW_MARKER,
};
pub use transformer::FileLayoutTransformer;
pub use types::{FileRecord, LayoutOutcome};
