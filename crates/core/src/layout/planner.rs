//! Pure rename planning for sheet files.

use std::path::Path;

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::types::FileRecord;
use crate::engine::TransformError;

/// Extensions eligible for rewriting (compared case-insensitively).
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff"];

/// Marks preview renders, which are never numbered nor copied.
pub const PREVIEW_MARKER: &str = "_preview.";

static SURFACE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"surface_\[(\d+)\]").expect("surface pattern is valid"));

fn extension(name: &str) -> Option<&str> {
    Path::new(name).extension().and_then(|ext| ext.to_str())
}

fn is_allowed(name: &str) -> bool {
    extension(name)
        .map(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Extracts the surface index from `surface_[<digits>]`.
///
/// `Ok(None)` when the pattern is absent; `Err` when the digits do not fit.
pub fn surface_index(name: &str) -> Result<Option<u32>, TransformError> {
    let Some(captures) = SURFACE_PATTERN.captures(name) else {
        return Ok(None);
    };
    let digits = &captures[1];
    digits
        .parse::<u32>()
        .map(Some)
        .map_err(|e| TransformError::Parse(format!("surface index in {}: {}", name, e)))
}

/// `{book:03}-{sheet:02}{.ext}` with the source file's extension.
pub fn output_name(book_index: u32, sheet_index: u32, source_name: &str) -> String {
    match extension(source_name) {
        Some(ext) => format!("{:03}-{:02}.{}", book_index, sheet_index, ext),
        None => format!("{:03}-{:02}", book_index, sheet_index),
    }
}

/// Classifies one source file.
///
/// Without a cover page every extracted surface index moves up by one.
pub fn classify_file(name: &str, has_cover: bool) -> Result<FileRecord, TransformError> {
    let mut record = FileRecord::pass_through(name);
    if !is_allowed(name) {
        return Ok(record);
    }

    if name.contains(PREVIEW_MARKER) {
        record.no_copy = true;
        return Ok(record);
    }

    if let Some(index) = surface_index(name)? {
        record.process = true;
        record.sheet_index = if has_cover { index } else { index + 1 };
    }
    Ok(record)
}

/// Tags book-copy indices on the rewritten entries.
///
/// Quantity 0 or 1: every rewritten entry belongs to copy 1. Larger
/// quantities duplicate only the last rewritten entry, appending the copy
/// tagged with the quantity; all other entries keep book index 0.
pub fn apply_copy_rule(records: &mut Vec<FileRecord>, quantity: u32) {
    if quantity <= 1 {
        for record in records.iter_mut().filter(|r| r.process) {
            record.book_index = 1;
        }
        return;
    }

    if let Some(last) = records.iter().rev().find(|r| r.process).cloned() {
        records.push(FileRecord {
            book_index: quantity,
            ..last
        });
    }
}

/// Builds the complete rename plan for one folder listing.
///
/// Names are sorted first so the plan does not depend on directory order.
pub fn plan_layout(
    mut names: Vec<String>,
    has_cover: bool,
    quantity: u32,
) -> Result<Vec<FileRecord>, TransformError> {
    names.sort();

    let mut records = names
        .iter()
        .map(|name| classify_file(name, has_cover))
        .collect::<Result<Vec<_>, _>>()?;

    apply_copy_rule(&mut records, quantity);

    for record in records.iter_mut().filter(|r| r.process) {
        record.output_name = output_name(record.book_index, record.sheet_index, &record.source_name);
    }

    Ok(records)
}
