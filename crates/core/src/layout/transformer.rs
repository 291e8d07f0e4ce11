//! Applies rename plans to line items.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::planner::plan_layout;
use super::types::{FileRecord, LayoutOutcome};
use crate::engine::TransformError;
use crate::metrics;
use crate::store::{AliasLookup, LocalOrderRecord};
use crate::vendor::VendorOrderItem;

/// Rewrites line item folders into index-coded sheet files.
#[derive(Debug, Clone)]
pub struct FileLayoutTransformer {
    destination_root: PathBuf,
}

impl FileLayoutTransformer {
    pub fn new(destination_root: impl Into<PathBuf>) -> Self {
        Self {
            destination_root: destination_root.into(),
        }
    }

    pub fn destination_root(&self) -> &Path {
        &self.destination_root
    }

    /// Folder that receives the files of `alias` for `record`.
    pub fn destination_for(&self, record: &LocalOrderRecord, alias: &str) -> PathBuf {
        self.destination_root.join(&record.ftp_folder).join(alias)
    }

    /// Transforms one line item.
    ///
    /// `source_folder` is the order's extraction folder; the item's files are
    /// read from its `directory_name` subfolder. On success the record's
    /// sheet count and cover flag are updated.
    pub async fn transform_item<A>(
        &self,
        item: &VendorOrderItem,
        record: &mut LocalOrderRecord,
        source_folder: &Path,
        aliases: &A,
        cancel: &CancellationToken,
    ) -> Result<LayoutOutcome, TransformError>
    where
        A: AliasLookup + ?Sized,
    {
        let Some(alias_key) = item.alias() else {
            return Ok(LayoutOutcome::Skipped {
                reason: format!("item {} has no alias property", item.directory_name),
            });
        };

        let alias = aliases.load_alias(alias_key)?.ok_or_else(|| {
            TransformError::SourceNotFound(format!(
                "alias {} is not known to the local catalog",
                alias_key
            ))
        })?;
        record.has_cover = alias.has_cover;

        match alias.product() {
            Some(product) if product.is_book_like() => {}
            _ => {
                return Err(TransformError::Transform(format!(
                    "unsupported alias type {} for alias {}",
                    alias.product_type, alias.alias
                )))
            }
        }

        let item_folder = source_folder.join(&item.directory_name);
        let names = list_files(&item_folder).await?;
        if names.is_empty() {
            return Err(TransformError::SourceNotFound(format!(
                "no files in {}",
                item_folder.display()
            )));
        }

        let plan = plan_layout(names, alias.has_cover, item.quantity)?;
        let destination = self.destination_for(record, alias_key);
        let files_copied = copy_plan(&plan, &item_folder, &destination, cancel).await?;

        let sheets = plan.iter().filter(|r| r.process).count() as u32;
        record.sheet_count = sheets;
        metrics::FILES_REWRITTEN.inc_by(u64::from(sheets));

        info!(
            "Rewrote {} sheets ({} files) of order {} into {:?}",
            sheets, files_copied, record.id, destination
        );

        Ok(LayoutOutcome::Transformed {
            alias: alias_key.to_string(),
            files_copied,
            sheets,
        })
    }
}

/// Lists regular file names in `folder`; a missing folder is a source error.
async fn list_files(folder: &Path) -> Result<Vec<String>, TransformError> {
    let mut entries = match fs::read_dir(folder).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(TransformError::SourceNotFound(format!(
                "source folder {} does not exist",
                folder.display()
            )))
        }
        Err(e) => return Err(TransformError::fs("read_dir", folder, e)),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| TransformError::fs("read_dir", folder, e))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| TransformError::fs("file_type", &entry.path(), e))?;
        if !file_type.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => warn!(
                "Skipping {:?} in {}: file name is not valid UTF-8",
                raw,
                folder.display()
            ),
        }
    }
    Ok(names)
}

/// Replaces `destination` with the planned copies of `source`'s files.
async fn copy_plan(
    plan: &[FileRecord],
    source: &Path,
    destination: &Path,
    cancel: &CancellationToken,
) -> Result<usize, TransformError> {
    match fs::remove_dir_all(destination).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(TransformError::fs("remove_dir_all", destination, e)),
    }
    fs::create_dir_all(destination)
        .await
        .map_err(|e| TransformError::fs("create_dir_all", destination, e))?;

    let mut copied = 0;
    for record in plan.iter().filter(|r| !r.no_copy) {
        if cancel.is_cancelled() {
            return Err(TransformError::Cancelled);
        }
        let from = source.join(&record.source_name);
        let to = destination.join(&record.output_name);
        debug!("Copying {:?} -> {:?}", from, to);
        fs::copy(&from, &to)
            .await
            .map_err(|e| TransformError::fs("copy", &from, e))?;
        copied += 1;
    }
    Ok(copied)
}
