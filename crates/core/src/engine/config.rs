//! Transform engine configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the transform engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Source system id; first part of every local order id.
    #[serde(default = "default_source_id")]
    pub source_id: i32,

    /// Appended to local order ids.
    #[serde(default)]
    pub id_suffix: String,

    /// Archives are downloaded to `{work_folder}/{vendor_id}.zip` and
    /// extracted to `{work_folder}/{vendor_id}/`.
    pub work_folder: PathBuf,

    /// Rewritten files land under `{destination_root}/{ftp_folder}/{alias}/`.
    pub destination_root: PathBuf,

    /// Orders scanned per vendor listing request.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Leave vendor status untouched on manual starts.
    #[serde(default)]
    pub debug: bool,

    /// Author address for cancellation comments.
    #[serde(default = "default_operator_email")]
    pub operator_email: String,

    /// Comment posted on orders found cancelled locally.
    #[serde(default = "default_cancel_comment")]
    pub cancel_comment: String,

    /// Ask the vendor to notify the customer on status changes.
    #[serde(default)]
    pub notify_customer: bool,
}

fn default_source_id() -> i32 {
    1
}

fn default_page_size() -> u32 {
    50
}

fn default_operator_email() -> String {
    "production@localhost".to_string()
}

fn default_cancel_comment() -> String {
    "Order cancelled before production".to_string()
}

impl EngineConfig {
    /// Config with defaults for everything but the two folders.
    pub fn new(work_folder: impl Into<PathBuf>, destination_root: impl Into<PathBuf>) -> Self {
        Self {
            source_id: default_source_id(),
            id_suffix: String::new(),
            work_folder: work_folder.into(),
            destination_root: destination_root.into(),
            page_size: default_page_size(),
            debug: false,
            operator_email: default_operator_email(),
            cancel_comment: default_cancel_comment(),
            notify_customer: false,
        }
    }

    /// Local id of a vendor order under this config.
    pub fn local_id(&self, vendor_id: &str) -> String {
        crate::store::LocalOrderRecord::local_id(self.source_id, vendor_id, &self.id_suffix)
    }

    pub fn archive_path(&self, vendor_id: &str) -> PathBuf {
        self.work_folder.join(format!("{}.zip", vendor_id))
    }

    pub fn extract_folder(&self, vendor_id: &str) -> PathBuf {
        self.work_folder.join(vendor_id)
    }
}
