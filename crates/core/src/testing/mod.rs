//! Testing utilities and mock implementations for end-to-end tests.
//!
//! This module provides mock implementations of the engine's collaborators,
//! allowing full order runs without a vendor API, a database or a network.
//!
//! # Example
//!
//! ```rust,ignore
//! use pressline_core::testing::{fixtures, MockDownloader, MockOrderProvider, MockRepository};
//!
//! let provider = MockOrderProvider::new();
//! provider.insert(fixtures::vendor_order("1001", VendorStatus::Ready)).await;
//!
//! let downloader = MockDownloader::new();
//! downloader.serve(&fixtures::download_link("1001"), fixtures::sheet_archive("item_1", 4)?);
//!
//! let repository = MockRepository::new();
//! repository.add_alias(fixtures::book_alias("book_20x20", true));
//! ```

mod mock_downloader;
mod mock_provider;
mod mock_repository;
mod mock_work_provider;

pub use mock_downloader::MockDownloader;
pub use mock_provider::{MockOrderProvider, RecordedComment, RecordedStatusChange};
pub use mock_repository::{MockRepository, StateLogEntry};
pub use mock_work_provider::MockWorkProvider;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::collections::HashMap;
    use std::io::{Cursor, Write};

    use zip::result::ZipResult;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    use crate::store::{AliasDefinition, ProductType};
    use crate::vendor::{VendorOrder, VendorOrderItem, VendorStatus, ALIAS_PROPERTY};

    /// Download link the fixtures use for an order.
    pub fn download_link(id: &str) -> String {
        format!("mock://orders/{}.zip", id)
    }

    /// A vendor order without line items.
    pub fn vendor_order(id: &str, status: VendorStatus) -> VendorOrder {
        VendorOrder {
            id: id.to_string(),
            status,
            download_link: download_link(id),
            items: Vec::new(),
        }
    }

    /// A line item in `directory` for `alias`.
    pub fn order_item(directory: &str, alias: &str, quantity: u32) -> VendorOrderItem {
        let mut sku_properties = HashMap::new();
        sku_properties.insert(ALIAS_PROPERTY.to_string(), alias.to_string());
        VendorOrderItem {
            quantity,
            page_count: 20,
            sku_properties,
            directory_name: directory.to_string(),
        }
    }

    /// A vendor order with one book item in `item_1`.
    pub fn book_order(id: &str, status: VendorStatus, alias: &str, quantity: u32) -> VendorOrder {
        let mut order = vendor_order(id, status);
        order.items.push(order_item("item_1", alias, quantity));
        order
    }

    /// A photo book alias.
    pub fn book_alias(alias: &str, has_cover: bool) -> AliasDefinition {
        AliasDefinition {
            alias: alias.to_string(),
            product_type: ProductType::PhotoBook.code(),
            has_cover,
        }
    }

    /// Zip bytes holding `entries`.
    pub fn zip_archive(entries: &[(&str, &[u8])]) -> ZipResult<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            zip.start_file(*name, FileOptions::default())?;
            zip.write_all(data)?;
        }
        Ok(zip.finish()?.into_inner())
    }

    /// Zip bytes with `sheets` surface files plus one preview under `directory`.
    pub fn sheet_archive(directory: &str, sheets: usize) -> ZipResult<Vec<u8>> {
        let mut names: Vec<String> = (0..sheets)
            .map(|i| format!("{}/surface_[{}].jpg", directory, i))
            .collect();
        names.push(format!("{}/surface_[0]_preview.jpg", directory));

        let entries: Vec<(&str, &[u8])> = names
            .iter()
            .map(|name| (name.as_str(), name.as_bytes()))
            .collect();
        zip_archive(&entries)
    }
}
