//! Local order record, state vocabulary and alias catalog types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Broad category of an [`OrderState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Wait,
    Processing,
    Error,
    Terminal,
}

/// Pipeline state of a local order.
///
/// Codes are persisted as integers and only grow, except for the stall reset
/// which hands a record back to `Wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum OrderState {
    Wait,
    LoadStarted,
    LoadError,
    TransformWait,
    TransformStarted,
    TransformError,
    FinalizeWait,
    FinalizeStarted,
    FinalizeError,
    Ready,
    Cancelled,
}

impl OrderState {
    pub const ALL: [OrderState; 11] = [
        OrderState::Wait,
        OrderState::LoadStarted,
        OrderState::LoadError,
        OrderState::TransformWait,
        OrderState::TransformStarted,
        OrderState::TransformError,
        OrderState::FinalizeWait,
        OrderState::FinalizeStarted,
        OrderState::FinalizeError,
        OrderState::Ready,
        OrderState::Cancelled,
    ];

    /// Persisted integer code.
    pub fn code(self) -> i32 {
        match self {
            OrderState::Wait => 0,
            OrderState::LoadStarted => 100,
            OrderState::LoadError => 190,
            OrderState::TransformWait => 200,
            OrderState::TransformStarted => 210,
            OrderState::TransformError => 290,
            OrderState::FinalizeWait => 300,
            OrderState::FinalizeStarted => 310,
            OrderState::FinalizeError => 390,
            OrderState::Ready => 400,
            OrderState::Cancelled => 900,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.code() == code)
    }

    pub fn kind(self) -> StateKind {
        match self {
            OrderState::Wait | OrderState::TransformWait | OrderState::FinalizeWait => {
                StateKind::Wait
            }
            OrderState::LoadStarted
            | OrderState::TransformStarted
            | OrderState::FinalizeStarted => StateKind::Processing,
            OrderState::LoadError | OrderState::TransformError | OrderState::FinalizeError => {
                StateKind::Error
            }
            OrderState::Ready | OrderState::Cancelled => StateKind::Terminal,
        }
    }

    pub fn is_cancelled(self) -> bool {
        self == OrderState::Cancelled
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderState::Wait => "wait",
            OrderState::LoadStarted => "load_started",
            OrderState::LoadError => "load_error",
            OrderState::TransformWait => "transform_wait",
            OrderState::TransformStarted => "transform_started",
            OrderState::TransformError => "transform_error",
            OrderState::FinalizeWait => "finalize_wait",
            OrderState::FinalizeStarted => "finalize_started",
            OrderState::FinalizeError => "finalize_error",
            OrderState::Ready => "ready",
            OrderState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.as_str(), self.code())
    }
}

impl From<OrderState> for i32 {
    fn from(state: OrderState) -> Self {
        state.code()
    }
}

impl TryFrom<i32> for OrderState {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        OrderState::from_code(code).ok_or_else(|| format!("unknown order state code {}", code))
    }
}

/// A vendor order as tracked by the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalOrderRecord {
    /// `{source}_{vendor_id}{suffix}`.
    pub id: String,
    /// Source system the order came from.
    pub source: i32,
    /// Order id on the vendor side.
    pub vendor_id: String,
    pub state: OrderState,
    /// Production group; 0 means the order is not grouped.
    pub group_id: i64,
    /// Folder under the destination root that receives the rewritten files.
    pub ftp_folder: String,
    /// Whether the last transformed product carries a cover page.
    pub has_cover: bool,
    /// Number of sheet files produced by the last rewrite.
    pub sheet_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state_changed_at: DateTime<Utc>,
}

impl LocalOrderRecord {
    /// Builds the local id for a vendor order.
    pub fn local_id(source: i32, vendor_id: &str, suffix: &str) -> String {
        format!("{}_{}{}", source, vendor_id, suffix)
    }

    /// A fresh record in `Wait` state.
    pub fn new(source: i32, vendor_id: &str, suffix: &str) -> Self {
        let now = Utc::now();
        let id = Self::local_id(source, vendor_id, suffix);
        Self {
            ftp_folder: id.clone(),
            id,
            source,
            vendor_id: vendor_id.to_string(),
            state: OrderState::Wait,
            group_id: 0,
            has_cover: false,
            sheet_count: 0,
            created_at: now,
            updated_at: now,
            state_changed_at: now,
        }
    }
}

/// Production product families known to the alias catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductType {
    PhotoBook,
    LayflatBook,
    SoftcoverBook,
    Calendar,
    Canvas,
}

impl ProductType {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(ProductType::PhotoBook),
            2 => Some(ProductType::LayflatBook),
            3 => Some(ProductType::SoftcoverBook),
            10 => Some(ProductType::Calendar),
            20 => Some(ProductType::Canvas),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            ProductType::PhotoBook => 1,
            ProductType::LayflatBook => 2,
            ProductType::SoftcoverBook => 3,
            ProductType::Calendar => 10,
            ProductType::Canvas => 20,
        }
    }

    /// Products assembled from numbered sheets.
    pub fn is_book_like(self) -> bool {
        matches!(
            self,
            ProductType::PhotoBook | ProductType::LayflatBook | ProductType::SoftcoverBook
        )
    }
}

/// Catalog entry mapping a vendor SKU alias to a production product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasDefinition {
    pub alias: String,
    pub product_type: i32,
    pub has_cover: bool,
}

impl AliasDefinition {
    pub fn product(&self) -> Option<ProductType> {
        ProductType::from_code(self.product_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_codes_are_monotonic() {
        let codes: Vec<i32> = OrderState::ALL.iter().map(|s| s.code()).collect();
        let mut sorted = codes.clone();
        sorted.sort();
        assert_eq!(codes, sorted);
        for state in OrderState::ALL {
            assert_eq!(OrderState::from_code(state.code()), Some(state));
        }
        assert_eq!(OrderState::from_code(42), None);
    }

    #[test]
    fn test_state_kinds() {
        assert_eq!(OrderState::TransformWait.kind(), StateKind::Wait);
        assert_eq!(OrderState::FinalizeStarted.kind(), StateKind::Processing);
        assert_eq!(OrderState::LoadError.kind(), StateKind::Error);
        assert_eq!(OrderState::Cancelled.kind(), StateKind::Terminal);
        assert!(OrderState::Cancelled.is_cancelled());
        assert!(!OrderState::Ready.is_cancelled());
    }

    #[test]
    fn test_state_serializes_as_code() {
        assert_eq!(serde_json::to_string(&OrderState::Ready).unwrap(), "400");
        let parsed: OrderState = serde_json::from_str("210").unwrap();
        assert_eq!(parsed, OrderState::TransformStarted);
        assert!(serde_json::from_str::<OrderState>("211").is_err());
    }

    #[test]
    fn test_local_id_format() {
        let record = LocalOrderRecord::new(2, "77123", "-r");
        assert_eq!(record.id, "2_77123-r");
        assert_eq!(record.ftp_folder, "2_77123-r");
        assert_eq!(record.state, OrderState::Wait);
        assert_eq!(record.group_id, 0);
    }

    #[test]
    fn test_product_types() {
        assert!(ProductType::from_code(1).unwrap().is_book_like());
        assert!(ProductType::from_code(3).unwrap().is_book_like());
        assert!(!ProductType::from_code(20).unwrap().is_book_like());
        assert_eq!(ProductType::from_code(99), None);
        assert_eq!(ProductType::LayflatBook.code(), 2);
    }
}
