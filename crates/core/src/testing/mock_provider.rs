//! Mock vendor order provider for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::vendor::{
    OrderProvider, OrderQuery, ProviderError, StatusChangeResult, VendorOrder, VendorStatus,
};

/// A recorded status change request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStatusChange {
    pub order_id: String,
    pub status: VendorStatus,
    pub notify: bool,
}

/// A recorded order comment.
#[derive(Debug, Clone)]
pub struct RecordedComment {
    pub order_id: String,
    pub email: String,
    pub text: String,
    pub timestamp: chrono::DateTime<Utc>,
}

/// Mock implementation of the OrderProvider trait.
///
/// Keeps orders in insertion order and serves listings from them:
/// - Records every listing query, status change and comment
/// - Applies accepted status changes to the stored orders
/// - Can reject status changes or fail the next call
///
/// # Example
///
/// ```rust,ignore
/// let provider = MockOrderProvider::new();
/// provider.insert(fixtures::vendor_order("1001", VendorStatus::Ready)).await;
///
/// // ... run the engine ...
///
/// assert_eq!(provider.status_of("1001").await, Some(VendorStatus::InWork));
/// ```
#[derive(Debug)]
pub struct MockOrderProvider {
    orders: Arc<RwLock<Vec<VendorOrder>>>,
    queries: Arc<RwLock<Vec<OrderQuery>>>,
    status_changes: Arc<RwLock<Vec<RecordedStatusChange>>>,
    comments: Arc<RwLock<Vec<RecordedComment>>>,
    status_result: Arc<RwLock<StatusChangeResult>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<ProviderError>>>,
}

impl Default for MockOrderProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOrderProvider {
    pub fn new() -> Self {
        Self {
            orders: Arc::new(RwLock::new(Vec::new())),
            queries: Arc::new(RwLock::new(Vec::new())),
            status_changes: Arc::new(RwLock::new(Vec::new())),
            comments: Arc::new(RwLock::new(Vec::new())),
            status_result: Arc::new(RwLock::new(StatusChangeResult::success())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Adds an order, replacing any order with the same id in place.
    pub async fn insert(&self, order: VendorOrder) {
        let mut orders = self.orders.write().await;
        match orders.iter_mut().find(|o| o.id == order.id) {
            Some(existing) => *existing = order,
            None => orders.push(order),
        }
    }

    /// Result returned by every following status change.
    pub async fn set_status_result(&self, result: StatusChangeResult) {
        *self.status_result.write().await = result;
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: ProviderError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn status_of(&self, id: &str) -> Option<VendorStatus> {
        self.orders
            .read()
            .await
            .iter()
            .find(|o| o.id == id)
            .map(|o| o.status.clone())
    }

    pub async fn recorded_queries(&self) -> Vec<OrderQuery> {
        self.queries.read().await.clone()
    }

    pub async fn status_changes(&self) -> Vec<RecordedStatusChange> {
        self.status_changes.read().await.clone()
    }

    pub async fn comments(&self) -> Vec<RecordedComment> {
        self.comments.read().await.clone()
    }

    async fn check(&self, cancel: &CancellationToken) -> Result<(), ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        match self.next_error.write().await.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl OrderProvider for MockOrderProvider {
    async fn count_orders(
        &self,
        statuses: &[VendorStatus],
        cancel: &CancellationToken,
    ) -> Result<u64, ProviderError> {
        self.check(cancel).await?;
        let orders = self.orders.read().await;
        Ok(orders.iter().filter(|o| statuses.contains(&o.status)).count() as u64)
    }

    async fn get_orders(
        &self,
        query: &OrderQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<VendorOrder>, ProviderError> {
        self.check(cancel).await?;
        self.queries.write().await.push(query.clone());

        let orders = self.orders.read().await;
        Ok(orders
            .iter()
            .filter(|o| o.status == query.status)
            .skip(query.skip as usize)
            .take(query.take as usize)
            .cloned()
            .collect())
    }

    async fn get_order(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<VendorOrder, ProviderError> {
        self.check(cancel).await?;
        self.orders
            .read()
            .await
            .iter()
            .find(|o| o.id == id)
            .cloned()
            .ok_or_else(|| ProviderError::OrderNotFound(id.to_string()))
    }

    async fn set_order_status(
        &self,
        id: &str,
        status: &VendorStatus,
        notify: bool,
        cancel: &CancellationToken,
    ) -> Result<StatusChangeResult, ProviderError> {
        self.check(cancel).await?;
        self.status_changes.write().await.push(RecordedStatusChange {
            order_id: id.to_string(),
            status: status.clone(),
            notify,
        });

        let result = self.status_result.read().await.clone();
        if result.is_accepted() {
            let mut orders = self.orders.write().await;
            match orders.iter_mut().find(|o| o.id == id) {
                Some(order) => order.status = status.clone(),
                None => return Err(ProviderError::OrderNotFound(id.to_string())),
            }
        }
        Ok(result)
    }

    async fn add_order_comment(
        &self,
        id: &str,
        email: &str,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        self.check(cancel).await?;
        self.comments.write().await.push(RecordedComment {
            order_id: id.to_string(),
            email: email.to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[tokio::test]
    async fn test_listing_filters_and_pages() {
        let provider = MockOrderProvider::new();
        for (id, status) in [
            ("1", VendorStatus::Ready),
            ("2", VendorStatus::New),
            ("3", VendorStatus::Ready),
            ("4", VendorStatus::Ready),
        ] {
            provider.insert(fixtures::vendor_order(id, status)).await;
        }

        let query = OrderQuery::by_status(VendorStatus::Ready, 2).with_skip(1);
        let page = provider
            .get_orders(&query, &CancellationToken::new())
            .await
            .unwrap();
        let ids: Vec<&str> = page.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "4"]);

        let count = provider
            .count_orders(&[VendorStatus::Ready, VendorStatus::New], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn test_status_change_applies_when_accepted() {
        let provider = MockOrderProvider::new();
        provider.insert(fixtures::vendor_order("1", VendorStatus::Ready)).await;

        provider
            .set_order_status("1", &VendorStatus::LoadStarted, false, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(provider.status_of("1").await, Some(VendorStatus::LoadStarted));

        provider
            .set_status_result(StatusChangeResult {
                code: "error".to_string(),
                message: None,
            })
            .await;
        provider
            .set_order_status("1", &VendorStatus::InWork, false, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(provider.status_of("1").await, Some(VendorStatus::LoadStarted));
        assert_eq!(provider.status_changes().await.len(), 2);
    }

    #[tokio::test]
    async fn test_next_error_and_cancellation() {
        let provider = MockOrderProvider::new();
        provider
            .set_next_error(ProviderError::ConnectionFailed("down".to_string()))
            .await;

        let err = provider
            .get_order("1", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ConnectionFailed(_)));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = provider.get_order("1", &cancel).await.unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled));
    }
}
