//! Handle to one order's in-flight transform.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::error::TransformError;
use crate::download::DownloadHandle;
use crate::metrics;
use crate::store::LocalOrderRecord;
use crate::vendor::VendorOrder;

/// Step of the per-order state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformStep {
    Fetch,
    Download,
    Unpack,
    Finalize,
    Close,
}

impl TransformStep {
    pub fn as_str(self) -> &'static str {
        match self {
            TransformStep::Fetch => "fetch",
            TransformStep::Download => "download",
            TransformStep::Unpack => "unpack",
            TransformStep::Finalize => "finalize",
            TransformStep::Close => "close",
        }
    }
}

impl fmt::Display for TransformStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot returned by [`TransformHandle::progress`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformProgress {
    pub step: TransformStep,
    pub order_id: Option<String>,
    pub bytes_transferred: u64,
    pub bytes_per_second: u64,
}

struct HandleState {
    step: TransformStep,
    order: Option<VendorOrder>,
    record: Option<LocalOrderRecord>,
    download: Option<DownloadHandle>,
    error: Option<TransformError>,
    closed: bool,
}

struct Inner {
    cycle_id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: Mutex<Option<DateTime<Utc>>>,
    cancel: CancellationToken,
    done: watch::Sender<bool>,
    state: Mutex<HandleState>,
}

/// Future-like view of one order moving through the transform engine.
///
/// Clones share the same transform. The completion signal flips exactly once,
/// when the handle is closed; the terminal error is only meaningful after
/// that and is `None` only on full success.
#[derive(Clone)]
pub struct TransformHandle {
    inner: Arc<Inner>,
}

impl fmt::Debug for TransformHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformHandle")
            .field("cycle_id", &self.inner.cycle_id)
            .field("order_id", &self.order_id())
            .field("complete", &self.is_complete())
            .finish()
    }
}

impl TransformHandle {
    /// A fresh handle whose cancellation scope is a child of `parent`.
    pub fn new(parent: &CancellationToken) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                cycle_id: Uuid::new_v4(),
                started_at: Utc::now(),
                finished_at: Mutex::new(None),
                cancel: parent.child_token(),
                done,
                state: Mutex::new(HandleState {
                    step: TransformStep::Fetch,
                    order: None,
                    record: None,
                    download: None,
                    error: None,
                    closed: false,
                }),
            }),
        }
    }

    /// A handle that is already closed with [`TransformError::EmptyQueue`].
    pub fn empty(parent: &CancellationToken) -> Self {
        let handle = Self::new(parent);
        handle.set_error(TransformError::EmptyQueue);
        let download = handle.begin_close();
        debug_assert!(download.is_none());
        handle.end_close();
        handle
    }

    fn state(&self) -> MutexGuard<'_, HandleState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cycle_id(&self) -> Uuid {
        self.inner.cycle_id
    }

    /// Vendor id of the accepted order, if any.
    pub fn order_id(&self) -> Option<String> {
        self.state().order.as_ref().map(|order| order.id.clone())
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        *self
            .inner
            .finished_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_complete(&self) -> bool {
        *self.inner.done.borrow()
    }

    /// Waits until the handle is closed.
    pub async fn wait(&self) {
        let mut done = self.inner.done.subscribe();
        // The sender lives in `inner`, so the channel cannot close under us.
        let _ = done.wait_for(|closed| *closed).await;
    }

    /// Waits for completion and returns the terminal result.
    pub async fn wait_result(&self) -> Result<(), TransformError> {
        self.wait().await;
        match self.error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Terminal error; `None` while running or after success.
    pub fn error(&self) -> Option<TransformError> {
        self.state().error.clone()
    }

    pub fn step(&self) -> TransformStep {
        self.state().step
    }

    pub fn progress(&self) -> TransformProgress {
        let state = self.state();
        let (bytes_transferred, bytes_per_second) = state
            .download
            .as_ref()
            .map(|d| (d.bytes_transferred(), d.bytes_per_second()))
            .unwrap_or((0, 0));
        TransformProgress {
            step: state.step,
            order_id: state.order.as_ref().map(|order| order.id.clone()),
            bytes_transferred,
            bytes_per_second,
        }
    }

    /// Requests cancellation; the engine closes the handle at the next step
    /// boundary.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub fn order(&self) -> Option<VendorOrder> {
        self.state().order.clone()
    }

    pub fn record(&self) -> Option<LocalOrderRecord> {
        self.state().record.clone()
    }

    /// The download currently attached to the handle.
    pub fn download(&self) -> Option<DownloadHandle> {
        self.state().download.clone()
    }

    pub(crate) fn set_step(&self, step: TransformStep) {
        self.state().step = step;
    }

    pub(crate) fn set_order(&self, order: VendorOrder) {
        self.state().order = Some(order);
    }

    pub(crate) fn set_record(&self, record: LocalOrderRecord) {
        self.state().record = Some(record);
    }

    pub(crate) fn set_download(&self, download: DownloadHandle) {
        self.state().download = Some(download);
    }

    /// Records the terminal error; the first one wins.
    pub(crate) fn set_error(&self, error: TransformError) {
        let mut state = self.state();
        if state.error.is_none() {
            state.error = Some(error);
        }
    }

    /// Releases the download, signals completion and cancels the scope.
    ///
    /// # Panics
    ///
    /// Panics when the handle was already closed.
    pub async fn close(&self) {
        if let Some(download) = self.begin_close() {
            if !download.is_complete() {
                download.cancel().await;
            }
        }
        self.end_close();
    }

    fn begin_close(&self) -> Option<DownloadHandle> {
        let mut state = self.state();
        assert!(
            !state.closed,
            "transform handle {} closed twice",
            self.inner.cycle_id
        );
        state.closed = true;
        state.step = TransformStep::Close;
        state.download.take()
    }

    fn end_close(&self) {
        *self
            .inner
            .finished_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());

        let result = self.error().map(|e| e.kind()).unwrap_or("success");
        metrics::HANDLES_FINISHED.with_label_values(&[result]).inc();

        self.inner.done.send_replace(true);
        self.inner.cancel.cancel();
    }
}
