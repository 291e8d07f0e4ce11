//! Transform engine implementation.
//!
//! Drives one order per handle through its state machine:
//! - Fetch: runs inline in the entry point, so an empty queue yields an
//!   already-complete handle
//! - Download, Unpack, Finalize: run on a spawned task, one step per
//!   driver iteration
//! - Close: always runs last and releases the handle's resources

use std::collections::HashSet;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::EngineConfig;
use super::error::TransformError;
use super::handle::{TransformHandle, TransformStep};
use crate::download::Downloader;
use crate::layout::{extract_archive, FileLayoutTransformer, LayoutOutcome};
use crate::metrics;
use crate::queue::{WorkClass, WorkProvider};
use crate::store::{LocalOrderRecord, OrderState, Repository, StateKind};
use crate::vendor::{
    change_status, fetch_orders, vendor_transition, OrderEvent, OrderProvider, OrderQuery,
    VendorOrder, VendorStatus,
};

struct EngineInner {
    config: EngineConfig,
    provider: Arc<dyn OrderProvider>,
    repository: Arc<dyn Repository>,
    downloader: Arc<dyn Downloader>,
    transformer: FileLayoutTransformer,
    /// Local ids of orders claimed by a running handle.
    in_flight: Mutex<HashSet<String>>,
}

/// Moves vendor orders through download, file rewrite and finalization.
///
/// Cheap to clone; clones share the in-flight set.
#[derive(Clone)]
pub struct TransformEngine {
    inner: Arc<EngineInner>,
}

impl TransformEngine {
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn OrderProvider>,
        repository: Arc<dyn Repository>,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        let transformer = FileLayoutTransformer::new(config.destination_root.clone());
        Self {
            inner: Arc::new(EngineInner {
                config,
                provider,
                repository,
                downloader,
                transformer,
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Number of orders currently claimed by running handles.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight().len()
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<String>> {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn claim(&self, local_id: &str) -> bool {
        self.in_flight().insert(local_id.to_string())
    }

    fn release(&self, local_id: &str) {
        self.in_flight().remove(local_id);
    }

    fn is_claimed(&self, local_id: &str) -> bool {
        self.in_flight().contains(local_id)
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// Accepts the first ready vendor order that is not cancelled locally.
    ///
    /// Locally cancelled candidates get a comment and are moved to `defect`.
    /// Errors while scanning candidates are logged and the scan continues.
    pub async fn start_next(&self, scope: &CancellationToken) -> TransformHandle {
        let handle = TransformHandle::new(scope);
        let cancel = handle.cancellation_token();

        match self.fetch_next(&cancel).await {
            Ok(Some((order, record))) => {
                self.launch(&handle, order, record, WorkClass::NewLoad, TransformStep::Download)
            }
            Ok(None) => self.close_early(&handle, TransformError::EmptyQueue).await,
            Err(err) => self.close_early(&handle, err).await,
        }
        handle
    }

    /// Manually starts one order by vendor id.
    ///
    /// The vendor status is left alone in debug mode.
    pub async fn start_by_id(&self, scope: &CancellationToken, vendor_id: &str) -> TransformHandle {
        let handle = TransformHandle::new(scope);
        let cancel = handle.cancellation_token();

        match self.fetch_by_id(vendor_id, &cancel).await {
            Ok((order, record)) => {
                info!("Manually starting order {}", order.id);
                self.launch_with_label(&handle, order, record, "manual", TransformStep::Download)
            }
            Err(err) => {
                warn!("Manual start of order {} failed: {}", vendor_id, err);
                self.close_early(&handle, err).await
            }
        }
        handle
    }

    /// Hands orders stuck in vendor status `load_started` back to the queue.
    ///
    /// Always completes with [`TransformError::EmptyQueue`] unless cancelled.
    pub async fn reset_stalled(&self, scope: &CancellationToken) -> TransformHandle {
        let handle = TransformHandle::new(scope);
        let cancel = handle.cancellation_token();

        let result = self.sweep_stalled(&cancel).await;
        let err = match result {
            Ok(reset) => {
                if reset > 0 {
                    info!("Reset {} stalled orders", reset);
                }
                TransformError::EmptyQueue
            }
            Err(err) => err,
        };
        self.close_early(&handle, err).await;
        handle
    }

    /// Restarts the rewrite step of an order left in a transform state.
    pub async fn restart_transform(&self, scope: &CancellationToken) -> TransformHandle {
        let handle = TransformHandle::new(scope);
        let cancel = handle.cancellation_token();

        let candidates = self.load_candidates(&[
            OrderState::TransformWait,
            OrderState::TransformStarted,
        ]);
        match self.reclaim(candidates, &cancel).await {
            Ok(Some((order, record))) => self.launch(
                &handle,
                order,
                record,
                WorkClass::StalledTransform,
                TransformStep::Unpack,
            ),
            Ok(None) => self.close_early(&handle, TransformError::EmptyQueue).await,
            Err(err) => self.close_early(&handle, err).await,
        }
        handle
    }

    /// Restarts finalization of an order (or group) left waiting for it.
    pub async fn restart_finalize(&self, scope: &CancellationToken) -> TransformHandle {
        let handle = TransformHandle::new(scope);
        let cancel = handle.cancellation_token();

        let mut candidates = self.load_candidates(&[
            OrderState::FinalizeWait,
            OrderState::FinalizeStarted,
        ]);
        let limit = self.inner.config.page_size as usize;
        match self
            .inner
            .repository
            .load_base_order_by_child_state(OrderState::FinalizeWait, limit)
        {
            Ok(groups) => {
                // A base order that already failed keeps its group parked.
                for record in groups {
                    if record.state.kind() == StateKind::Error {
                        continue;
                    }
                    if !candidates.iter().any(|c| c.id == record.id) {
                        candidates.push(record);
                    }
                }
            }
            Err(e) => warn!("Failed to load finalize-wait groups: {}", e),
        }

        match self.reclaim(candidates, &cancel).await {
            Ok(Some((order, record))) => self.launch(
                &handle,
                order,
                record,
                WorkClass::StalledFinalize,
                TransformStep::Finalize,
            ),
            Ok(None) => self.close_early(&handle, TransformError::EmptyQueue).await,
            Err(err) => self.close_early(&handle, err).await,
        }
        handle
    }

    // =========================================================================
    // Fetch variants
    // =========================================================================

    async fn fetch_next(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<(VendorOrder, LocalOrderRecord)>, TransformError> {
        let query = OrderQuery::by_status(VendorStatus::Ready, self.inner.config.page_size);
        let orders = match fetch_orders(self.inner.provider.as_ref(), &query, cancel).await {
            Ok(orders) => orders,
            Err(e) => {
                warn!("Failed to list ready orders: {}", e);
                return Ok(None);
            }
        };

        for mut order in orders {
            if cancel.is_cancelled() {
                return Err(TransformError::Cancelled);
            }
            match self.try_accept(&mut order, cancel).await {
                Ok(Some(record)) => return Ok(Some((order, record))),
                Ok(None) => continue,
                Err(e) => warn!("Skipping candidate order {}: {}", order.id, e),
            }
        }

        Ok(None)
    }

    /// Accepts one candidate; `Ok(None)` when it was passed over.
    async fn try_accept(
        &self,
        order: &mut VendorOrder,
        cancel: &CancellationToken,
    ) -> Result<Option<LocalOrderRecord>, TransformError> {
        let config = &self.inner.config;
        let record = self.inner.repository.create_order(LocalOrderRecord::new(
            config.source_id,
            &order.id,
            &config.id_suffix,
        ))?;

        if record.state.is_cancelled() {
            info!("Order {} is cancelled locally, rejecting", order.id);
            self.reject_cancelled(order, cancel).await?;
            return Ok(None);
        }

        if !self.claim(&record.id) {
            debug!("Order {} is already in flight", record.id);
            return Ok(None);
        }

        match self.accept_claimed(order, &record, true, cancel).await {
            Ok(()) => Ok(Some(record)),
            Err(e) => {
                self.release(&record.id);
                Err(e)
            }
        }
    }

    async fn fetch_by_id(
        &self,
        vendor_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(VendorOrder, LocalOrderRecord), TransformError> {
        let config = &self.inner.config;
        let mut order = self.inner.provider.get_order(vendor_id, cancel).await?;
        let record = self.inner.repository.create_order(LocalOrderRecord::new(
            config.source_id,
            &order.id,
            &config.id_suffix,
        ))?;

        if !self.claim(&record.id) {
            return Err(TransformError::Transform(format!(
                "order {} is already in flight",
                record.id
            )));
        }

        match self
            .accept_claimed(&mut order, &record, !config.debug, cancel)
            .await
        {
            Ok(()) => Ok((order, record)),
            Err(e) => {
                self.release(&record.id);
                Err(e)
            }
        }
    }

    async fn accept_claimed(
        &self,
        order: &mut VendorOrder,
        record: &LocalOrderRecord,
        advance_vendor: bool,
        cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        if advance_vendor {
            if let Some(status) = self
                .advance_vendor(&order.id, &order.status, OrderEvent::Accepted, cancel)
                .await?
            {
                order.status = status;
            }
        }
        self.inner
            .repository
            .set_order_state(&record.id, OrderState::LoadStarted)?;
        info!("Accepted order {} as {}", order.id, record.id);
        Ok(())
    }

    /// Records (at most `page_size`) in any of `states`, oldest state first.
    fn load_candidates(&self, states: &[OrderState]) -> Vec<LocalOrderRecord> {
        let limit = self.inner.config.page_size as usize;
        let mut candidates = Vec::new();
        for state in states {
            match self.inner.repository.load_base_order_by_state(*state, limit) {
                Ok(records) => candidates.extend(records),
                Err(e) => warn!("Failed to load {} orders: {}", state, e),
            }
        }
        candidates
    }

    /// Claims the first candidate not in flight and reloads its vendor order.
    async fn reclaim(
        &self,
        candidates: Vec<LocalOrderRecord>,
        cancel: &CancellationToken,
    ) -> Result<Option<(VendorOrder, LocalOrderRecord)>, TransformError> {
        for record in candidates {
            if cancel.is_cancelled() {
                return Err(TransformError::Cancelled);
            }
            if !self.claim(&record.id) {
                continue;
            }
            match self.inner.provider.get_order(&record.vendor_id, cancel).await {
                Ok(order) => {
                    info!("Restarting order {} from {}", record.id, record.state);
                    return Ok(Some((order, record)));
                }
                Err(e) => {
                    self.release(&record.id);
                    warn!("Failed to reload order {}: {}", record.vendor_id, e);
                    if cancel.is_cancelled() {
                        return Err(TransformError::Cancelled);
                    }
                }
            }
        }
        Ok(None)
    }

    /// Pages through `load_started` orders and resets or rejects each.
    ///
    /// Orders left in `load_started` (in flight, or failed to reset) are
    /// stepped over so the sweep always terminates.
    async fn sweep_stalled(&self, cancel: &CancellationToken) -> Result<usize, TransformError> {
        let mut skip = 0;
        let mut reset = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(TransformError::Cancelled);
            }

            let query = OrderQuery::by_status(VendorStatus::LoadStarted, self.inner.config.page_size)
                .with_skip(skip);
            let page = match self.inner.provider.get_orders(&query, cancel).await {
                Ok(page) => page,
                Err(e) => {
                    warn!("Failed to list stalled orders at offset {}: {}", skip, e);
                    if cancel.is_cancelled() {
                        return Err(TransformError::Cancelled);
                    }
                    break;
                }
            };
            if page.is_empty() {
                break;
            }

            for order in page {
                match self.reset_one(&order, cancel).await {
                    Ok(true) => reset += 1,
                    Ok(false) => skip += 1,
                    Err(e) => {
                        warn!("Failed to reset stalled order {}: {}", order.id, e);
                        skip += 1;
                    }
                }
            }
        }

        Ok(reset)
    }

    /// Returns whether the order left `load_started`.
    async fn reset_one(
        &self,
        order: &VendorOrder,
        cancel: &CancellationToken,
    ) -> Result<bool, TransformError> {
        let local_id = self.inner.config.local_id(&order.id);
        if self.is_claimed(&local_id) {
            debug!("Stalled sweep skips in-flight order {}", local_id);
            return Ok(false);
        }

        let record = self.inner.repository.load_order(&local_id)?;
        if let Some(record) = record.as_ref().filter(|r| r.state.is_cancelled()) {
            info!("Stalled order {} is cancelled locally, rejecting", order.id);
            self.reject_cancelled(order, cancel).await?;
            if record.group_id != 0 {
                self.inner.repository.clear_group(record.group_id)?;
            }
            return Ok(true);
        }

        self.advance_vendor(&order.id, &order.status, OrderEvent::StallReset, cancel)
            .await?;
        if let Some(record) = record {
            self.inner
                .repository
                .set_order_state(&record.id, OrderState::Wait)?;
        }
        debug!("Reset stalled order {}", order.id);
        Ok(true)
    }

    // =========================================================================
    // Vendor status
    // =========================================================================

    /// Applies the vendor transition for `event`, if the table has one.
    async fn advance_vendor(
        &self,
        vendor_id: &str,
        current: &VendorStatus,
        event: OrderEvent,
        cancel: &CancellationToken,
    ) -> Result<Option<VendorStatus>, TransformError> {
        let Some(next) = vendor_transition(current, event) else {
            debug!(
                "No vendor transition for order {} in {} on {:?}",
                vendor_id, current, event
            );
            return Ok(None);
        };
        change_status(
            self.inner.provider.as_ref(),
            vendor_id,
            &next,
            self.inner.config.notify_customer,
            cancel,
        )
        .await?;
        debug!("Order {} vendor status {} -> {}", vendor_id, current, next);
        Ok(Some(next))
    }

    async fn reject_cancelled(
        &self,
        order: &VendorOrder,
        cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        let config = &self.inner.config;
        self.inner
            .provider
            .add_order_comment(&order.id, &config.operator_email, &config.cancel_comment, cancel)
            .await?;
        self.advance_vendor(&order.id, &order.status, OrderEvent::LocallyCancelled, cancel)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Driver
    // =========================================================================

    fn launch(
        &self,
        handle: &TransformHandle,
        order: VendorOrder,
        record: LocalOrderRecord,
        class: WorkClass,
        first: TransformStep,
    ) {
        self.launch_with_label(handle, order, record, class.as_str(), first)
    }

    fn launch_with_label(
        &self,
        handle: &TransformHandle,
        order: VendorOrder,
        record: LocalOrderRecord,
        label: &str,
        first: TransformStep,
    ) {
        metrics::HANDLES_STARTED.with_label_values(&[label]).inc();
        handle.set_order(order);
        handle.set_record(record);

        let engine = self.clone();
        let handle = handle.clone();
        tokio::spawn(async move {
            engine.run(handle, first).await;
        });
    }

    async fn close_early(&self, handle: &TransformHandle, err: TransformError) {
        handle.set_error(err);
        handle.close().await;
    }

    /// Runs steps until one returns no successor.
    async fn run(&self, handle: TransformHandle, mut step: TransformStep) {
        let cancel = handle.cancellation_token();
        loop {
            if cancel.is_cancelled() && step != TransformStep::Close {
                debug!("Handle {} cancelled before {}", handle.cycle_id(), step);
                handle.set_error(TransformError::Cancelled);
                step = TransformStep::Close;
            }

            handle.set_step(step);
            match self.execute(&handle, step, &cancel).await {
                Some(next) => step = next,
                None => break,
            }
        }
    }

    async fn execute(
        &self,
        handle: &TransformHandle,
        step: TransformStep,
        cancel: &CancellationToken,
    ) -> Option<TransformStep> {
        let result = match step {
            // Fetch runs inline in the entry points.
            TransformStep::Fetch => Ok(TransformStep::Download),
            TransformStep::Download => self
                .download_step(handle, cancel)
                .await
                .map(|_| TransformStep::Unpack),
            TransformStep::Unpack => self
                .unpack_step(handle, cancel)
                .await
                .map(|_| TransformStep::Finalize),
            TransformStep::Finalize => self
                .finalize_step(handle, cancel)
                .await
                .map(|_| TransformStep::Close),
            TransformStep::Close => {
                self.close_step(handle).await;
                return None;
            }
        };

        match result {
            Ok(next) => Some(next),
            Err(err) => {
                self.fail(handle, step, err);
                Some(TransformStep::Close)
            }
        }
    }

    fn fail(&self, handle: &TransformHandle, step: TransformStep, err: TransformError) {
        let record_id = handle.record().map(|r| r.id);

        if err.is_cancelled() {
            info!(
                "Order {} cancelled during {}",
                record_id.as_deref().unwrap_or("-"),
                step
            );
            handle.set_error(err);
            return;
        }

        error!(
            "Order {} failed during {}: {}",
            record_id.as_deref().unwrap_or("-"),
            step,
            err
        );

        let error_state = match step {
            TransformStep::Fetch | TransformStep::Download => Some(OrderState::LoadError),
            TransformStep::Unpack => Some(OrderState::TransformError),
            TransformStep::Finalize => Some(OrderState::FinalizeError),
            TransformStep::Close => None,
        };
        if let (Some(id), Some(state)) = (record_id.as_deref(), error_state) {
            let repository = &self.inner.repository;
            if let Err(e) = repository.set_order_state(id, state) {
                warn!("Failed to record {} for order {}: {}", state, id, e);
            }
            if let Err(e) = repository.log_state(id, state, &err.to_string()) {
                warn!("Failed to log {} for order {}: {}", state, id, e);
            }
        }

        // A failed group must leave FinalizeWait.
        if step == TransformStep::Finalize {
            if let Some(group_id) = handle.record().map(|r| r.group_id).filter(|g| *g != 0) {
                if let Err(e) = self
                    .inner
                    .repository
                    .set_group_state(group_id, OrderState::FinalizeError)
                {
                    warn!("Failed to record finalize error for group {}: {}", group_id, e);
                }
            }
        }

        handle.set_error(err);
    }

    async fn close_step(&self, handle: &TransformHandle) {
        // Released before the completion signal so waiters see a free order.
        if let Some(record) = handle.record() {
            self.release(&record.id);
        }
        handle.close().await;
        match handle.error() {
            None => info!("Handle {} finished", handle.cycle_id()),
            Some(err) => debug!("Handle {} closed with {}", handle.cycle_id(), err.kind()),
        }
    }

    // =========================================================================
    // Steps
    // =========================================================================

    fn snapshot(
        &self,
        handle: &TransformHandle,
    ) -> Result<(VendorOrder, LocalOrderRecord), TransformError> {
        match (handle.order(), handle.record()) {
            (Some(order), Some(record)) => Ok((order, record)),
            _ => Err(TransformError::Transform(
                "handle has no accepted order".to_string(),
            )),
        }
    }

    async fn download_step(
        &self,
        handle: &TransformHandle,
        cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        let (order, record) = self.snapshot(handle)?;
        let config = &self.inner.config;
        let archive = config.archive_path(&order.id);
        let folder = config.extract_folder(&order.id);

        match tokio::fs::remove_file(&archive).await {
            Ok(()) => debug!("Removed stale archive {:?}", archive),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(TransformError::fs("remove_file", &archive, e)),
        }
        match tokio::fs::remove_dir_all(&folder).await {
            Ok(()) => debug!("Removed stale folder {:?}", folder),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(TransformError::fs("remove_dir_all", &folder, e)),
        }
        tokio::fs::create_dir_all(&config.work_folder)
            .await
            .map_err(|e| TransformError::fs("create_dir_all", &config.work_folder, e))?;

        let download = self
            .inner
            .downloader
            .start(&order.download_link, &archive, cancel);
        handle.set_download(download.clone());
        let bytes = download.wait().await?;
        info!("Downloaded {} bytes for order {}", bytes, record.id);

        let files = tokio::task::spawn_blocking(move || extract_archive(&archive, &folder))
            .await
            .map_err(|e| TransformError::Transform(format!("extraction task failed: {}", e)))??;
        debug!("Extracted {} files for order {}", files, record.id);

        self.inner
            .repository
            .set_order_state(&record.id, OrderState::TransformWait)?;
        Ok(())
    }

    async fn unpack_step(
        &self,
        handle: &TransformHandle,
        cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        let (order, mut record) = self.snapshot(handle)?;
        let repository = &self.inner.repository;
        repository.set_order_state(&record.id, OrderState::TransformStarted)?;

        let folder = self.inner.config.extract_folder(&order.id);
        for item in &order.items {
            let outcome = self
                .inner
                .transformer
                .transform_item(item, &mut record, &folder, repository.as_ref(), cancel)
                .await?;
            if let LayoutOutcome::Skipped { reason } = outcome {
                debug!("Order {}: {}", record.id, reason);
            }
        }

        repository.save_order(&record)?;
        repository.set_order_state(&record.id, OrderState::FinalizeWait)?;
        handle.set_record(record);
        Ok(())
    }

    async fn finalize_step(
        &self,
        handle: &TransformHandle,
        cancel: &CancellationToken,
    ) -> Result<(), TransformError> {
        let (order, record) = self.snapshot(handle)?;
        let repository = &self.inner.repository;
        repository.set_order_state(&record.id, OrderState::FinalizeStarted)?;

        repository.add_extra_info(
            &record.id,
            "sheets",
            serde_json::Value::from(record.sheet_count),
        )?;
        repository.save_order(&record)?;

        self.advance_vendor(&order.id, &order.status, OrderEvent::Finalized, cancel)
            .await?;

        if record.group_id != 0 {
            repository.set_group_state(record.group_id, OrderState::Ready)?;
        }
        repository.set_order_state(&record.id, OrderState::Ready)?;
        info!("Order {} is ready for production", record.id);
        Ok(())
    }
}

#[async_trait]
impl WorkProvider for TransformEngine {
    async fn next(&self, class: WorkClass, scope: &CancellationToken) -> TransformHandle {
        match class {
            WorkClass::NewLoad => self.start_next(scope).await,
            WorkClass::StalledLoad => self.reset_stalled(scope).await,
            WorkClass::StalledTransform => self.restart_transform(scope).await,
            WorkClass::StalledFinalize => self.restart_finalize(scope).await,
        }
    }
}
