//! Queue manager implementation.
//!
//! Runs cycles of four concurrent drains:
//! - each drain asks the provider for handles of one work class until it
//!   gets back a handle that is already complete
//! - all drains share one slot pool, so at most `max_concurrent` handles
//!   are in flight at any time
//! - a cycle ends when every handle issued during it has completed

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{watch, RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::QueueConfig;
use super::types::{QueueStatus, WorkClass};
use crate::engine::TransformHandle;
use crate::metrics;

/// Source of transform handles for each work class.
#[async_trait]
pub trait WorkProvider: Send + Sync {
    /// Returns the next handle of `class`, scoped under `scope`.
    ///
    /// A handle that is already complete means the class has nothing left.
    async fn next(&self, class: WorkClass, scope: &CancellationToken) -> TransformHandle;
}

struct ManagerInner {
    config: QueueConfig,
    provider: Arc<dyn WorkProvider>,
    slots: Arc<Semaphore>,
    registry: RwLock<HashMap<Uuid, TransformHandle>>,
    /// Parent scope of every issued handle; `quit` leaves it alone.
    scope: CancellationToken,
    running: AtomicBool,
    stop: CancellationToken,
    done: watch::Sender<bool>,
    cycles: AtomicU64,
    completed: AtomicU64,
    peak: AtomicUsize,
}

/// Repeatedly drains the four work classes under a shared concurrency cap.
///
/// Cheap to clone. A manager runs its loop once: after `quit` it cannot be
/// started again.
#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<ManagerInner>,
}

impl QueueManager {
    /// Create a new queue manager.
    pub fn new(config: QueueConfig, provider: Arc<dyn WorkProvider>) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        let (done, _) = watch::channel(true);

        Self {
            inner: Arc::new(ManagerInner {
                config,
                provider,
                slots,
                registry: RwLock::new(HashMap::new()),
                scope: CancellationToken::new(),
                running: AtomicBool::new(false),
                stop: CancellationToken::new(),
                done,
                cycles: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Spawns the cycle loop and returns immediately.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!("Queue manager already running");
            return;
        }
        self.inner.done.send_replace(false);

        let manager = self.clone();
        let interval = Duration::from_millis(self.inner.config.poll_interval_ms);
        tokio::spawn(async move {
            info!(
                "Queue loop started (max_concurrent={}, interval={:?})",
                manager.inner.config.max_concurrent, interval
            );
            loop {
                let started = Instant::now();
                manager.run_cycle().await;

                if manager.inner.stop.is_cancelled() {
                    break;
                }

                let remaining = interval.saturating_sub(started.elapsed());
                tokio::select! {
                    _ = manager.inner.stop.cancelled() => break,
                    _ = tokio::time::sleep(remaining) => {}
                }
            }

            manager.inner.running.store(false, Ordering::SeqCst);
            manager.inner.done.send_replace(true);
            info!("Queue loop stopped");
        });
    }

    /// Requests a graceful stop.
    ///
    /// No new handles are issued; handles already in flight run to
    /// completion and the loop exits after the current cycle.
    pub fn quit(&self) {
        info!("Queue manager stop requested");
        self.inner.stop.cancel();
    }

    /// Waits until the cycle loop has exited.
    ///
    /// Returns immediately when the loop was never started.
    pub async fn wait(&self) {
        let mut done = self.inner.done.subscribe();
        let _ = done.wait_for(|exited| *exited).await;
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> QueueStatus {
        QueueStatus {
            running: self.is_running(),
            in_flight: self.inner.registry.read().await.len(),
            peak_in_flight: self.inner.peak.load(Ordering::SeqCst),
            cycles_completed: self.inner.cycles.load(Ordering::SeqCst),
            handles_completed: self.inner.completed.load(Ordering::SeqCst),
            max_concurrent: self.inner.config.max_concurrent,
        }
    }

    /// Handles currently in flight.
    pub async fn in_flight(&self) -> Vec<TransformHandle> {
        self.inner.registry.read().await.values().cloned().collect()
    }

    /// Runs one cycle: all four classes drained concurrently.
    ///
    /// Returns the number of handles issued.
    pub async fn run_cycle(&self) -> usize {
        let timer = metrics::CYCLE_DURATION.start_timer();
        let cycle = self.inner.cycles.load(Ordering::SeqCst) + 1;
        debug!("Cycle {} starting", cycle);

        let issued: usize = join_all(WorkClass::ALL.map(|class| self.run_queue(class)))
            .await
            .into_iter()
            .sum();

        timer.observe_duration();
        self.inner.cycles.fetch_add(1, Ordering::SeqCst);
        if issued > 0 {
            info!("Cycle {} finished, {} handles issued", cycle, issued);
        } else {
            debug!("Cycle {} finished, nothing to do", cycle);
        }
        issued
    }

    /// Drains one work class.
    ///
    /// Issues handles while slots are free and the provider keeps returning
    /// running handles, then waits for every issued handle to complete.
    /// Returns the number of handles issued.
    pub async fn run_queue(&self, class: WorkClass) -> usize {
        let mut waiters = JoinSet::new();
        let mut issued = 0;

        loop {
            if self.inner.stop.is_cancelled() {
                debug!("Stop requested, {} stops issuing", class);
                break;
            }

            let permit = match Arc::clone(&self.inner.slots).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let handle = self.inner.provider.next(class, &self.inner.scope).await;
            if handle.is_complete() {
                drop(permit);
                match handle.error() {
                    Some(err) if !err.is_empty_queue() => {
                        warn!("{} provider returned a failed handle: {}", class, err)
                    }
                    _ => debug!("{} queue is empty", class),
                }
                break;
            }

            issued += 1;
            self.register(&handle).await;

            let inner = Arc::clone(&self.inner);
            waiters.spawn(async move {
                handle.wait().await;
                inner.registry.write().await.remove(&handle.cycle_id());
                metrics::HANDLES_IN_FLIGHT.dec();
                inner.completed.fetch_add(1, Ordering::SeqCst);
                drop(permit);
            });
        }

        while let Some(result) = waiters.join_next().await {
            if let Err(e) = result {
                warn!("{} waiter failed: {}", class, e);
            }
        }

        issued
    }

    async fn register(&self, handle: &TransformHandle) {
        let mut registry = self.inner.registry.write().await;
        registry.insert(handle.cycle_id(), handle.clone());
        self.inner.peak.fetch_max(registry.len(), Ordering::SeqCst);
        metrics::HANDLES_IN_FLIGHT.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockWorkProvider;

    fn manager(max_concurrent: usize, provider: &Arc<MockWorkProvider>) -> QueueManager {
        QueueManager::new(
            QueueConfig {
                max_concurrent,
                poll_interval_ms: 60_000,
            },
            Arc::clone(provider) as Arc<dyn WorkProvider>,
        )
    }

    #[tokio::test]
    async fn test_run_queue_with_empty_class() {
        let provider = Arc::new(MockWorkProvider::new(0, Duration::from_millis(5)));
        let manager = manager(2, &provider);

        assert_eq!(manager.run_queue(WorkClass::NewLoad).await, 0);
        assert_eq!(provider.calls(WorkClass::NewLoad).await, 1);
        assert_eq!(manager.status().await.in_flight, 0);
    }

    #[tokio::test]
    async fn test_run_queue_waits_for_single_handle() {
        let provider = Arc::new(MockWorkProvider::new(1, Duration::from_millis(30)));
        let manager = manager(2, &provider);

        assert_eq!(manager.run_queue(WorkClass::StalledLoad).await, 1);

        let issued = provider.issued().await;
        assert_eq!(issued.len(), 1);
        assert!(issued[0].is_complete());
        assert_eq!(manager.status().await.handles_completed, 1);
    }

    #[tokio::test]
    async fn test_run_queue_caps_in_flight_handles() {
        let provider = Arc::new(MockWorkProvider::new(7, Duration::from_millis(20)));
        let manager = manager(3, &provider);

        assert_eq!(manager.run_queue(WorkClass::NewLoad).await, 7);

        assert!(provider.issued().await.iter().all(|h| h.is_complete()));
        assert!(provider.peak_open() <= 3);
        let status = manager.status().await;
        assert!(status.peak_in_flight <= 3);
        assert_eq!(status.peak_in_flight, 3);
        assert_eq!(status.in_flight, 0);
        assert_eq!(status.handles_completed, 7);
    }

    #[tokio::test]
    async fn test_cycle_shares_slots_across_classes() {
        let provider = Arc::new(MockWorkProvider::new(3, Duration::from_millis(20)));
        let manager = manager(2, &provider);

        assert_eq!(manager.run_cycle().await, 12);

        let status = manager.status().await;
        assert_eq!(status.cycles_completed, 1);
        assert_eq!(status.handles_completed, 12);
        assert!(status.peak_in_flight <= 2);
        assert!(provider.peak_open() <= 2);
        for class in WorkClass::ALL {
            assert_eq!(provider.calls(class).await, 4);
        }
    }

    #[tokio::test]
    async fn test_wait_without_start_returns() {
        let provider = Arc::new(MockWorkProvider::new(0, Duration::ZERO));
        let manager = manager(1, &provider);
        tokio::time::timeout(Duration::from_millis(100), manager.wait())
            .await
            .unwrap();
        assert!(!manager.is_running());
    }

    #[tokio::test]
    async fn test_quit_interrupts_interval_wait() {
        let provider = Arc::new(MockWorkProvider::new(0, Duration::ZERO));
        let manager = manager(1, &provider);

        manager.start();
        while manager.status().await.cycles_completed == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(manager.is_running());

        manager.quit();
        tokio::time::timeout(Duration::from_secs(1), manager.wait())
            .await
            .unwrap();
        assert!(!manager.is_running());
        assert_eq!(manager.status().await.cycles_completed, 1);
    }
}
