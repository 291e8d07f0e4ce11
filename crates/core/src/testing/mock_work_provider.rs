//! Mock work provider for queue manager tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::engine::TransformHandle;
use crate::queue::{WorkClass, WorkProvider};

#[derive(Debug, Default, Clone, Copy)]
struct ClassCounters {
    calls: usize,
    issued_this_round: usize,
}

/// Mock implementation of the WorkProvider trait.
///
/// Every class issues `per_round` handles, then one empty handle, then starts
/// over; with the queue manager this means `per_round` handles per class per
/// cycle. Each issued handle closes itself after `delay`.
#[derive(Debug)]
pub struct MockWorkProvider {
    per_round: usize,
    delay: Duration,
    counters: Arc<RwLock<HashMap<WorkClass, ClassCounters>>>,
    issued: Arc<RwLock<Vec<TransformHandle>>>,
    open: Arc<AtomicUsize>,
    peak_open: Arc<AtomicUsize>,
}

impl MockWorkProvider {
    pub fn new(per_round: usize, delay: Duration) -> Self {
        Self {
            per_round,
            delay,
            counters: Arc::new(RwLock::new(HashMap::new())),
            issued: Arc::new(RwLock::new(Vec::new())),
            open: Arc::new(AtomicUsize::new(0)),
            peak_open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of `next` calls for `class`.
    pub async fn calls(&self, class: WorkClass) -> usize {
        self.counters
            .read()
            .await
            .get(&class)
            .map(|c| c.calls)
            .unwrap_or(0)
    }

    /// All running handles issued so far.
    pub async fn issued(&self) -> Vec<TransformHandle> {
        self.issued.read().await.clone()
    }

    /// Highest number of issued handles open at the same time.
    pub fn peak_open(&self) -> usize {
        self.peak_open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkProvider for MockWorkProvider {
    async fn next(&self, class: WorkClass, scope: &CancellationToken) -> TransformHandle {
        let issue = {
            let mut counters = self.counters.write().await;
            let counter = counters.entry(class).or_default();
            counter.calls += 1;
            if counter.issued_this_round < self.per_round {
                counter.issued_this_round += 1;
                true
            } else {
                counter.issued_this_round = 0;
                false
            }
        };
        if !issue {
            return TransformHandle::empty(scope);
        }

        let handle = TransformHandle::new(scope);
        let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_open.fetch_max(open, Ordering::SeqCst);
        self.issued.write().await.push(handle.clone());

        let closer = handle.clone();
        let open = Arc::clone(&self.open);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            open.fetch_sub(1, Ordering::SeqCst);
            closer.close().await;
        });

        handle
    }
}
