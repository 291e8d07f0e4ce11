//! Queue manager integration tests.
//!
//! These tests verify the cycle scheduler:
//! - Concurrency cap across work classes
//! - Drain barriers and per-cycle completion counts
//! - Interval pacing and graceful stop
//! - End-to-end cycles against the transform engine

use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use pressline_core::{
    testing::{fixtures, MockDownloader, MockOrderProvider, MockRepository, MockWorkProvider},
    vendor::StatusChangeResult,
    EngineConfig, LocalOrderRecord, OrderState, QueueConfig, QueueManager, Repository,
    TransformEngine, VendorStatus, WorkClass, WorkProvider,
};

fn queue(max_concurrent: usize, poll_interval_ms: u64, provider: Arc<dyn WorkProvider>) -> QueueManager {
    QueueManager::new(
        QueueConfig {
            max_concurrent,
            poll_interval_ms,
        },
        provider,
    )
}

#[tokio::test]
async fn test_drain_barrier_for_many_handles() {
    let provider = Arc::new(MockWorkProvider::new(9, Duration::from_millis(15)));
    let manager = queue(4, 60_000, provider.clone());

    let issued = manager.run_queue(WorkClass::StalledTransform).await;

    assert_eq!(issued, 9);
    let handles = provider.issued().await;
    assert_eq!(handles.len(), 9);
    assert!(handles.iter().all(|h| h.is_complete()));
    assert!(manager.in_flight().await.is_empty());
    assert!(provider.peak_open() <= 4);
}

#[tokio::test]
async fn test_each_cycle_completes_four_times_the_calls() {
    let provider = Arc::new(MockWorkProvider::new(2, Duration::from_millis(10)));
    let manager = queue(3, 60_000, provider.clone());

    manager.run_cycle().await;
    manager.run_cycle().await;

    let status = manager.status().await;
    assert_eq!(status.cycles_completed, 2);
    assert_eq!(status.handles_completed, 16);
    assert!(status.peak_in_flight <= 3);
    for class in WorkClass::ALL {
        assert_eq!(provider.calls(class).await, 6);
    }
}

#[tokio::test]
async fn test_cycles_are_paced_by_interval() {
    let provider = Arc::new(MockWorkProvider::new(0, Duration::ZERO));
    let manager = queue(2, 40, provider.clone());

    let started = Instant::now();
    manager.start();
    while manager.status().await.cycles_completed < 3 {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    let elapsed = started.elapsed();

    manager.quit();
    manager.wait().await;

    // Cycle k starts no earlier than (k - 1) intervals after the first.
    assert!(elapsed >= Duration::from_millis(80), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_quit_lets_in_flight_handles_finish() {
    let provider = Arc::new(MockWorkProvider::new(1, Duration::from_millis(100)));
    let manager = queue(4, 60_000, provider.clone());

    manager.start();
    while manager.status().await.in_flight == 0 {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    manager.quit();
    tokio::time::timeout(Duration::from_secs(2), manager.wait())
        .await
        .expect("manager should stop");

    let handles = provider.issued().await;
    assert!(!handles.is_empty());
    for handle in handles {
        assert!(handle.is_complete());
        assert_eq!(handle.error(), None);
    }
    let status = manager.status().await;
    assert!(!status.running);
    assert_eq!(status.in_flight, 0);
}

#[tokio::test]
async fn test_cycle_drives_engine_orders_to_ready() {
    let work = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    let provider = Arc::new(MockOrderProvider::new());
    let repository = Arc::new(MockRepository::new());
    let downloader = Arc::new(MockDownloader::with_delay(Duration::from_millis(10)));
    repository.add_alias(fixtures::book_alias("book_cover", true));

    for i in 0..5 {
        let id = format!("10{:02}", i);
        provider
            .insert(fixtures::book_order(&id, VendorStatus::Ready, "book_cover", 1))
            .await;
        downloader.serve(
            &fixtures::download_link(&id),
            fixtures::sheet_archive("item_1", 2).unwrap(),
        );
    }

    let engine = TransformEngine::new(
        EngineConfig::new(work.path(), out.path()),
        provider.clone(),
        repository.clone(),
        downloader.clone(),
    );
    let manager = queue(2, 60_000, Arc::new(engine.clone()));

    manager.run_cycle().await;

    let status = manager.status().await;
    assert_eq!(status.handles_completed, 5);
    assert!(status.peak_in_flight <= 2);
    assert_eq!(status.in_flight, 0);
    assert_eq!(engine.in_flight_count(), 0);
    for i in 0..5 {
        let id = format!("10{:02}", i);
        assert_eq!(provider.status_of(&id).await, Some(VendorStatus::InWork));
        assert_eq!(
            repository.order(&format!("1_{}", id)).unwrap().state,
            OrderState::Ready
        );
    }
}

#[tokio::test]
async fn test_failed_group_finalize_drains_stalled_finalize_queue() {
    let work = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();

    let provider = Arc::new(MockOrderProvider::new());
    let repository = Arc::new(MockRepository::new());
    provider
        .insert(fixtures::vendor_order("8001", VendorStatus::LoadStarted))
        .await;
    provider
        .set_status_result(StatusChangeResult {
            code: "error".to_string(),
            message: Some("status change refused".to_string()),
        })
        .await;

    let mut base = LocalOrderRecord::new(1, "8001", "");
    base.state = OrderState::Wait;
    base.group_id = 12;
    repository.insert_order(base);
    repository
        .set_group_state(12, OrderState::FinalizeWait)
        .unwrap();

    let engine = TransformEngine::new(
        EngineConfig::new(work.path(), out.path()),
        provider.clone(),
        repository.clone(),
        Arc::new(MockDownloader::new()),
    );
    let manager = queue(1, 60_000, Arc::new(engine));

    let issued = tokio::time::timeout(
        Duration::from_secs(2),
        manager.run_queue(WorkClass::StalledFinalize),
    )
    .await
    .expect("stalled finalize queue should drain");

    assert_eq!(issued, 1);
    assert_eq!(provider.status_changes().await.len(), 1);
    assert_eq!(
        repository.order("1_8001").unwrap().state,
        OrderState::FinalizeError
    );
    assert_eq!(repository.group_state(12), Some(OrderState::FinalizeError));
}
