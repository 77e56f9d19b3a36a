//! Worker integration tests
//!
//! Exercise the controller end to end over the SQLite queue and the shared
//! restart signal store, the way separate worker processes would use them.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use msgloop::bus::{BusRouter, LoggingBus};
use msgloop::options::RawOptions;
use msgloop::signal::{RestartSignalStore, SqliteSignalStore};
use msgloop::stop::{FixedMemoryProbe, StopReason};
use msgloop::transport::{Envelope, MessageStatus, SqliteTransport, queue_locator};
use msgloop::worker::{WorkerController, WorkerSetup};
use serde_json::json;
use tempfile::TempDir;

fn worker(dir: &Path, receivers: &[&str], options: RawOptions) -> WorkerController {
    let transport = Arc::new(SqliteTransport::open(dir).unwrap());
    let router = BusRouter::new()
        .with_bus("default", Arc::new(LoggingBus::new("default")))
        .with_fallback("default");

    WorkerController::new(WorkerSetup {
        receiver_locator: Arc::new(queue_locator(&transport, receivers)),
        receiver_names: receivers.iter().map(|r| r.to_string()).collect(),
        bus: Arc::new(router),
        signal_store: Arc::new(SqliteSignalStore::open(dir).unwrap()),
        options,
    })
    .with_memory_probe(Arc::new(FixedMemoryProbe(0)))
    .with_output(std::io::sink())
}

/// Integration test: a limit of one handles exactly one queued message
#[tokio::test]
async fn test_limit_one_consumes_single_message() {
    let temp = TempDir::new().unwrap();
    let transport = SqliteTransport::open(temp.path()).unwrap();
    transport
        .send("async", &Envelope::new("Ping", json!({"n": 1})).with_id("m1"))
        .unwrap();
    transport
        .send("async", &Envelope::new("Ping", json!({"n": 2})).with_id("m2"))
        .unwrap();

    let mut consumer = worker(temp.path(), &["async"], RawOptions::new().with("limit", 1));
    let report = consumer.run().await.unwrap();

    assert_eq!(report.exit_code, 0);
    assert_eq!(report.processed, 1);
    assert_eq!(report.stop_reason, StopReason::MessageLimit(1));
    assert!(report.summary().contains("processed 1 messages"));
    assert_eq!(transport.count("async", MessageStatus::Pending).unwrap(), 1);
}

/// Integration test: stop-workers from another controller ends a running worker
#[tokio::test]
async fn test_stop_workers_ends_running_worker() {
    let temp = TempDir::new().unwrap();
    let mut consumer = worker(temp.path(), &["async"], RawOptions::new().with("sleep", 0.02));
    let mut stopper = worker(temp.path(), &[], RawOptions::new());

    let (report, code) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(consumer.run(), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stopper.stop_workers()
        })
    })
    .await
    .expect("worker did not stop");

    assert_eq!(code.unwrap(), 0);
    let report = report.unwrap();
    assert_eq!(report.exit_code, 0);
    assert_eq!(report.stop_reason, StopReason::RestartSignal);
}

/// Integration test: a stop requested before a worker starts does not stop it
#[tokio::test]
async fn test_earlier_stop_request_is_ignored() {
    let temp = TempDir::new().unwrap();
    worker(temp.path(), &[], RawOptions::new()).stop_workers().unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let transport = SqliteTransport::open(temp.path()).unwrap();
    for i in 0..3 {
        transport
            .send("async", &Envelope::new("Ping", json!({ "n": i })))
            .unwrap();
    }

    let mut consumer = worker(temp.path(), &["async"], RawOptions::new().with("limit", 3));
    let report = consumer.run().await.unwrap();

    assert_eq!(report.processed, 3);
    assert_eq!(report.stop_reason, StopReason::MessageLimit(3));
}

/// Integration test: repeated stop requests succeed and only move the timestamp forward
#[test]
fn test_stop_workers_is_repeatable() {
    let temp = TempDir::new().unwrap();
    let mut stopper = worker(temp.path(), &[], RawOptions::new());

    assert_eq!(stopper.stop_workers().unwrap(), 0);
    let first = SqliteSignalStore::open(temp.path())
        .unwrap()
        .last_requested_at()
        .unwrap()
        .unwrap();

    std::thread::sleep(Duration::from_millis(2));
    assert_eq!(stopper.stop_workers().unwrap(), 0);
    let second = SqliteSignalStore::open(temp.path())
        .unwrap()
        .last_requested_at()
        .unwrap()
        .unwrap();

    assert!(second > first);
}

/// Integration test: the restart signal survives reopening the store
#[test]
fn test_restart_signal_is_durable() {
    let temp = TempDir::new().unwrap();

    let recorded = {
        let store = SqliteSignalStore::open(temp.path()).unwrap();
        store.request_stop().unwrap()
    };

    let store = SqliteSignalStore::open(temp.path()).unwrap();
    assert_eq!(store.last_requested_at().unwrap(), Some(recorded));
}

/// Integration test: failed messages are parked, handled ones removed
#[tokio::test]
async fn test_unrouted_message_is_rejected() {
    let temp = TempDir::new().unwrap();
    let transport = Arc::new(SqliteTransport::open(temp.path()).unwrap());
    transport
        .send("async", &Envelope::new("Ping", json!({})).on_bus("missing.bus"))
        .unwrap();
    transport
        .send("async", &Envelope::new("Ping", json!({})))
        .unwrap();

    let mut consumer = worker(temp.path(), &["async"], RawOptions::new().with("limit", 2));
    let report = consumer.run().await.unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(transport.count("async", MessageStatus::Failed).unwrap(), 1);
    assert_eq!(transport.count("async", MessageStatus::Pending).unwrap(), 0);
}
