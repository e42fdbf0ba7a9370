use alert_engine::{Faults, MemoryStore, Scanner};
use chrono::{TimeZone, Utc};
use models::{Id, IdGenerator, SaleRow, Sku, Tenant};
use pretty_assertions::assert_eq;
use scanner::{
    select_scheduler, IntervalScheduler, QueueConfig, ScanExecutor, ScanState, Scheduler,
    SelectedScheduler,
};
use std::sync::Arc;
use std::time::Duration;

const SCAN_INTERVAL: Duration = Duration::from_secs(15 * 60);

fn breaching_scanner() -> Arc<Scanner<MemoryStore>> {
    let store = MemoryStore::new();
    let tenant_id = Id::from_u64(1);

    store.add_tenant(Tenant {
        id: tenant_id,
        slug: "acme".to_string(),
        name: "Acme".to_string(),
    });
    store.add_sku(Sku {
        id: Id::from_u64(0x10),
        tenant_id,
        sku_code: "SKU-10".to_string(),
        name: "Widget".to_string(),
        mrp: 120.0,
        map: 100.0,
        cost: 50.0,
        on_hand_qty: 10,
    });
    // Recent enough to stay within the sales window of a scan run "now".
    store.add_sale(SaleRow {
        id: Id::from_u64(0x11),
        tenant_id,
        sku_id: Id::from_u64(0x10),
        dealer_id: Id::from_u64(0x20),
        sold_price: 90.0,
        qty: 2,
        sold_at: Utc::now() - chrono::Duration::hours(1),
        order_ref: "SO-1".to_string(),
    });

    Arc::new(Scanner::new(store, IdGenerator::new(1)))
}

fn config(queue_database_url: Option<&str>, require_durable_queue: bool) -> QueueConfig {
    QueueConfig {
        queue_database_url: queue_database_url.map(|url| url.parse().unwrap()),
        database_ca: None,
        require_durable_queue,
        scan_interval: SCAN_INTERVAL,
        dequeue_interval: Duration::from_secs(10),
        heartbeat_timeout: Duration::from_secs(60),
    }
}

#[tokio::test(start_paused = true)]
async fn test_interval_scans_immediately_and_on_cadence() {
    let scanner = breaching_scanner();

    IntervalScheduler::new(scanner.clone(), SCAN_INTERVAL)
        .run(tokio::time::sleep(Duration::from_secs(31 * 60)))
        .await
        .unwrap();

    // Scans at 0m, 15m, and 30m.
    assert_eq!(scanner.store().tenant_listings(), 3);
    // Only the first scan created alerts.
    assert_eq!(scanner.store().alerts().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_interval_continues_after_failed_scans() {
    let scanner = breaching_scanner();
    scanner.store().set_faults(Faults {
        tenant_listing: true,
        ..Default::default()
    });

    IntervalScheduler::new(scanner.clone(), SCAN_INTERVAL)
        .run(tokio::time::sleep(Duration::from_secs(46 * 60)))
        .await
        .unwrap();

    assert_eq!(scanner.store().tenant_listings(), 4);
    assert!(scanner.store().alerts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_interval_shutdown_waits_for_running_scan() {
    let scanner = breaching_scanner();
    let delay = Duration::from_secs(60);
    scanner.store().set_faults(Faults {
        insert_delay: Some(delay),
        ..Default::default()
    });

    // Shutdown resolves between the scan's first and second inserts.
    let started = tokio::time::Instant::now();
    IntervalScheduler::new(scanner.clone(), SCAN_INTERVAL)
        .run(tokio::time::sleep(Duration::from_secs(90)))
        .await
        .unwrap();

    // Both inserts completed, and nothing more ran after them.
    let elapsed = started.elapsed();
    assert!(elapsed >= delay * 2 && elapsed < delay * 3, "{elapsed:?}");
    assert_eq!(scanner.store().tenant_listings(), 1);
    assert_eq!(scanner.store().alerts().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_scan_executor_records_outcomes() {
    let scanner = breaching_scanner();
    let executor = ScanExecutor::new(scanner.clone(), SCAN_INTERVAL);
    let now = Utc.with_ymd_and_hms(2024, 6, 20, 12, 0, 0).unwrap();
    let mut state = ScanState::default();

    // No time passes while paused, so the full interval remains.
    let sleep = executor.scan(now, &mut state).await;
    assert_eq!(sleep, SCAN_INTERVAL);
    assert_eq!(state.last_scan_at, Some(now));
    assert_eq!(state.last_error, None);
    assert_eq!(state.failures, 0);
    assert_eq!(
        state.last_summary.as_ref().map(|s| s.tenants_processed),
        Some(1)
    );

    scanner.store().set_faults(Faults {
        tenant_listing: true,
        ..Default::default()
    });
    let later = now + chrono::Duration::minutes(15);

    for failures in 1..=2 {
        let sleep = executor.scan(later, &mut state).await;
        assert_eq!(sleep, SCAN_INTERVAL);
        assert_eq!(state.failures, failures);
    }
    assert_eq!(state.last_scan_at, Some(later));
    assert!(state.last_error.as_deref().unwrap().starts_with("listing tenants"));
    // The last successful summary is retained.
    assert!(state.last_summary.is_some());

    scanner.store().set_faults(Faults::default());
    executor.scan(later, &mut state).await;
    assert_eq!(state.failures, 0);
    assert_eq!(state.last_error, None);
}

#[test]
fn test_scan_state_serde() {
    let state: ScanState = serde_json::from_str("{}").unwrap();
    assert_eq!(state, ScanState::default());

    let state = ScanState {
        failures: 2,
        last_error: Some("listing tenants: store unavailable".to_string()),
        ..Default::default()
    };
    assert_eq!(
        serde_json::to_string(&state).unwrap(),
        r#"{"lastError":"listing tenants: store unavailable","failures":2}"#
    );
}

#[tokio::test]
async fn test_select_without_queue_falls_back_to_interval() {
    let selected = select_scheduler(breaching_scanner(), &config(None, false))
        .await
        .unwrap();

    assert!(matches!(selected, SelectedScheduler::Interval(_)));
}

#[tokio::test]
async fn test_select_requires_configured_queue() {
    let Err(err) = select_scheduler(breaching_scanner(), &config(None, true)).await else {
        panic!("expected an error");
    };

    assert_eq!(
        err.to_string(),
        "a durable task queue is required, but no queue database is configured"
    );
}
