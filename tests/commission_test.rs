mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use order_settlement::application::scheduler::{run_commission_once, run_commission_schedule};
use order_settlement::application::settings::{CommissionSnapshot, ALL_GROUPS};
use order_settlement::clock::MockClock;
use order_settlement::domain::errors::OrderError;
use order_settlement::domain::order::{CommissionFilter, Order, Page};
use order_settlement::domain::ports::{MarketingGroupDirectory, OrderConn, OrderStore};
use order_settlement::infrastructure::directory::StaticMarketingGroups;
use order_settlement::{
    CommissionLedger, CommissionSettings, LedgerOptions, MemoryOrderStore, OrderService,
};

use common::{decimal, product, StaticCatalog, BUYER};

const RECOMMENDER: i64 = 7;
const GROUP_OWNER: i64 = 42;

fn created_at() -> DateTime<Utc> {
    // 2024-06-01 12:00 at +08:00
    Utc.with_ymd_and_hms(2024, 6, 1, 4, 0, 0).unwrap()
}

fn next_day() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 2, 4, 0, 0).unwrap()
}

fn items(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

fn settings(ratios: &[&str], groups: &[&str]) -> Arc<CommissionSettings> {
    Arc::new(CommissionSettings::new(CommissionSnapshot::from_items(
        &items(ratios),
        &items(groups),
    )))
}

struct Fixture {
    store: MemoryOrderStore,
    clock: Arc<MockClock>,
    orders: OrderService<MemoryOrderStore>,
}

impl Fixture {
    fn new() -> Self {
        let store = MemoryOrderStore::new();
        let clock = Arc::new(MockClock::pinned_at(created_at()));
        let catalog = StaticCatalog::default().with(product(1, "100"));
        let orders = OrderService::new(store.clone(), Arc::new(catalog), clock.clone());
        Self {
            store,
            clock,
            orders,
        }
    }

    /// A closed order paying 100, referred by `recommender`.
    fn closed_order(&self, recommender: Option<i64>) -> Order {
        let mut params = common::two_line_params("100");
        params.sub_orders.truncate(1);
        params.sub_orders[0].product = 1;
        params.sub_orders[0].count = 1;
        params.recommender = recommender;
        let order = self.orders.create_with_sub_orders(BUYER, params).unwrap();
        self.orders.close(&order.sn, BUYER).unwrap()
    }

    fn ledger(
        &self,
        settings: Arc<CommissionSettings>,
        groups: Arc<dyn MarketingGroupDirectory>,
    ) -> CommissionLedger<MemoryOrderStore> {
        CommissionLedger::new(self.store.clone(), settings, groups, self.clock.clone())
    }
}

fn no_groups() -> Arc<dyn MarketingGroupDirectory> {
    Arc::new(StaticMarketingGroups::default())
}

fn north_groups() -> Arc<dyn MarketingGroupDirectory> {
    Arc::new(StaticMarketingGroups::new(HashMap::from([(
        RECOMMENDER,
        "north".to_string(),
    )])))
}

#[test]
fn closed_referred_order_earns_commission_once() {
    let f = Fixture::new();
    let order = f.closed_order(Some(RECOMMENDER));
    f.clock.set(next_day());
    let ledger = f.ledger(settings(&[r#"{"group":"*","ratio":0.05}"#], &[]), no_groups());

    let report = ledger.run().unwrap();
    assert_eq!(report.orders_scanned, 1);
    assert_eq!(report.rows_created, 1);
    assert!(!report.truncated);

    let rows = ledger.find_by_sn(&order.sn).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].recommender, RECOMMENDER);
    assert_eq!(rows[0].user_id, BUYER);
    assert_eq!(rows[0].group_name, ALL_GROUPS);
    assert_eq!(rows[0].pay_amount, decimal("100"));
    assert_eq!(rows[0].commission_amount, decimal("5"));

    let again = ledger.run().unwrap();
    assert_eq!(again.orders_scanned, 1);
    assert_eq!(again.rows_created, 0);
    assert_eq!(ledger.find_by_sn(&order.sn).unwrap(), rows);
}

#[test]
fn group_owner_gets_a_second_row() {
    let f = Fixture::new();
    let order = f.closed_order(Some(RECOMMENDER));
    f.clock.set(next_day());
    let ledger = f.ledger(
        settings(
            &[
                r#"{"group":"*","ratio":0.05}"#,
                r#"{"group":"north","ratio":0.02}"#,
            ],
            &[r#"{"name":"north","owner":42}"#],
        ),
        north_groups(),
    );

    let report = ledger.run().unwrap();
    assert_eq!(report.rows_created, 2);

    let owner = CommissionFilter {
        recommender: Some(GROUP_OWNER),
        ..CommissionFilter::default()
    };
    let rows = ledger.list(&owner, Page::default()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].order_sn, order.sn);
    assert_eq!(rows[0].group_name, "north");
    assert_eq!(rows[0].commission_amount, decimal("2"));
    assert_eq!(ledger.count(&CommissionFilter::default()).unwrap(), 2);
}

#[test]
fn zero_global_ratio_skips_the_order() {
    let f = Fixture::new();
    f.closed_order(Some(RECOMMENDER));
    f.clock.set(next_day());
    let ledger = f.ledger(
        settings(
            &[r#"{"group":"north","ratio":0.02}"#],
            &[r#"{"name":"north","owner":42}"#],
        ),
        north_groups(),
    );

    let report = ledger.run().unwrap();
    assert_eq!(report.orders_scanned, 1);
    assert_eq!(report.rows_created, 0);
    assert_eq!(f.store.row_counts().unwrap().commissions, 0);
}

struct UnreachableDirectory;

impl MarketingGroupDirectory for UnreachableDirectory {
    fn marketing_group(&self, _user_id: i64) -> Result<Option<String>, OrderError> {
        Err(OrderError::store("directory unreachable"))
    }
}

#[test]
fn group_lookup_failure_keeps_referrer_row() {
    let f = Fixture::new();
    let order = f.closed_order(Some(RECOMMENDER));
    f.clock.set(next_day());
    let ledger = f.ledger(
        settings(&[r#"{"group":"*","ratio":0.05}"#], &[]),
        Arc::new(UnreachableDirectory),
    );

    let report = ledger.run().unwrap();
    assert_eq!(report.rows_created, 1);
    assert_eq!(ledger.find_by_sn(&order.sn).unwrap()[0].recommender, RECOMMENDER);
}

#[test]
fn only_closed_referred_orders_in_window_count() {
    let f = Fixture::new();
    f.closed_order(None);
    let open = f
        .orders
        .create_with_sub_orders(BUYER, {
            let mut params = common::two_line_params("100");
            params.sub_orders.truncate(1);
            params.sub_orders[0].product = 1;
            params.sub_orders[0].count = 1;
            params.recommender = Some(RECOMMENDER);
            params
        })
        .unwrap();
    // created two days before the run, outside the window
    f.clock.set(created_at() - chrono::Duration::days(1));
    f.closed_order(Some(RECOMMENDER));
    f.clock.set(next_day());

    let ledger = f.ledger(settings(&[r#"{"group":"*","ratio":0.05}"#], &[]), no_groups());
    let report = ledger.run().unwrap();
    assert_eq!(report.orders_scanned, 0);
    assert_eq!(report.rows_created, 0);
    assert!(ledger.find_by_sn(&open.sn).unwrap().is_empty());
}

#[test]
fn page_bound_truncates_and_next_run_catches_up() {
    let f = Fixture::new();
    for _ in 0..3 {
        f.closed_order(Some(RECOMMENDER));
    }
    f.clock.set(next_day());
    let config = settings(&[r#"{"group":"*","ratio":0.05}"#], &[]);

    let bounded = f.ledger(Arc::clone(&config), no_groups()).with_options(LedgerOptions {
        page_size: 1,
        max_pages: 2,
        ..LedgerOptions::default()
    });
    let report = bounded.run().unwrap();
    assert!(report.truncated);
    assert_eq!(report.pages, 2);
    assert_eq!(report.rows_created, 2);

    let full = f.ledger(config, no_groups()).with_options(LedgerOptions {
        page_size: 2,
        ..LedgerOptions::default()
    });
    let report = full.run().unwrap();
    assert!(!report.truncated);
    assert_eq!(report.orders_scanned, 3);
    assert_eq!(report.rows_created, 1);
    assert_eq!(full.count(&CommissionFilter::default()).unwrap(), 3);
}

#[test]
fn refreshed_ratio_applies_to_later_runs_only() {
    let f = Fixture::new();
    let first = f.closed_order(Some(RECOMMENDER));
    f.clock.set(next_day());
    let config = settings(&[r#"{"group":"*","ratio":0.05}"#], &[]);
    let ledger = f.ledger(Arc::clone(&config), no_groups());
    ledger.run().unwrap();

    config.refresh_from_items(&items(&[r#"{"group":"*","ratio":0.1}"#]), &[]);
    ledger.run().unwrap();

    let rows = ledger.find_by_sn(&first.sn).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].commission_amount, decimal("5"));
}

#[tokio::test]
async fn run_once_on_the_blocking_pool() {
    let f = Fixture::new();
    f.closed_order(Some(RECOMMENDER));
    f.clock.set(next_day());
    let ledger = Arc::new(f.ledger(settings(&[r#"{"group":"*","ratio":0.05}"#], &[]), no_groups()));

    let report = run_commission_once(ledger).await.unwrap();
    assert_eq!(report.rows_created, 1);
}

#[tokio::test]
async fn schedule_runs_until_shutdown() {
    let f = Fixture::new();
    f.closed_order(Some(RECOMMENDER));
    f.clock.set(next_day());
    let ledger = Arc::new(f.ledger(settings(&[r#"{"group":"*","ratio":0.05}"#], &[]), no_groups()));

    run_commission_schedule(
        Arc::clone(&ledger),
        Duration::from_millis(20),
        tokio::time::sleep(Duration::from_millis(100)),
    )
    .await;

    for _ in 0..50 {
        if ledger.count(&CommissionFilter::default()).unwrap() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(ledger.count(&CommissionFilter::default()).unwrap(), 1);
}

/// Memory store whose calls are slow and record the peak number in flight.
struct SlowStore {
    inner: MemoryOrderStore,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl SlowStore {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl OrderStore for SlowStore {
    fn with_conn<T, F>(&self, f: F) -> Result<T, OrderError>
    where
        F: FnOnce(&mut dyn OrderConn) -> Result<T, OrderError>,
    {
        self.enter();
        let out = self.inner.with_conn(f);
        self.leave();
        out
    }

    fn transaction<T, F>(&self, f: F) -> Result<T, OrderError>
    where
        F: FnOnce(&mut dyn OrderConn) -> Result<T, OrderError>,
    {
        self.enter();
        let out = self.inner.transaction(f);
        self.leave();
        out
    }
}

#[tokio::test]
async fn scheduled_runs_never_overlap() {
    let f = Fixture::new();
    f.closed_order(Some(RECOMMENDER));
    f.clock.set(next_day());
    let peak = Arc::new(AtomicUsize::new(0));
    let store = SlowStore {
        inner: f.store.clone(),
        active: Arc::new(AtomicUsize::new(0)),
        peak: Arc::clone(&peak),
    };
    let ledger = Arc::new(CommissionLedger::new(
        store,
        settings(&[r#"{"group":"*","ratio":0.05}"#], &[]),
        no_groups(),
        f.clock.clone(),
    ));

    run_commission_schedule(
        Arc::clone(&ledger),
        Duration::from_millis(5),
        tokio::time::sleep(Duration::from_millis(200)),
    )
    .await;

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(f.store.row_counts().unwrap().commissions, 1);
}
