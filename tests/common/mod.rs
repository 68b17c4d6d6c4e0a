#![allow(dead_code)]

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use bigdecimal::BigDecimal;
use chrono::{DateTime, TimeZone, Utc};

use order_settlement::clock::{Clock, MockClock};
use order_settlement::domain::errors::OrderError;
use order_settlement::domain::order::{CreateOrderParams, SubOrderParams};
use order_settlement::domain::ports::ProductCatalog;
use order_settlement::domain::ports::ProductSnapshot;
use order_settlement::{MemoryOrderStore, OrderService};

pub const BUYER: i64 = 1001;
pub const COURIER: i64 = 2001;
pub const PRODUCT_A: i64 = 1;
pub const PRODUCT_B: i64 = 2;

/// Catalog backed by a fixed product list.
#[derive(Default)]
pub struct StaticCatalog {
    products: HashMap<i64, ProductSnapshot>,
}

impl StaticCatalog {
    pub fn with(mut self, product: ProductSnapshot) -> Self {
        self.products.insert(product.id, product);
        self
    }
}

impl ProductCatalog for StaticCatalog {
    fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<ProductSnapshot>, OrderError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.products.get(id).cloned())
            .collect())
    }
}

pub fn decimal(raw: &str) -> BigDecimal {
    BigDecimal::from_str(raw).unwrap()
}

pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 4, 0, 0).unwrap()
}

pub fn product(id: i64, price: &str) -> ProductSnapshot {
    ProductSnapshot {
        id,
        name: format!("product-{id}"),
        price: decimal(price),
        unit: "box".to_string(),
        specs: 1,
        enabled: true,
        starts_at: None,
        ends_at: None,
    }
}

/// Product A at 10 and product B at 5.
pub fn catalog() -> StaticCatalog {
    StaticCatalog::default()
        .with(product(PRODUCT_A, "10"))
        .with(product(PRODUCT_B, "5"))
}

/// Two of A and one of B, 25 in total.
pub fn two_line_params(amount: &str) -> CreateOrderParams {
    CreateOrderParams {
        sub_orders: vec![
            SubOrderParams {
                product: PRODUCT_A,
                count: 2,
            },
            SubOrderParams {
                product: PRODUCT_B,
                count: 1,
            },
        ],
        amount: decimal(amount),
        recommender: None,
        receiver_name: "Ada Lovelace".to_string(),
        receiver_mobile: "13800000000".to_string(),
        receiver_base_address: "440300".to_string(),
        receiver_address: "1 Main St".to_string(),
    }
}

pub struct Harness {
    pub store: MemoryOrderStore,
    pub clock: Arc<MockClock>,
    pub service: OrderService<MemoryOrderStore>,
}

pub fn harness() -> Harness {
    harness_with(catalog())
}

pub fn harness_with(catalog: StaticCatalog) -> Harness {
    let store = MemoryOrderStore::new();
    let clock = Arc::new(MockClock::pinned_at(noon()));
    let service = OrderService::new(store.clone(), Arc::new(catalog), clock.clone());
    Harness {
        store,
        clock,
        service,
    }
}

/// Clock pinned at [`noon`] whose first `parties` reads block until all of
/// them have arrived. Lines concurrent callers up right after their first
/// clock read.
pub struct RendezvousClock {
    barrier: Barrier,
    waiting: AtomicUsize,
}

impl RendezvousClock {
    pub fn new(parties: usize) -> Self {
        Self {
            barrier: Barrier::new(parties),
            waiting: AtomicUsize::new(parties),
        }
    }
}

impl Clock for RendezvousClock {
    fn now(&self) -> DateTime<Utc> {
        let first_read = self
            .waiting
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if first_read {
            self.barrier.wait();
        }
        noon()
    }
}

/// A second service over `h.store` whose callers meet on the clock.
pub fn rendezvous_service(h: &Harness, parties: usize) -> OrderService<MemoryOrderStore> {
    OrderService::new(
        h.store.clone(),
        Arc::new(catalog()),
        Arc::new(RendezvousClock::new(parties)),
    )
}
