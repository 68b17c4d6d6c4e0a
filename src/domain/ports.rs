use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::errors::OrderError;
use super::order::{
    CommissionFilter, Order, OrderCommission, OrderDelivery, OrderFilter, OrderPayment,
    OrderStatusChange, Page, SubOrder,
};
use super::status::{OrderPaymentStatus, OrderStatus, SubOrderStatus};

// ── Persistence ──────────────────────────────────────────────────────────────

/// Row-level access to the order tables.
///
/// Every `update_*` method returns the number of affected rows so callers can
/// detect a lost optimistic-concurrency race themselves.
pub trait OrderConn {
    fn insert_order(&mut self, order: &Order) -> Result<(), OrderError>;
    fn find_order_by_sn(&mut self, sn: &str) -> Result<Option<Order>, OrderError>;
    fn list_orders(&mut self, filter: &OrderFilter, page: Page) -> Result<Vec<Order>, OrderError>;
    fn count_orders(&mut self, filter: &OrderFilter) -> Result<i64, OrderError>;
    /// Status of every order matching `filter`, one entry per order.
    fn order_statuses(&mut self, filter: &OrderFilter) -> Result<Vec<OrderStatus>, OrderError>;
    fn update_order_amounts(
        &mut self,
        id: Uuid,
        amount: &BigDecimal,
        pay_amount: &BigDecimal,
    ) -> Result<usize, OrderError>;
    /// `UPDATE orders SET .. WHERE id = ? AND status = ?`
    fn update_order_status(
        &mut self,
        id: Uuid,
        expected: OrderStatus,
        change: &OrderStatusChange,
    ) -> Result<usize, OrderError>;
    /// Only assigns when no courier is set yet.
    fn assign_courier(
        &mut self,
        id: Uuid,
        courier: i64,
        at: DateTime<Utc>,
    ) -> Result<usize, OrderError>;

    fn insert_sub_order(&mut self, sub_order: &SubOrder) -> Result<(), OrderError>;
    fn find_sub_order(&mut self, id: Uuid) -> Result<Option<SubOrder>, OrderError>;
    fn list_sub_orders(&mut self, order_ids: &[Uuid]) -> Result<Vec<SubOrder>, OrderError>;
    /// `UPDATE sub_orders SET status = ? WHERE id = ? AND status = ?`
    fn update_sub_order_status(
        &mut self,
        id: Uuid,
        expected: SubOrderStatus,
        next: SubOrderStatus,
        at: DateTime<Utc>,
    ) -> Result<usize, OrderError>;
    /// Moves every sub-order of the order to `status`, regardless of its
    /// current state.
    fn set_all_sub_order_status(
        &mut self,
        order_id: Uuid,
        status: SubOrderStatus,
        at: DateTime<Utc>,
    ) -> Result<usize, OrderError>;

    fn insert_payment(&mut self, payment: &OrderPayment) -> Result<(), OrderError>;
    fn find_payment(&mut self, order_id: Uuid) -> Result<Option<OrderPayment>, OrderError>;
    fn update_payment_status(
        &mut self,
        id: Uuid,
        status: OrderPaymentStatus,
        message: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<usize, OrderError>;

    fn insert_delivery(&mut self, delivery: &OrderDelivery) -> Result<(), OrderError>;
    fn find_delivery(&mut self, order_id: Uuid) -> Result<Option<OrderDelivery>, OrderError>;

    /// `INSERT .. ON CONFLICT (order_sn, recommender) DO NOTHING`
    fn insert_commission_if_absent(
        &mut self,
        commission: &OrderCommission,
    ) -> Result<usize, OrderError>;
    fn find_commissions_by_sn(&mut self, sn: &str) -> Result<Vec<OrderCommission>, OrderError>;
    fn list_commissions(
        &mut self,
        filter: &CommissionFilter,
        page: Page,
    ) -> Result<Vec<OrderCommission>, OrderError>;
    fn count_commissions(&mut self, filter: &CommissionFilter) -> Result<i64, OrderError>;
}

/// Hands out connections, optionally wrapped in a transaction.
pub trait OrderStore: Send + Sync + 'static {
    fn with_conn<T, F>(&self, f: F) -> Result<T, OrderError>
    where
        F: FnOnce(&mut dyn OrderConn) -> Result<T, OrderError>;

    /// Runs `f` atomically: all of its writes commit together when it
    /// returns `Ok`, none of them are visible when it returns `Err`.
    fn transaction<T, F>(&self, f: F) -> Result<T, OrderError>
    where
        F: FnOnce(&mut dyn OrderConn) -> Result<T, OrderError>;
}

// ── Collaborators ────────────────────────────────────────────────────────────

/// Catalog data needed to price and snapshot an order line.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSnapshot {
    pub id: i64,
    pub name: String,
    pub price: BigDecimal,
    pub unit: String,
    /// Specs contained in one unit.
    pub specs: i32,
    pub enabled: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl ProductSnapshot {
    /// Enabled and `now` within `[starts_at, ends_at)`; absent bounds are open.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.enabled
            && self.starts_at.map_or(true, |start| now >= start)
            && self.ends_at.map_or(true, |end| now < end)
    }
}

pub trait ProductCatalog: Send + Sync {
    fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<ProductSnapshot>, OrderError>;
}

pub trait MarketingGroupDirectory: Send + Sync {
    fn marketing_group(&self, user_id: i64) -> Result<Option<String>, OrderError>;
}

/// Commission ratios and marketing-group ownership.
pub trait CommissionConfig: Send + Sync {
    /// Zero when the group has no ratio configured.
    fn commission_ratio(&self, group: &str) -> f64;
    fn marketing_group_owner(&self, group: &str) -> Option<i64>;
}

/// Display names attached to read views.
pub trait NameLookup: Send + Sync {
    fn user_name(&self, _user_id: i64) -> Option<String> {
        None
    }

    fn region_name(&self, _code: &str) -> Option<String> {
        None
    }
}

pub struct NoNames;

impl NameLookup for NoNames {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Success,
    Failure(String),
}

pub trait PaymentGateway: Send + Sync {
    fn charge(&self, payment: &OrderPayment) -> Result<PaymentOutcome, OrderError>;
}

/// Accepts every charge.
pub struct MockPaymentGateway;

impl PaymentGateway for MockPaymentGateway {
    fn charge(&self, _payment: &OrderPayment) -> Result<PaymentOutcome, OrderError> {
        Ok(PaymentOutcome::Success)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn product(enabled: bool) -> ProductSnapshot {
        ProductSnapshot {
            id: 1,
            name: "Tea".to_string(),
            price: BigDecimal::from(10),
            unit: "box".to_string(),
            specs: 1,
            enabled,
            starts_at: None,
            ends_at: None,
        }
    }

    #[test]
    fn availability_window_is_half_open() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut p = product(true);
        assert!(p.is_available(now));

        p.starts_at = Some(now);
        p.ends_at = Some(now + Duration::hours(1));
        assert!(p.is_available(now));

        p.ends_at = Some(now);
        assert!(!p.is_available(now));

        p.starts_at = Some(now + Duration::seconds(1));
        p.ends_at = None;
        assert!(!p.is_available(now));
    }

    #[test]
    fn disabled_product_is_unavailable() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert!(!product(false).is_available(now));
    }
}
