use std::sync::{Arc, Mutex, MutexGuard};

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::OrderError;
use crate::domain::order::{
    CommissionFilter, Order, OrderCommission, OrderDelivery, OrderFilter, OrderPayment,
    OrderStatusChange, Page, Sort, SubOrder,
};
use crate::domain::ports::{OrderConn, OrderStore};
use crate::domain::status::{OrderPaymentStatus, OrderStatus, SubOrderStatus};

/// Row counts per table, for assertions on what a call left behind.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub orders: usize,
    pub sub_orders: usize,
    pub payments: usize,
    pub deliveries: usize,
    pub commissions: usize,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    orders: Vec<Order>,
    sub_orders: Vec<SubOrder>,
    payments: Vec<OrderPayment>,
    deliveries: Vec<OrderDelivery>,
    commissions: Vec<OrderCommission>,
    // Inserts left before the next one fails; `None` never fails.
    sub_order_insert_budget: Option<usize>,
    payment_insert_budget: Option<usize>,
    delivery_insert_budget: Option<usize>,
}

/// [`OrderStore`] held in process memory, with the same uniqueness rules and
/// guarded updates as the PostgreSQL schema.
///
/// A transaction works on a staged copy of every table that replaces the
/// committed tables only when the closure returns `Ok`. The store lock is held
/// for the whole call, so calls are serialized.
#[derive(Debug, Clone, Default)]
pub struct MemoryOrderStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets the next `n` sub-order inserts succeed and fails every insert
    /// after that.
    #[cfg(any(test, feature = "test-util"))]
    pub fn fail_sub_order_inserts_after(&self, n: usize) -> Result<(), OrderError> {
        self.lock()?.sub_order_insert_budget = Some(n);
        Ok(())
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn fail_payment_inserts_after(&self, n: usize) -> Result<(), OrderError> {
        self.lock()?.payment_insert_budget = Some(n);
        Ok(())
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn fail_delivery_inserts_after(&self, n: usize) -> Result<(), OrderError> {
        self.lock()?.delivery_insert_budget = Some(n);
        Ok(())
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn row_counts(&self) -> Result<RowCounts, OrderError> {
        let tables = self.lock()?;
        Ok(RowCounts {
            orders: tables.orders.len(),
            sub_orders: tables.sub_orders.len(),
            payments: tables.payments.len(),
            deliveries: tables.deliveries.len(),
            commissions: tables.commissions.len(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, OrderError> {
        self.tables
            .lock()
            .map_err(|_| OrderError::store("memory store lock poisoned"))
    }
}

impl OrderStore for MemoryOrderStore {
    fn with_conn<T, F>(&self, f: F) -> Result<T, OrderError>
    where
        F: FnOnce(&mut dyn OrderConn) -> Result<T, OrderError>,
    {
        let mut tables = self.lock()?;
        f(&mut *tables)
    }

    fn transaction<T, F>(&self, f: F) -> Result<T, OrderError>
    where
        F: FnOnce(&mut dyn OrderConn) -> Result<T, OrderError>,
    {
        let mut tables = self.lock()?;
        let mut staged = tables.clone();
        let out = f(&mut staged)?;
        *tables = staged;
        Ok(out)
    }
}

fn unique_violation(index: &str) -> OrderError {
    OrderError::store(format!("duplicate key value violates unique constraint \"{index}\""))
}

fn spend_insert(budget: &mut Option<usize>, table: &str) -> Result<(), OrderError> {
    match *budget {
        Some(0) => Err(OrderError::store(format!("{table} insert failed"))),
        Some(left) => {
            *budget = Some(left - 1);
            Ok(())
        }
        None => Ok(()),
    }
}

fn page_of<T: Clone>(
    mut rows: Vec<&T>,
    page: Page,
    key: impl Fn(&T) -> (DateTime<Utc>, Uuid),
) -> Vec<T> {
    rows.sort_by_key(|row| key(*row));
    if page.sort == Sort::NewestFirst {
        rows.reverse();
    }
    rows.into_iter()
        .skip(usize::try_from(page.offset).unwrap_or(0))
        .take(usize::try_from(page.limit).unwrap_or(0))
        .cloned()
        .collect()
}

impl OrderConn for Tables {
    fn insert_order(&mut self, order: &Order) -> Result<(), OrderError> {
        if self.orders.iter().any(|o| o.id == order.id) {
            return Err(unique_violation("orders_pkey"));
        }
        if self.orders.iter().any(|o| o.sn == order.sn) {
            return Err(unique_violation("idx_order_sn"));
        }
        self.orders.push(order.clone());
        Ok(())
    }

    fn find_order_by_sn(&mut self, sn: &str) -> Result<Option<Order>, OrderError> {
        Ok(self.orders.iter().find(|o| o.sn == sn).cloned())
    }

    fn list_orders(&mut self, filter: &OrderFilter, page: Page) -> Result<Vec<Order>, OrderError> {
        let rows = self.orders.iter().filter(|o| filter.matches(o)).collect();
        Ok(page_of(rows, page, |o: &Order| (o.created_at, o.id)))
    }

    fn count_orders(&mut self, filter: &OrderFilter) -> Result<i64, OrderError> {
        Ok(self.orders.iter().filter(|o| filter.matches(o)).count() as i64)
    }

    fn order_statuses(&mut self, filter: &OrderFilter) -> Result<Vec<OrderStatus>, OrderError> {
        Ok(self
            .orders
            .iter()
            .filter(|o| filter.matches(o))
            .map(|o| o.status)
            .collect())
    }

    fn update_order_amounts(
        &mut self,
        id: Uuid,
        amount: &BigDecimal,
        pay_amount: &BigDecimal,
    ) -> Result<usize, OrderError> {
        let mut affected = 0;
        for order in self.orders.iter_mut().filter(|o| o.id == id) {
            order.amount = amount.clone();
            order.pay_amount = pay_amount.clone();
            affected += 1;
        }
        Ok(affected)
    }

    fn update_order_status(
        &mut self,
        id: Uuid,
        expected: OrderStatus,
        change: &OrderStatusChange,
    ) -> Result<usize, OrderError> {
        let mut affected = 0;
        for order in self
            .orders
            .iter_mut()
            .filter(|o| o.id == id && o.status == expected)
        {
            change.clone().apply_to(order);
            affected += 1;
        }
        Ok(affected)
    }

    fn assign_courier(
        &mut self,
        id: Uuid,
        courier: i64,
        at: DateTime<Utc>,
    ) -> Result<usize, OrderError> {
        let mut affected = 0;
        for order in self
            .orders
            .iter_mut()
            .filter(|o| o.id == id && o.courier.is_none())
        {
            order.courier = Some(courier);
            order.updated_at = at;
            affected += 1;
        }
        Ok(affected)
    }

    fn insert_sub_order(&mut self, sub_order: &SubOrder) -> Result<(), OrderError> {
        spend_insert(&mut self.sub_order_insert_budget, "sub_orders")?;
        if sub_order.product_count < 1 {
            return Err(OrderError::store(
                "new row for relation \"sub_orders\" violates check constraint",
            ));
        }
        if !self.orders.iter().any(|o| o.id == sub_order.main_order) {
            return Err(OrderError::store(
                "insert on table \"sub_orders\" violates foreign key constraint",
            ));
        }
        self.sub_orders.push(sub_order.clone());
        Ok(())
    }

    fn find_sub_order(&mut self, id: Uuid) -> Result<Option<SubOrder>, OrderError> {
        Ok(self.sub_orders.iter().find(|s| s.id == id).cloned())
    }

    fn list_sub_orders(&mut self, order_ids: &[Uuid]) -> Result<Vec<SubOrder>, OrderError> {
        Ok(self
            .sub_orders
            .iter()
            .filter(|s| order_ids.contains(&s.main_order))
            .cloned()
            .collect())
    }

    fn update_sub_order_status(
        &mut self,
        id: Uuid,
        expected: SubOrderStatus,
        next: SubOrderStatus,
        at: DateTime<Utc>,
    ) -> Result<usize, OrderError> {
        let mut affected = 0;
        for line in self
            .sub_orders
            .iter_mut()
            .filter(|s| s.id == id && s.status == expected)
        {
            line.status = next;
            line.updated_at = at;
            affected += 1;
        }
        Ok(affected)
    }

    fn set_all_sub_order_status(
        &mut self,
        order_id: Uuid,
        status: SubOrderStatus,
        at: DateTime<Utc>,
    ) -> Result<usize, OrderError> {
        let mut affected = 0;
        for line in self
            .sub_orders
            .iter_mut()
            .filter(|s| s.main_order == order_id)
        {
            line.status = status;
            line.updated_at = at;
            affected += 1;
        }
        Ok(affected)
    }

    fn insert_payment(&mut self, payment: &OrderPayment) -> Result<(), OrderError> {
        spend_insert(&mut self.payment_insert_budget, "order_payments")?;
        if self
            .payments
            .iter()
            .any(|p| p.main_order == payment.main_order)
        {
            return Err(unique_violation("idx_order_payment_main_order"));
        }
        self.payments.push(payment.clone());
        Ok(())
    }

    fn find_payment(&mut self, order_id: Uuid) -> Result<Option<OrderPayment>, OrderError> {
        Ok(self
            .payments
            .iter()
            .find(|p| p.main_order == order_id)
            .cloned())
    }

    fn update_payment_status(
        &mut self,
        id: Uuid,
        status: OrderPaymentStatus,
        message: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<usize, OrderError> {
        let mut affected = 0;
        for payment in self.payments.iter_mut().filter(|p| p.id == id) {
            payment.status = status;
            payment.message = message.map(str::to_string);
            payment.updated_at = at;
            affected += 1;
        }
        Ok(affected)
    }

    fn insert_delivery(&mut self, delivery: &OrderDelivery) -> Result<(), OrderError> {
        spend_insert(&mut self.delivery_insert_budget, "order_deliveries")?;
        if self
            .deliveries
            .iter()
            .any(|d| d.main_order == delivery.main_order)
        {
            return Err(unique_violation("idx_order_delivery_main_order"));
        }
        self.deliveries.push(delivery.clone());
        Ok(())
    }

    fn find_delivery(&mut self, order_id: Uuid) -> Result<Option<OrderDelivery>, OrderError> {
        Ok(self
            .deliveries
            .iter()
            .find(|d| d.main_order == order_id)
            .cloned())
    }

    fn insert_commission_if_absent(
        &mut self,
        commission: &OrderCommission,
    ) -> Result<usize, OrderError> {
        let exists = self.commissions.iter().any(|c| {
            c.order_sn == commission.order_sn && c.recommender == commission.recommender
        });
        if exists {
            return Ok(0);
        }
        self.commissions.push(commission.clone());
        Ok(1)
    }

    fn find_commissions_by_sn(&mut self, sn: &str) -> Result<Vec<OrderCommission>, OrderError> {
        Ok(self
            .commissions
            .iter()
            .filter(|c| c.order_sn == sn)
            .cloned()
            .collect())
    }

    fn list_commissions(
        &mut self,
        filter: &CommissionFilter,
        page: Page,
    ) -> Result<Vec<OrderCommission>, OrderError> {
        let rows = self.commissions.iter().filter(|c| filter.matches(c)).collect();
        Ok(page_of(rows, page, |c: &OrderCommission| (c.created_at, c.id)))
    }

    fn count_commissions(&mut self, filter: &CommissionFilter) -> Result<i64, OrderError> {
        Ok(self.commissions.iter().filter(|c| filter.matches(c)).count() as i64)
    }
}
