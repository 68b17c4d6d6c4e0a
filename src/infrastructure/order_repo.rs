use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::OrderError;
use crate::domain::order::{
    CommissionFilter, Order, OrderCommission, OrderDelivery, OrderFilter, OrderPayment,
    OrderStatusChange, Page, Sort, SubOrder,
};
use crate::domain::ports::{OrderConn, OrderStore};
use crate::domain::status::{OrderPaymentStatus, OrderStatus, SubOrderStatus};
use crate::schema::{order_commissions, order_deliveries, order_payments, orders, sub_orders};

use super::models::{
    OrderCommissionRow, OrderDeliveryRow, OrderPaymentRow, OrderRow, OrderStatusChangeset,
    SubOrderRow,
};

// ── Error conversions (infrastructure concern only) ──────────────────────────

impl From<diesel::result::Error> for OrderError {
    fn from(e: diesel::result::Error) -> Self {
        OrderError::Store(e.to_string())
    }
}

impl From<r2d2::Error> for OrderError {
    fn from(e: r2d2::Error) -> Self {
        OrderError::Store(e.to_string())
    }
}

// ── Store ────────────────────────────────────────────────────────────────────

/// PostgreSQL-backed [`OrderStore`].
#[derive(Clone)]
pub struct DieselOrderStore {
    pool: DbPool,
}

impl DieselOrderStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl OrderStore for DieselOrderStore {
    fn with_conn<T, F>(&self, f: F) -> Result<T, OrderError>
    where
        F: FnOnce(&mut dyn OrderConn) -> Result<T, OrderError>,
    {
        let mut pooled = self.pool.get()?;
        f(&mut PgOrderConn { conn: &mut pooled })
    }

    fn transaction<T, F>(&self, f: F) -> Result<T, OrderError>
    where
        F: FnOnce(&mut dyn OrderConn) -> Result<T, OrderError>,
    {
        let mut pooled = self.pool.get()?;
        let conn: &mut PgConnection = &mut pooled;
        conn.transaction::<_, OrderError, _>(|conn| f(&mut PgOrderConn { conn }))
    }
}

struct PgOrderConn<'a> {
    conn: &'a mut PgConnection,
}

fn filtered_orders(filter: &OrderFilter) -> orders::BoxedQuery<'static, Pg> {
    let mut query = orders::table.into_boxed();
    if let Some(user_id) = filter.user_id {
        query = query.filter(orders::user_id.eq(user_id));
    }
    if let Some(courier) = filter.courier {
        query = query.filter(orders::courier.eq(courier));
    }
    if let Some(status) = filter.status {
        query = query.filter(orders::status.eq(status.as_str()));
    }
    if filter.with_recommender {
        query = query.filter(orders::recommender.is_not_null());
    }
    if let Some(from) = filter.created_from {
        query = query.filter(orders::created_at.ge(from));
    }
    if let Some(before) = filter.created_before {
        query = query.filter(orders::created_at.lt(before));
    }
    query
}

fn filtered_commissions(filter: &CommissionFilter) -> order_commissions::BoxedQuery<'static, Pg> {
    let mut query = order_commissions::table.into_boxed();
    if let Some(user_id) = filter.user_id {
        query = query.filter(order_commissions::user_id.eq(user_id));
    }
    if let Some(recommender) = filter.recommender {
        query = query.filter(order_commissions::recommender.eq(recommender));
    }
    if let Some(sn) = filter.order_sn.clone() {
        query = query.filter(order_commissions::order_sn.eq(sn));
    }
    query
}

impl OrderConn for PgOrderConn<'_> {
    fn insert_order(&mut self, order: &Order) -> Result<(), OrderError> {
        diesel::insert_into(orders::table)
            .values(&OrderRow::try_from(order)?)
            .execute(self.conn)?;
        Ok(())
    }

    fn find_order_by_sn(&mut self, sn: &str) -> Result<Option<Order>, OrderError> {
        orders::table
            .filter(orders::sn.eq(sn))
            .select(OrderRow::as_select())
            .first::<OrderRow>(self.conn)
            .optional()?
            .map(Order::try_from)
            .transpose()
    }

    fn list_orders(&mut self, filter: &OrderFilter, page: Page) -> Result<Vec<Order>, OrderError> {
        let query = filtered_orders(filter)
            .select(OrderRow::as_select())
            .limit(page.limit)
            .offset(page.offset);
        let query = match page.sort {
            Sort::NewestFirst => query.order((orders::created_at.desc(), orders::id.desc())),
            Sort::OldestFirst => query.order((orders::created_at.asc(), orders::id.asc())),
        };
        let rows: Vec<OrderRow> = query.load(self.conn)?;
        rows.into_iter().map(Order::try_from).collect()
    }

    fn count_orders(&mut self, filter: &OrderFilter) -> Result<i64, OrderError> {
        Ok(filtered_orders(filter).count().get_result::<i64>(self.conn)?)
    }

    fn order_statuses(&mut self, filter: &OrderFilter) -> Result<Vec<OrderStatus>, OrderError> {
        let codes: Vec<String> = filtered_orders(filter)
            .select(orders::status)
            .load(self.conn)?;
        codes
            .iter()
            .map(|code| {
                code.parse()
                    .map_err(|e| OrderError::store(format!("corrupt order status: {e}")))
            })
            .collect()
    }

    fn update_order_amounts(
        &mut self,
        id: Uuid,
        amount: &BigDecimal,
        pay_amount: &BigDecimal,
    ) -> Result<usize, OrderError> {
        Ok(diesel::update(orders::table.find(id))
            .set((
                orders::amount.eq(amount.clone()),
                orders::pay_amount.eq(pay_amount.clone()),
            ))
            .execute(self.conn)?)
    }

    fn update_order_status(
        &mut self,
        id: Uuid,
        expected: OrderStatus,
        change: &OrderStatusChange,
    ) -> Result<usize, OrderError> {
        let changeset = OrderStatusChangeset::try_from(change)?;
        Ok(diesel::update(
            orders::table
                .filter(orders::id.eq(id))
                .filter(orders::status.eq(expected.as_str())),
        )
        .set(&changeset)
        .execute(self.conn)?)
    }

    fn assign_courier(
        &mut self,
        id: Uuid,
        courier: i64,
        at: DateTime<Utc>,
    ) -> Result<usize, OrderError> {
        Ok(diesel::update(
            orders::table
                .filter(orders::id.eq(id))
                .filter(orders::courier.is_null()),
        )
        .set((orders::courier.eq(Some(courier)), orders::updated_at.eq(at)))
        .execute(self.conn)?)
    }

    fn insert_sub_order(&mut self, sub_order: &SubOrder) -> Result<(), OrderError> {
        diesel::insert_into(sub_orders::table)
            .values(&SubOrderRow::from(sub_order))
            .execute(self.conn)?;
        Ok(())
    }

    fn find_sub_order(&mut self, id: Uuid) -> Result<Option<SubOrder>, OrderError> {
        sub_orders::table
            .find(id)
            .select(SubOrderRow::as_select())
            .first::<SubOrderRow>(self.conn)
            .optional()?
            .map(SubOrder::try_from)
            .transpose()
    }

    fn list_sub_orders(&mut self, order_ids: &[Uuid]) -> Result<Vec<SubOrder>, OrderError> {
        if order_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<SubOrderRow> = sub_orders::table
            .filter(sub_orders::main_order.eq_any(order_ids.to_vec()))
            .select(SubOrderRow::as_select())
            .order((sub_orders::created_at.asc(), sub_orders::id.asc()))
            .load(self.conn)?;
        rows.into_iter().map(SubOrder::try_from).collect()
    }

    fn update_sub_order_status(
        &mut self,
        id: Uuid,
        expected: SubOrderStatus,
        next: SubOrderStatus,
        at: DateTime<Utc>,
    ) -> Result<usize, OrderError> {
        Ok(diesel::update(
            sub_orders::table
                .filter(sub_orders::id.eq(id))
                .filter(sub_orders::status.eq(expected.as_str())),
        )
        .set((
            sub_orders::status.eq(next.as_str()),
            sub_orders::updated_at.eq(at),
        ))
        .execute(self.conn)?)
    }

    fn set_all_sub_order_status(
        &mut self,
        order_id: Uuid,
        status: SubOrderStatus,
        at: DateTime<Utc>,
    ) -> Result<usize, OrderError> {
        Ok(
            diesel::update(sub_orders::table.filter(sub_orders::main_order.eq(order_id)))
                .set((
                    sub_orders::status.eq(status.as_str()),
                    sub_orders::updated_at.eq(at),
                ))
                .execute(self.conn)?,
        )
    }

    fn insert_payment(&mut self, payment: &OrderPayment) -> Result<(), OrderError> {
        diesel::insert_into(order_payments::table)
            .values(&OrderPaymentRow::from(payment))
            .execute(self.conn)?;
        Ok(())
    }

    fn find_payment(&mut self, order_id: Uuid) -> Result<Option<OrderPayment>, OrderError> {
        order_payments::table
            .filter(order_payments::main_order.eq(order_id))
            .select(OrderPaymentRow::as_select())
            .first::<OrderPaymentRow>(self.conn)
            .optional()?
            .map(OrderPayment::try_from)
            .transpose()
    }

    fn update_payment_status(
        &mut self,
        id: Uuid,
        status: OrderPaymentStatus,
        message: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<usize, OrderError> {
        Ok(diesel::update(order_payments::table.find(id))
            .set((
                order_payments::status.eq(status.as_str()),
                order_payments::message.eq(message.map(str::to_string)),
                order_payments::updated_at.eq(at),
            ))
            .execute(self.conn)?)
    }

    fn insert_delivery(&mut self, delivery: &OrderDelivery) -> Result<(), OrderError> {
        diesel::insert_into(order_deliveries::table)
            .values(&OrderDeliveryRow::from(delivery))
            .execute(self.conn)?;
        Ok(())
    }

    fn find_delivery(&mut self, order_id: Uuid) -> Result<Option<OrderDelivery>, OrderError> {
        Ok(order_deliveries::table
            .filter(order_deliveries::main_order.eq(order_id))
            .select(OrderDeliveryRow::as_select())
            .first::<OrderDeliveryRow>(self.conn)
            .optional()?
            .map(OrderDelivery::from))
    }

    fn insert_commission_if_absent(
        &mut self,
        commission: &OrderCommission,
    ) -> Result<usize, OrderError> {
        Ok(diesel::insert_into(order_commissions::table)
            .values(&OrderCommissionRow::from(commission))
            .on_conflict((order_commissions::order_sn, order_commissions::recommender))
            .do_nothing()
            .execute(self.conn)?)
    }

    fn find_commissions_by_sn(&mut self, sn: &str) -> Result<Vec<OrderCommission>, OrderError> {
        let rows: Vec<OrderCommissionRow> = order_commissions::table
            .filter(order_commissions::order_sn.eq(sn))
            .select(OrderCommissionRow::as_select())
            .order(order_commissions::created_at.asc())
            .load(self.conn)?;
        Ok(rows.into_iter().map(OrderCommission::from).collect())
    }

    fn list_commissions(
        &mut self,
        filter: &CommissionFilter,
        page: Page,
    ) -> Result<Vec<OrderCommission>, OrderError> {
        let query = filtered_commissions(filter)
            .select(OrderCommissionRow::as_select())
            .limit(page.limit)
            .offset(page.offset);
        let query = match page.sort {
            Sort::NewestFirst => query.order((
                order_commissions::created_at.desc(),
                order_commissions::id.desc(),
            )),
            Sort::OldestFirst => query.order((
                order_commissions::created_at.asc(),
                order_commissions::id.asc(),
            )),
        };
        let rows: Vec<OrderCommissionRow> = query.load(self.conn)?;
        Ok(rows.into_iter().map(OrderCommission::from).collect())
    }

    fn count_commissions(&mut self, filter: &CommissionFilter) -> Result<i64, OrderError> {
        Ok(filtered_commissions(filter).count().get_result::<i64>(self.conn)?)
    }
}
