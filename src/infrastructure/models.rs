use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::errors::OrderError;
use crate::domain::order::{
    Order, OrderCommission, OrderDelivery, OrderPayment, OrderStatusChange, Receiver,
    StatusTimeline, SubOrder,
};
use crate::schema::{order_commissions, order_deliveries, order_payments, orders, sub_orders};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderRow {
    pub id: Uuid,
    pub sn: String,
    pub user_id: i64,
    pub recommender: Option<i64>,
    pub courier: Option<i64>,
    pub amount: BigDecimal,
    pub pay_amount: BigDecimal,
    pub status: String,
    pub status_timeline: Value,
    pub receiver_name: String,
    pub receiver_mobile: String,
    pub receiver_base_address: String,
    pub receiver_address: String,
    pub pay_source: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivery_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `None` fields are left untouched by the update.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = orders)]
pub struct OrderStatusChangeset {
    pub status: String,
    pub status_timeline: Value,
    pub pay_source: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivery_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = sub_orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SubOrderRow {
    pub id: Uuid,
    pub main_order: Uuid,
    pub product: i64,
    pub product_name: String,
    pub product_price: BigDecimal,
    pub product_specs_count: i32,
    pub product_unit: String,
    pub product_count: i32,
    pub product_amount: BigDecimal,
    pub product_pay_amount: BigDecimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = order_payments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderPaymentRow {
    pub id: Uuid,
    pub main_order: Uuid,
    pub user_id: i64,
    pub source: String,
    pub pay_amount: BigDecimal,
    pub status: String,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = order_deliveries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderDeliveryRow {
    pub id: Uuid,
    pub main_order: Uuid,
    pub user_id: i64,
    pub sn: String,
    pub company: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = order_commissions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderCommissionRow {
    pub id: Uuid,
    pub user_id: i64,
    pub order_sn: String,
    pub recommender: i64,
    pub group_name: String,
    pub pay_amount: BigDecimal,
    pub commission_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
}

// ── Row <-> domain conversions ───────────────────────────────────────────────

fn corrupt(table: &str, id: Uuid, e: impl std::fmt::Display) -> OrderError {
    OrderError::store(format!("corrupt {table} row {id}: {e}"))
}

fn timeline_to_json(timeline: &StatusTimeline) -> Result<Value, OrderError> {
    serde_json::to_value(timeline)
        .map_err(|e| OrderError::store(format!("cannot encode status timeline: {e}")))
}

impl TryFrom<&Order> for OrderRow {
    type Error = OrderError;

    fn try_from(order: &Order) -> Result<Self, Self::Error> {
        Ok(Self {
            id: order.id,
            sn: order.sn.clone(),
            user_id: order.user_id,
            recommender: order.recommender,
            courier: order.courier,
            amount: order.amount.clone(),
            pay_amount: order.pay_amount.clone(),
            status: order.status.as_str().to_string(),
            status_timeline: timeline_to_json(&order.status_timeline)?,
            receiver_name: order.receiver.name.clone(),
            receiver_mobile: order.receiver.mobile.clone(),
            receiver_base_address: order.receiver.base_address.clone(),
            receiver_address: order.receiver.address.clone(),
            pay_source: order.pay_source.clone(),
            paid_at: order.paid_at,
            delivery_at: order.delivery_at,
            received_at: order.received_at,
            created_at: order.created_at,
            updated_at: order.updated_at,
        })
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = OrderError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|e| corrupt("orders", row.id, e))?;
        let status_timeline =
            serde_json::from_value(row.status_timeline).map_err(|e| corrupt("orders", row.id, e))?;
        Ok(Self {
            id: row.id,
            sn: row.sn,
            user_id: row.user_id,
            recommender: row.recommender,
            courier: row.courier,
            amount: row.amount,
            pay_amount: row.pay_amount,
            status,
            status_timeline,
            receiver: Receiver {
                name: row.receiver_name,
                mobile: row.receiver_mobile,
                base_address: row.receiver_base_address,
                address: row.receiver_address,
            },
            pay_source: row.pay_source,
            paid_at: row.paid_at,
            delivery_at: row.delivery_at,
            received_at: row.received_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<&OrderStatusChange> for OrderStatusChangeset {
    type Error = OrderError;

    fn try_from(change: &OrderStatusChange) -> Result<Self, Self::Error> {
        Ok(Self {
            status: change.status.as_str().to_string(),
            status_timeline: timeline_to_json(&change.status_timeline)?,
            pay_source: change.pay_source.clone(),
            paid_at: change.paid_at,
            delivery_at: change.delivery_at,
            received_at: change.received_at,
            updated_at: change.updated_at,
        })
    }
}

impl From<&SubOrder> for SubOrderRow {
    fn from(sub_order: &SubOrder) -> Self {
        Self {
            id: sub_order.id,
            main_order: sub_order.main_order,
            product: sub_order.product,
            product_name: sub_order.product_name.clone(),
            product_price: sub_order.product_price.clone(),
            product_specs_count: sub_order.product_specs_count,
            product_unit: sub_order.product_unit.clone(),
            product_count: sub_order.product_count,
            product_amount: sub_order.product_amount.clone(),
            product_pay_amount: sub_order.product_pay_amount.clone(),
            status: sub_order.status.as_str().to_string(),
            created_at: sub_order.created_at,
            updated_at: sub_order.updated_at,
        }
    }
}

impl TryFrom<SubOrderRow> for SubOrder {
    type Error = OrderError;

    fn try_from(row: SubOrderRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|e| corrupt("sub_orders", row.id, e))?;
        Ok(Self {
            id: row.id,
            main_order: row.main_order,
            product: row.product,
            product_name: row.product_name,
            product_price: row.product_price,
            product_specs_count: row.product_specs_count,
            product_unit: row.product_unit,
            product_count: row.product_count,
            product_amount: row.product_amount,
            product_pay_amount: row.product_pay_amount,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<&OrderPayment> for OrderPaymentRow {
    fn from(payment: &OrderPayment) -> Self {
        Self {
            id: payment.id,
            main_order: payment.main_order,
            user_id: payment.user_id,
            source: payment.source.clone(),
            pay_amount: payment.pay_amount.clone(),
            status: payment.status.as_str().to_string(),
            message: payment.message.clone(),
            created_at: payment.created_at,
            updated_at: payment.updated_at,
        }
    }
}

impl TryFrom<OrderPaymentRow> for OrderPayment {
    type Error = OrderError;

    fn try_from(row: OrderPaymentRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|e| corrupt("order_payments", row.id, e))?;
        Ok(Self {
            id: row.id,
            main_order: row.main_order,
            user_id: row.user_id,
            source: row.source,
            pay_amount: row.pay_amount,
            status,
            message: row.message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<&OrderDelivery> for OrderDeliveryRow {
    fn from(delivery: &OrderDelivery) -> Self {
        Self {
            id: delivery.id,
            main_order: delivery.main_order,
            user_id: delivery.user_id,
            sn: delivery.sn.clone(),
            company: delivery.company.clone(),
            created_at: delivery.created_at,
        }
    }
}

impl From<OrderDeliveryRow> for OrderDelivery {
    fn from(row: OrderDeliveryRow) -> Self {
        Self {
            id: row.id,
            main_order: row.main_order,
            user_id: row.user_id,
            sn: row.sn,
            company: row.company,
            created_at: row.created_at,
        }
    }
}

impl From<&OrderCommission> for OrderCommissionRow {
    fn from(commission: &OrderCommission) -> Self {
        Self {
            id: commission.id,
            user_id: commission.user_id,
            order_sn: commission.order_sn.clone(),
            recommender: commission.recommender,
            group_name: commission.group_name.clone(),
            pay_amount: commission.pay_amount.clone(),
            commission_amount: commission.commission_amount.clone(),
            created_at: commission.created_at,
        }
    }
}

impl From<OrderCommissionRow> for OrderCommission {
    fn from(row: OrderCommissionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            order_sn: row.order_sn,
            recommender: row.recommender,
            group_name: row.group_name,
            pay_amount: row.pay_amount,
            commission_amount: row.commission_amount,
            created_at: row.created_at,
        }
    }
}
