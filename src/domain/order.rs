use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::OrderError;
use super::ports::ProductSnapshot;
use super::status::{OrderPaymentStatus, OrderStatus, SubOrderStatus};

/// Upper bound on how many upcoming steps [`Order::projected_timeline`] adds.
const MAX_PROJECTED_STEPS: usize = 5;

// ── Status timeline ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTimelineItem {
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub status_desc: String,
}

/// Append-only history of an order's statuses, stored as one JSON column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusTimeline(Vec<StatusTimelineItem>);

impl StatusTimeline {
    pub fn started(status: OrderStatus, at: DateTime<Utc>) -> Self {
        Self::default().with(status, at)
    }

    /// A copy of this timeline extended by one entry. `self` is left intact so
    /// the in-memory order only changes once the guarded write succeeded.
    pub fn with(&self, status: OrderStatus, at: DateTime<Utc>) -> Self {
        let mut items = self.0.clone();
        items.push(StatusTimelineItem {
            created_at: at,
            status,
            status_desc: status.description().to_string(),
        });
        Self(items)
    }

    pub fn items(&self) -> &[StatusTimelineItem] {
        &self.0
    }

    pub fn statuses(&self) -> Vec<OrderStatus> {
        self.0.iter().map(|item| item.status).collect()
    }
}

/// One step of a display timeline; `created_at` is `None` for steps that
/// have not happened yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineStep {
    pub created_at: Option<DateTime<Utc>>,
    pub status: OrderStatus,
    pub status_desc: &'static str,
}

// ── Entities ─────────────────────────────────────────────────────────────────

/// Receiver details copied onto the order when it is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receiver {
    pub name: String,
    pub mobile: String,
    /// Region code.
    pub base_address: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub sn: String,
    pub user_id: i64,
    pub recommender: Option<i64>,
    pub courier: Option<i64>,
    pub amount: BigDecimal,
    pub pay_amount: BigDecimal,
    pub status: OrderStatus,
    pub status_timeline: StatusTimeline,
    pub receiver: Receiver,
    pub pay_source: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivery_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn validate_owner(&self, user_id: i64) -> Result<(), OrderError> {
        if self.user_id != user_id {
            return Err(OrderError::OwnerMismatch);
        }
        Ok(())
    }

    pub fn validate_courier(&self, courier: i64) -> Result<(), OrderError> {
        if self.courier != Some(courier) {
            return Err(OrderError::CourierMismatch);
        }
        Ok(())
    }

    /// The recorded timeline followed by up to five upcoming happy-path steps.
    pub fn projected_timeline(&self) -> Vec<TimelineStep> {
        let mut steps: Vec<TimelineStep> = self
            .status_timeline
            .items()
            .iter()
            .map(|item| TimelineStep {
                created_at: Some(item.created_at),
                status: item.status,
                status_desc: item.status.description(),
            })
            .collect();
        let Some(mut last) = steps.last().map(|step| step.status) else {
            return steps;
        };
        for _ in 0..MAX_PROJECTED_STEPS {
            let Some(next) = last.next() else {
                break;
            };
            steps.push(TimelineStep {
                created_at: None,
                status: next,
                status_desc: next.description(),
            });
            last = next;
        }
        steps
    }
}

/// Pending write produced by a validated order status transition.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatusChange {
    pub status: OrderStatus,
    pub status_timeline: StatusTimeline,
    pub pay_source: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivery_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl OrderStatusChange {
    pub fn apply_to(self, order: &mut Order) {
        order.status = self.status;
        order.status_timeline = self.status_timeline;
        order.updated_at = self.updated_at;
        if self.pay_source.is_some() {
            order.pay_source = self.pay_source;
        }
        if self.paid_at.is_some() {
            order.paid_at = self.paid_at;
        }
        if self.delivery_at.is_some() {
            order.delivery_at = self.delivery_at;
        }
        if self.received_at.is_some() {
            order.received_at = self.received_at;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubOrder {
    pub id: Uuid,
    pub main_order: Uuid,
    pub product: i64,
    pub product_name: String,
    pub product_price: BigDecimal,
    /// Specs per unit multiplied by the purchased count.
    pub product_specs_count: i32,
    pub product_unit: String,
    pub product_count: i32,
    pub product_amount: BigDecimal,
    pub product_pay_amount: BigDecimal,
    pub status: SubOrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubOrder {
    /// Freeze the product's current catalog data into a new order line.
    pub fn snapshot(
        main_order: Uuid,
        product: &ProductSnapshot,
        count: i32,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if count < 1 {
            return Err(OrderError::validation("product count must be at least 1"));
        }
        let product_specs_count = product
            .specs
            .checked_mul(count)
            .ok_or_else(|| OrderError::validation("product count too large"))?;
        let product_amount = product.price.clone() * BigDecimal::from(count);
        Ok(Self {
            id: Uuid::new_v4(),
            main_order,
            product: product.id,
            product_name: product.name.clone(),
            product_price: product.price.clone(),
            product_specs_count,
            product_unit: product.unit.clone(),
            product_count: count,
            // no per-line discount yet
            product_pay_amount: product_amount.clone(),
            product_amount,
            status: SubOrderStatus::Inited,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayment {
    pub id: Uuid,
    pub main_order: Uuid,
    pub user_id: i64,
    pub source: String,
    pub pay_amount: BigDecimal,
    pub status: OrderPaymentStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDelivery {
    pub id: Uuid,
    pub main_order: Uuid,
    /// The courier who shipped the order.
    pub user_id: i64,
    /// Carrier tracking number.
    pub sn: String,
    pub company: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCommission {
    pub id: Uuid,
    /// Buyer of the order.
    pub user_id: i64,
    pub order_sn: String,
    /// Beneficiary: the referrer, or the owner of the referrer's group.
    pub recommender: i64,
    pub group_name: String,
    pub pay_amount: BigDecimal,
    pub commission_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
}

// ── Operation inputs ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubOrderParams {
    pub product: i64,
    pub count: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderParams {
    pub sub_orders: Vec<SubOrderParams>,
    /// Total the client expects to pay; must equal the computed pay amount.
    pub amount: BigDecimal,
    #[serde(default)]
    pub recommender: Option<i64>,
    pub receiver_name: String,
    pub receiver_mobile: String,
    pub receiver_base_address: String,
    pub receiver_address: String,
}

impl CreateOrderParams {
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.sub_orders.is_empty() {
            return Err(OrderError::validation("order must contain at least one product"));
        }
        for line in &self.sub_orders {
            if line.product <= 0 {
                return Err(OrderError::ProductInvalid(format!("product id {}", line.product)));
            }
            if line.count < 1 {
                return Err(OrderError::validation("product count must be at least 1"));
            }
        }
        let receiver_fields = [
            ("receiver name", &self.receiver_name),
            ("receiver mobile", &self.receiver_mobile),
            ("receiver base address", &self.receiver_base_address),
            ("receiver address", &self.receiver_address),
        ];
        for (field, value) in receiver_fields {
            if value.trim().is_empty() {
                return Err(OrderError::validation(format!("{field} is required")));
            }
        }
        if let Some(recommender) = self.recommender {
            if recommender <= 0 {
                return Err(OrderError::validation("recommender id must be positive"));
            }
        }
        Ok(())
    }

    /// Distinct product ids in first-seen order.
    pub fn product_ids(&self) -> Vec<i64> {
        let mut ids = Vec::with_capacity(self.sub_orders.len());
        for line in &self.sub_orders {
            if !ids.contains(&line.product) {
                ids.push(line.product);
            }
        }
        ids
    }

    pub fn receiver(&self) -> Receiver {
        Receiver {
            name: self.receiver_name.clone(),
            mobile: self.receiver_mobile.clone(),
            base_address: self.receiver_base_address.clone(),
            address: self.receiver_address.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayParams {
    pub user_id: i64,
    pub sn: String,
    pub pay_amount: BigDecimal,
    pub source: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipParams {
    pub courier: i64,
    pub delivery_sn: String,
    pub company: String,
}

// ── Queries ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub user_id: Option<i64>,
    pub courier: Option<i64>,
    pub status: Option<OrderStatus>,
    /// Only orders that carry a recommender.
    pub with_recommender: bool,
    /// Inclusive lower bound on `created_at`.
    pub created_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub created_before: Option<DateTime<Utc>>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.user_id.map_or(true, |id| order.user_id == id)
            && self.courier.map_or(true, |id| order.courier == Some(id))
            && self.status.map_or(true, |status| order.status == status)
            && (!self.with_recommender || order.recommender.is_some())
            && self.created_from.map_or(true, |from| order.created_at >= from)
            && self.created_before.map_or(true, |before| order.created_at < before)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommissionFilter {
    pub user_id: Option<i64>,
    pub recommender: Option<i64>,
    pub order_sn: Option<String>,
}

impl CommissionFilter {
    pub fn matches(&self, commission: &OrderCommission) -> bool {
        self.user_id.map_or(true, |id| commission.user_id == id)
            && self.recommender.map_or(true, |id| commission.recommender == id)
            && self
                .order_sn
                .as_deref()
                .map_or(true, |sn| commission.order_sn == sn)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Sort {
    #[default]
    NewestFirst,
    OldestFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
    pub sort: Sort,
}

impl Page {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.max(1),
            offset: offset.max(0),
            sort: Sort::NewestFirst,
        }
    }

    pub fn oldest_first(mut self) -> Self {
        self.sort = Sort::OldestFirst;
        self
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(20, 0)
    }
}

// ── Views ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub status_desc: &'static str,
    pub courier_name: Option<String>,
    pub receiver_base_address_desc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubOrderView {
    #[serde(flatten)]
    pub sub_order: SubOrder,
    pub status_desc: &'static str,
}

impl From<SubOrder> for SubOrderView {
    fn from(sub_order: SubOrder) -> Self {
        let status_desc = sub_order.status.description();
        Self {
            sub_order,
            status_desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusSummary {
    pub status: OrderStatus,
    pub status_desc: &'static str,
    pub count: i64,
}
