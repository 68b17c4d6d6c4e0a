use std::sync::Arc;

use bigdecimal::BigDecimal;
use log::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::errors::OrderError;
use crate::domain::order::{
    CreateOrderParams, Order, OrderDelivery, OrderFilter, OrderPayment, OrderStatusChange,
    OrderStatusSummary, OrderView, Page, PayParams, ShipParams, StatusTimeline, SubOrder,
    SubOrderView,
};
use crate::domain::ports::{
    MockPaymentGateway, NameLookup, NoNames, OrderConn, OrderStore, PaymentGateway,
    PaymentOutcome, ProductCatalog,
};
use crate::domain::status::{
    OrderPaymentStatus, OrderStatus, StatusInfo, SubOrderStatus,
};

/// Drives orders through their lifecycle.
///
/// Every status write goes through [`OrderService::update_status`] (or its
/// in-transaction form), which only succeeds when the stored status still
/// equals the status the caller read. A lost race surfaces as
/// [`OrderError::StatusChanged`]; nothing here retries on the caller's behalf.
pub struct OrderService<S> {
    store: S,
    catalog: Arc<dyn ProductCatalog>,
    gateway: Arc<dyn PaymentGateway>,
    names: Arc<dyn NameLookup>,
    clock: Arc<dyn Clock>,
}

impl<S: OrderStore> OrderService<S> {
    pub fn new(store: S, catalog: Arc<dyn ProductCatalog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            catalog,
            gateway: Arc::new(MockPaymentGateway),
            names: Arc::new(NoNames),
            clock,
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn with_names(mut self, names: Arc<dyn NameLookup>) -> Self {
        self.names = names;
        self
    }

    fn gen_sn() -> String {
        Uuid::now_v7().simple().to_string()
    }

    // ── Commands ─────────────────────────────────────────────────────────────

    /// Creates an order and its sub-orders in one transaction.
    ///
    /// Each line freezes the product's current name, price, unit and specs.
    /// The order ends in `PendingPayment`; any failure leaves no rows behind.
    pub fn create_with_sub_orders(
        &self,
        user_id: i64,
        params: CreateOrderParams,
    ) -> Result<Order, OrderError> {
        params.validate()?;

        let ids = params.product_ids();
        let products = self.catalog.find_by_ids(&ids)?;
        let now = self.clock.now();
        for id in &ids {
            let product = products
                .iter()
                .find(|p| p.id == *id)
                .ok_or_else(|| OrderError::ProductInvalid(format!("product {id} does not exist")))?;
            if !product.is_available(now) {
                return Err(OrderError::ProductInvalid(format!(
                    "product {id} is not available"
                )));
            }
        }

        let mut order = Order {
            id: Uuid::new_v4(),
            sn: Self::gen_sn(),
            user_id,
            recommender: params.recommender,
            courier: None,
            amount: BigDecimal::from(0),
            pay_amount: BigDecimal::from(0),
            status: OrderStatus::Inited,
            status_timeline: StatusTimeline::started(OrderStatus::Inited, now),
            receiver: params.receiver(),
            pay_source: None,
            paid_at: None,
            delivery_at: None,
            received_at: None,
            created_at: now,
            updated_at: now,
        };

        self.store.transaction(|conn| {
            conn.insert_order(&order)?;

            let mut amount = BigDecimal::from(0);
            let mut pay_amount = BigDecimal::from(0);
            for line in &params.sub_orders {
                let product = products
                    .iter()
                    .find(|p| p.id == line.product)
                    .ok_or_else(|| {
                        OrderError::ProductInvalid(format!("product {} does not exist", line.product))
                    })?;
                let sub_order = SubOrder::snapshot(order.id, product, line.count, now)?;
                conn.insert_sub_order(&sub_order)?;
                amount += sub_order.product_amount;
                pay_amount += sub_order.product_pay_amount;
            }

            if pay_amount == BigDecimal::from(0) || pay_amount != params.amount {
                return Err(OrderError::AmountInvalid);
            }
            conn.update_order_amounts(order.id, &amount, &pay_amount)?;
            order.amount = amount;
            order.pay_amount = pay_amount;

            self.apply_status(conn, &mut order, OrderStatus::PendingPayment, None)
        })?;

        info!(
            "order {} created for user {} with {} line(s), pay amount {}",
            order.sn,
            user_id,
            params.sub_orders.len(),
            order.pay_amount
        );
        Ok(order)
    }

    /// Pays an order.
    ///
    /// A `PendingPayment` order first gets its payment record and moves to
    /// `Paymenting` in one transaction; an order already in `Paymenting`
    /// reuses its existing record. The charge result then moves the payment
    /// and the order to their terminal states together.
    pub fn pay(&self, params: PayParams) -> Result<Order, OrderError> {
        let mut order = self.find_order(&params.sn)?;
        order.validate_owner(params.user_id)?;
        if params.pay_amount != order.pay_amount {
            return Err(OrderError::PayAmountMismatch {
                expected: order.pay_amount.clone(),
            });
        }

        let payment = if order.status == OrderStatus::PendingPayment {
            let now = self.clock.now();
            let payment = OrderPayment {
                id: Uuid::new_v4(),
                main_order: order.id,
                user_id: order.user_id,
                source: params.source.clone(),
                pay_amount: params.pay_amount.clone(),
                status: OrderPaymentStatus::Inited,
                message: None,
                created_at: now,
                updated_at: now,
            };
            // Status guard before the insert: a concurrent payer gets StatusChanged.
            self.store.transaction(|conn| {
                self.apply_status(
                    conn,
                    &mut order,
                    OrderStatus::Paymenting,
                    Some(params.source.clone()),
                )?;
                conn.insert_payment(&payment)
            })?;
            payment
        } else {
            self.store
                .with_conn(|conn| conn.find_payment(order.id))?
                .ok_or(OrderError::NotFound("payment"))?
        };

        order.status.validate_next(OrderStatus::Paid)?;

        let (payment_status, next, message) = match self.gateway.charge(&payment)? {
            PaymentOutcome::Success => (OrderPaymentStatus::Success, OrderStatus::Paid, None),
            PaymentOutcome::Failure(message) => {
                (OrderPaymentStatus::Failure, OrderStatus::PayFail, Some(message))
            }
        };
        let now = self.clock.now();
        self.store.transaction(|conn| {
            conn.update_payment_status(payment.id, payment_status, message.as_deref(), now)?;
            self.apply_status(conn, &mut order, next, None)
        })?;

        info!("order {} payment finished as {}", order.sn, order.status);
        Ok(order)
    }

    /// Assigns a courier to an order that has none yet.
    pub fn change_courier(&self, sn: &str, courier: i64) -> Result<(), OrderError> {
        if courier <= 0 {
            return Err(OrderError::validation("courier id must be positive"));
        }
        let order = self.find_order(sn)?;
        if order.courier.is_some() {
            return Err(OrderError::CourierExists);
        }
        let affected = self
            .store
            .with_conn(|conn| conn.assign_courier(order.id, courier, self.clock.now()))?;
        // Someone else assigned a courier after our read.
        if affected != 1 {
            return Err(OrderError::CourierExists);
        }
        debug!("order {} assigned to courier {}", order.sn, courier);
        Ok(())
    }

    /// Marks the whole order (`sub_order_id == None`) or a single sub-order
    /// as ready to ship.
    ///
    /// The whole-order path requires every sub-order to be either to be
    /// shipped or canceled already. The single sub-order path leaves the
    /// parent order untouched.
    pub fn to_be_shipped(
        &self,
        sn: &str,
        courier: i64,
        sub_order_id: Option<Uuid>,
    ) -> Result<(), OrderError> {
        let mut order = self.find_order(sn)?;
        order.validate_courier(courier)?;
        order.status.validate_next(OrderStatus::ToBeShipped)?;

        match sub_order_id {
            None => self.store.with_conn(|conn| {
                let sub_orders = conn.list_sub_orders(&[order.id])?;
                if sub_orders
                    .iter()
                    .any(|sub_order| !sub_order.status.is_ready_for_shipping())
                {
                    return Err(OrderError::CannotAdvanceToBeShipped);
                }
                self.apply_status(conn, &mut order, OrderStatus::ToBeShipped, None)
            }),
            Some(id) => self.store.with_conn(|conn| {
                let mut sub_order = conn
                    .find_sub_order(id)?
                    .ok_or(OrderError::NotFound("sub-order"))?;
                if sub_order.main_order != order.id {
                    return Err(OrderError::SubOrderMismatch);
                }
                self.apply_sub_order_status(conn, &mut sub_order, SubOrderStatus::ToBeShipped)
            }),
        }
    }

    /// Records the shipment: delivery row, every sub-order shipped and the
    /// order shipped, all in one transaction.
    pub fn shipped(&self, sn: &str, params: ShipParams) -> Result<OrderDelivery, OrderError> {
        if params.delivery_sn.trim().is_empty() || params.company.trim().is_empty() {
            return Err(OrderError::validation(
                "delivery sn and company are required",
            ));
        }
        let mut order = self.find_order(sn)?;
        order.validate_courier(params.courier)?;
        order.status.validate_next(OrderStatus::Shipped)?;

        let now = self.clock.now();
        let delivery = OrderDelivery {
            id: Uuid::new_v4(),
            main_order: order.id,
            user_id: params.courier,
            sn: params.delivery_sn,
            company: params.company,
            created_at: now,
        };
        self.store.transaction(|conn| {
            self.apply_status(conn, &mut order, OrderStatus::Shipped, None)?;
            conn.insert_delivery(&delivery)?;
            conn.set_all_sub_order_status(order.id, SubOrderStatus::Shipped, now)?;
            Ok(())
        })?;

        info!("order {} shipped via {} ({})", order.sn, delivery.company, delivery.sn);
        Ok(delivery)
    }

    pub fn close(&self, sn: &str, user_id: i64) -> Result<Order, OrderError> {
        self.change_status(sn, user_id, OrderStatus::Closed)
    }

    pub fn finish(&self, sn: &str, user_id: i64) -> Result<Order, OrderError> {
        self.change_status(sn, user_id, OrderStatus::Done)
    }

    fn change_status(&self, sn: &str, user_id: i64, next: OrderStatus) -> Result<Order, OrderError> {
        let mut order = self.find_order(sn)?;
        order.validate_owner(user_id)?;
        self.update_status(&mut order, next)?;
        Ok(order)
    }

    /// Moves `order` to `next` if the stored row still carries `order.status`.
    ///
    /// On success the in-memory order reflects the write. On
    /// [`OrderError::StatusChanged`] the caller must re-read the order.
    pub fn update_status(&self, order: &mut Order, next: OrderStatus) -> Result<(), OrderError> {
        self.store
            .with_conn(|conn| self.apply_status(conn, order, next, None))
    }

    pub fn update_sub_order_status(
        &self,
        sub_order: &mut SubOrder,
        next: SubOrderStatus,
    ) -> Result<(), OrderError> {
        self.store
            .with_conn(|conn| self.apply_sub_order_status(conn, sub_order, next))
    }

    fn apply_status(
        &self,
        conn: &mut dyn OrderConn,
        order: &mut Order,
        next: OrderStatus,
        pay_source: Option<String>,
    ) -> Result<(), OrderError> {
        order.status.validate_next(next)?;

        let now = self.clock.now();
        let change = OrderStatusChange {
            status: next,
            status_timeline: order.status_timeline.with(next, now),
            pay_source,
            paid_at: (next == OrderStatus::Paid).then_some(now),
            delivery_at: (next == OrderStatus::Shipped).then_some(now),
            received_at: (next == OrderStatus::Done).then_some(now),
            updated_at: now,
        };
        let affected = conn.update_order_status(order.id, order.status, &change)?;
        if affected != 1 {
            return Err(OrderError::StatusChanged { entity: "order" });
        }

        debug!("order {} moved from {} to {}", order.sn, order.status, next);
        change.apply_to(order);
        Ok(())
    }

    fn apply_sub_order_status(
        &self,
        conn: &mut dyn OrderConn,
        sub_order: &mut SubOrder,
        next: SubOrderStatus,
    ) -> Result<(), OrderError> {
        sub_order.status.validate_next(next)?;

        let now = self.clock.now();
        let affected = conn.update_sub_order_status(sub_order.id, sub_order.status, next, now)?;
        if affected != 1 {
            return Err(OrderError::StatusChanged {
                entity: "sub-order",
            });
        }

        debug!(
            "sub-order {} moved from {} to {}",
            sub_order.id, sub_order.status, next
        );
        sub_order.status = next;
        sub_order.updated_at = now;
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn find_order(&self, sn: &str) -> Result<Order, OrderError> {
        self.store
            .with_conn(|conn| conn.find_order_by_sn(sn))?
            .ok_or(OrderError::NotFound("order"))
    }

    pub fn find_by_sn(&self, sn: &str) -> Result<OrderView, OrderError> {
        self.find_order(sn).map(|order| self.view(order))
    }

    pub fn list(&self, filter: &OrderFilter, page: Page) -> Result<Vec<OrderView>, OrderError> {
        let orders = self.store.with_conn(|conn| conn.list_orders(filter, page))?;
        Ok(orders.into_iter().map(|order| self.view(order)).collect())
    }

    pub fn count(&self, filter: &OrderFilter) -> Result<i64, OrderError> {
        self.store.with_conn(|conn| conn.count_orders(filter))
    }

    pub fn list_sub_orders(&self, order_id: Uuid) -> Result<Vec<SubOrderView>, OrderError> {
        self.list_sub_orders_by_order_ids(&[order_id])
    }

    pub fn list_sub_orders_by_order_ids(
        &self,
        order_ids: &[Uuid],
    ) -> Result<Vec<SubOrderView>, OrderError> {
        let sub_orders = self.store.with_conn(|conn| conn.list_sub_orders(order_ids))?;
        Ok(sub_orders.into_iter().map(SubOrderView::from).collect())
    }

    pub fn find_payment(&self, order_id: Uuid) -> Result<Option<OrderPayment>, OrderError> {
        self.store.with_conn(|conn| conn.find_payment(order_id))
    }

    pub fn find_delivery(&self, order_id: Uuid) -> Result<Option<OrderDelivery>, OrderError> {
        self.store.with_conn(|conn| conn.find_delivery(order_id))
    }

    /// Number of matching orders per status, in lifecycle order. Statuses
    /// without orders are omitted.
    pub fn status_summary(&self, filter: &OrderFilter) -> Result<Vec<OrderStatusSummary>, OrderError> {
        let statuses = self.store.with_conn(|conn| conn.order_statuses(filter))?;
        Ok(OrderStatus::ALL
            .into_iter()
            .filter_map(|status| {
                let count = statuses.iter().filter(|s| **s == status).count() as i64;
                (count > 0).then(|| OrderStatusSummary {
                    status,
                    status_desc: status.description(),
                    count,
                })
            })
            .collect())
    }

    pub fn list_order_statuses(&self) -> Vec<StatusInfo<OrderStatus>> {
        OrderStatus::list()
    }

    pub fn list_sub_order_statuses(&self) -> Vec<StatusInfo<SubOrderStatus>> {
        SubOrderStatus::list()
    }

    fn view(&self, order: Order) -> OrderView {
        OrderView {
            status_desc: order.status.description(),
            courier_name: order.courier.and_then(|id| self.names.user_name(id)),
            receiver_base_address_desc: self.names.region_name(&order.receiver.base_address),
            order,
        }
    }
}
