use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::application::settings::ALL_GROUPS;
use crate::clock::Clock;
use crate::domain::errors::OrderError;
use crate::domain::order::{CommissionFilter, Order, OrderCommission, OrderFilter, Page};
use crate::domain::ports::{CommissionConfig, MarketingGroupDirectory, OrderStore};
use crate::domain::status::OrderStatus;

/// Half-open `[start, end)` range of order creation times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CommissionWindow {
    /// From the start of yesterday to the start of today, with days measured
    /// in `offset`.
    pub fn previous_day(now: DateTime<Utc>, offset: FixedOffset) -> Result<Self, OrderError> {
        let today_start = now
            .with_timezone(&offset)
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .and_then(|midnight| midnight.and_local_timezone(offset).single())
            .ok_or_else(|| OrderError::store("cannot compute start of day"))?;
        let end = today_start.with_timezone(&Utc);
        Ok(Self {
            start: end - Duration::days(1),
            end,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LedgerOptions {
    pub page_size: i64,
    /// Hard stop for a single run.
    pub max_pages: usize,
    pub utc_offset: FixedOffset,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: 1000,
            utc_offset: FixedOffset::east_opt(8 * 3600).unwrap_or_else(|| Utc.fix()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommissionRunReport {
    pub pages: usize,
    pub orders_scanned: usize,
    pub rows_created: usize,
    /// The page bound was hit before the window was exhausted.
    pub truncated: bool,
}

/// Derives commission rows from closed orders.
///
/// Derivation is create-if-absent keyed on `(order_sn, beneficiary)`, so a
/// run can be repeated over the same window without duplicating or altering
/// rows.
pub struct CommissionLedger<S> {
    store: S,
    config: Arc<dyn CommissionConfig>,
    groups: Arc<dyn MarketingGroupDirectory>,
    clock: Arc<dyn Clock>,
    options: LedgerOptions,
}

impl<S: OrderStore> CommissionLedger<S> {
    pub fn new(
        store: S,
        config: Arc<dyn CommissionConfig>,
        groups: Arc<dyn MarketingGroupDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            groups,
            clock,
            options: LedgerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LedgerOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs over the previous day.
    pub fn run(&self) -> Result<CommissionRunReport, OrderError> {
        let window = CommissionWindow::previous_day(self.clock.now(), self.options.utc_offset)?;
        self.run_window(window)
    }

    pub fn run_window(&self, window: CommissionWindow) -> Result<CommissionRunReport, OrderError> {
        let filter = OrderFilter {
            status: Some(OrderStatus::Closed),
            with_recommender: true,
            created_from: Some(window.start),
            created_before: Some(window.end),
            ..OrderFilter::default()
        };
        let limit = self.options.page_size.max(1);
        let mut report = CommissionRunReport::default();

        for page_no in 0..self.options.max_pages {
            let page = Page::new(limit, page_no as i64 * limit).oldest_first();
            let orders = self.store.with_conn(|conn| conn.list_orders(&filter, page))?;
            report.pages += 1;
            report.orders_scanned += orders.len();
            for order in &orders {
                report.rows_created += self.derive(order)?;
            }
            if (orders.len() as i64) < limit {
                info!(
                    "commission run [{}, {}) done: {} order(s), {} new row(s)",
                    window.start, window.end, report.orders_scanned, report.rows_created
                );
                return Ok(report);
            }
        }

        report.truncated = true;
        warn!(
            "commission run [{}, {}) stopped after {} page(s), remaining orders wait for the next run",
            window.start, window.end, report.pages
        );
        Ok(report)
    }

    /// Rows created for one order.
    fn derive(&self, order: &Order) -> Result<usize, OrderError> {
        let Some(recommender) = order.recommender.filter(|id| *id > 0) else {
            return Ok(0);
        };
        let ratio = self.config.commission_ratio(ALL_GROUPS);
        let Some(amount) = commission_amount(&order.pay_amount, ratio) else {
            return Ok(0);
        };
        let mut created = self.record(order, recommender, ALL_GROUPS, amount)?;

        let group = match self.groups.marketing_group(recommender) {
            Ok(Some(group)) => group,
            Ok(None) => return Ok(created),
            Err(e) => {
                warn!(
                    "marketing group lookup for recommender {} of order {} failed: {}",
                    recommender, order.sn, e
                );
                return Ok(created);
            }
        };
        let Some(owner) = self.config.marketing_group_owner(&group) else {
            return Ok(created);
        };
        if let Some(amount) = commission_amount(&order.pay_amount, self.config.commission_ratio(&group)) {
            created += self.record(order, owner, &group, amount)?;
        }
        Ok(created)
    }

    fn record(
        &self,
        order: &Order,
        beneficiary: i64,
        group: &str,
        commission_amount: BigDecimal,
    ) -> Result<usize, OrderError> {
        let commission = OrderCommission {
            id: Uuid::new_v4(),
            user_id: order.user_id,
            order_sn: order.sn.clone(),
            recommender: beneficiary,
            group_name: group.to_string(),
            pay_amount: order.pay_amount.clone(),
            commission_amount,
            created_at: self.clock.now(),
        };
        let inserted = self
            .store
            .with_conn(|conn| conn.insert_commission_if_absent(&commission))?;
        if inserted > 0 {
            debug!(
                "commission {} credited to {} for order {}",
                commission.commission_amount, beneficiary, order.sn
            );
        }
        Ok(inserted)
    }

    pub fn find_by_sn(&self, sn: &str) -> Result<Vec<OrderCommission>, OrderError> {
        self.store.with_conn(|conn| conn.find_commissions_by_sn(sn))
    }

    pub fn list(
        &self,
        filter: &CommissionFilter,
        page: Page,
    ) -> Result<Vec<OrderCommission>, OrderError> {
        self.store.with_conn(|conn| conn.list_commissions(filter, page))
    }

    pub fn count(&self, filter: &CommissionFilter) -> Result<i64, OrderError> {
        self.store.with_conn(|conn| conn.count_commissions(filter))
    }
}

/// `pay_amount × ratio` rounded to cents, or `None` when the ratio yields no
/// commission.
pub fn commission_amount(pay_amount: &BigDecimal, ratio: f64) -> Option<BigDecimal> {
    if !ratio.is_finite() || ratio <= 0.0 {
        return None;
    }
    // Display gives the shortest decimal form, so 0.05 stays exactly 0.05.
    let ratio = BigDecimal::from_str(&ratio.to_string()).ok()?;
    Some((pay_amount * ratio).round(2))
}
