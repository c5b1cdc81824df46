//! Order record and its transitions.

use chrono::{DateTime, Duration, Utc};
use common::{OrderId, ProductId, StockItemId, UserId, VariantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;
use crate::stock::StockKey;

use super::{FulfillmentPolicy, OrderError, OrderStatus, PaymentStatus};

/// One purchased product (or variant) with its quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    /// Stock items already delivered for this line.
    #[serde(default)]
    pub delivered: Vec<StockItemId>,
}

impl OrderLine {
    pub fn new(
        product_id: ProductId,
        variant_id: Option<VariantId>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id,
            variant_id,
            product_name: product_name.into(),
            quantity,
            unit_price,
            delivered: Vec::new(),
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey {
            product_id: self.product_id,
            variant_id: self.variant_id,
        }
    }

    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered.len() as u64 >= u64::from(self.quantity)
    }

    /// Number of units still to deliver.
    pub fn outstanding(&self) -> u32 {
        self.quantity
            .saturating_sub(self.delivered.len().try_into().unwrap_or(u32::MAX))
    }
}

/// Payment method chosen at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Pix,
    Card,
}

/// Provider-side payment attached to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub payment_id: String,
    pub method: PaymentMethod,
    /// Last status string reported by the provider.
    pub provider_status: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub qr_code: Option<String>,
    pub qr_code_base64: Option<String>,
    pub ticket_url: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Exclusive right to run fulfillment for an order until `expires_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentLease {
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Result of asking for the fulfillment lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseOutcome {
    /// The caller now holds the lease.
    Acquired,
    /// Stock was already assigned; nothing to do.
    AlreadyAssigned,
    /// Another caller holds a live lease.
    Held,
}

/// An entry in the order's append-only history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: OrderHistoryEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderHistoryEvent {
    Created,
    PaymentAttached { payment_id: String },
    PaymentConfirmed { payment_id: String },
    FulfillmentStarted,
    LineDelivered { line: usize, items: usize },
    Completed { undelivered_lines: Vec<usize> },
    FulfillmentIncomplete { undelivered_lines: Vec<usize> },
    ReviewRetried { undelivered_lines: Vec<usize> },
    Expired,
    Canceled { reason: String },
}

/// An order from checkout to delivery.
///
/// Every mutation goes through a transition method that checks the current
/// state first, so the storage layer can apply it atomically against the
/// latest persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    lines: Vec<OrderLine>,
    total: Money,
    payment_status: PaymentStatus,
    order_status: OrderStatus,
    payment: Option<PaymentInfo>,
    product_assigned: bool,
    needs_review: bool,
    lease: Option<FulfillmentLease>,
    history: Vec<HistoryEntry>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn order_status(&self) -> OrderStatus {
        self.order_status
    }

    pub fn payment(&self) -> Option<&PaymentInfo> {
        self.payment.as_ref()
    }

    pub fn payment_id(&self) -> Option<&str> {
        self.payment.as_ref().map(|p| p.payment_id.as_str())
    }

    /// When the pending payment stops being accepted.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.payment.as_ref().and_then(|p| p.expires_at)
    }

    /// True once stock has been assigned and the order completed.
    pub fn product_assigned(&self) -> bool {
        self.product_assigned
    }

    /// True when the order completed with undelivered lines.
    pub fn needs_review(&self) -> bool {
        self.needs_review
    }

    pub fn lease(&self) -> Option<&FulfillmentLease> {
        self.lease.as_ref()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Indices of lines that are not fully delivered.
    pub fn undelivered_lines(&self) -> Vec<usize> {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, line)| !line.is_delivered())
            .map(|(index, _)| index)
            .collect()
    }

    /// All stock items delivered for this order, in line order.
    pub fn delivered_items(&self) -> impl Iterator<Item = &StockItemId> {
        self.lines.iter().flat_map(|line| line.delivered.iter())
    }
}

// Transition methods
impl Order {
    /// Creates a pending order.
    pub fn new(
        user_id: UserId,
        lines: Vec<OrderLine>,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if lines.is_empty() {
            return Err(OrderError::NoItems);
        }
        if let Some(line) = lines.iter().find(|line| line.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                quantity: line.quantity,
            });
        }

        let total = lines.iter().map(OrderLine::total_price).sum();
        Ok(Self {
            id: OrderId::new(),
            user_id,
            lines,
            total,
            payment_status: PaymentStatus::Pending,
            order_status: OrderStatus::Pending,
            payment: None,
            product_assigned: false,
            needs_review: false,
            lease: None,
            history: vec![HistoryEntry {
                at: now,
                event: OrderHistoryEvent::Created,
            }],
            created_at: now,
            updated_at: now,
        })
    }

    /// Attaches the provider payment created at checkout.
    pub fn attach_payment(
        &mut self,
        payment: PaymentInfo,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if !self.payment_status.can_confirm() {
            return Err(self.invalid_transition("attach payment"));
        }
        let payment_id = payment.payment_id.clone();
        self.payment = Some(payment);
        self.record(now, OrderHistoryEvent::PaymentAttached { payment_id });
        Ok(())
    }

    /// Moves a pending order to paid/processing.
    ///
    /// Returns `Ok(false)` without touching the order when it is already paid,
    /// which makes repeated confirmations no-ops.
    pub fn confirm_payment(
        &mut self,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, OrderError> {
        if let Some(existing) = self.payment_id()
            && existing != payment_id
        {
            return Err(OrderError::PaymentMismatch {
                expected: existing.to_string(),
                actual: payment_id.to_string(),
            });
        }

        match self.payment_status {
            PaymentStatus::Paid => Ok(false),
            PaymentStatus::Pending => {
                self.payment_status = PaymentStatus::Paid;
                self.order_status = OrderStatus::Processing;
                match self.payment.as_mut() {
                    Some(payment) => {
                        payment.paid_at = Some(now);
                        payment.provider_status = "approved".to_string();
                    }
                    None => {
                        self.payment = Some(PaymentInfo {
                            payment_id: payment_id.to_string(),
                            method: PaymentMethod::Card,
                            provider_status: "approved".to_string(),
                            expires_at: None,
                            qr_code: None,
                            qr_code_base64: None,
                            ticket_url: None,
                            paid_at: Some(now),
                        });
                    }
                }
                self.record(
                    now,
                    OrderHistoryEvent::PaymentConfirmed {
                        payment_id: payment_id.to_string(),
                    },
                );
                Ok(true)
            }
            PaymentStatus::Expired | PaymentStatus::Canceled => {
                Err(self.invalid_transition("confirm payment"))
            }
        }
    }

    /// Takes the fulfillment lease if the order is paid, still has work to do
    /// and nobody else holds a live lease.
    ///
    /// An order completed with undelivered lines (`needs_review`) can be
    /// taken again so those lines get another attempt.
    pub fn begin_fulfillment(
        &mut self,
        token: Uuid,
        now: DateTime<Utc>,
        lease_ttl: Duration,
    ) -> Result<LeaseOutcome, OrderError> {
        let review_pending = self.needs_review && !self.undelivered_lines().is_empty();
        if self.product_assigned && !review_pending {
            return Ok(LeaseOutcome::AlreadyAssigned);
        }
        if self.payment_status != PaymentStatus::Paid {
            return Err(OrderError::NotPaid {
                payment_status: self.payment_status,
            });
        }
        if let Some(lease) = self.lease
            && lease.expires_at > now
        {
            return Ok(LeaseOutcome::Held);
        }

        self.lease = Some(FulfillmentLease {
            token,
            expires_at: now + lease_ttl,
        });
        self.record(now, OrderHistoryEvent::FulfillmentStarted);
        Ok(LeaseOutcome::Acquired)
    }

    /// Records stock items delivered for a line. Requires the lease.
    pub fn record_delivery(
        &mut self,
        token: Uuid,
        line_index: usize,
        items: &[StockItemId],
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        self.check_lease(token)?;
        let line = self
            .lines
            .get_mut(line_index)
            .ok_or(OrderError::LineNotFound { index: line_index })?;

        let mut added = 0;
        for item in items {
            if !line.delivered.contains(item) {
                line.delivered.push(*item);
                added += 1;
            }
        }
        if added > 0 {
            self.record(
                now,
                OrderHistoryEvent::LineDelivered {
                    line: line_index,
                    items: added,
                },
            );
        } else {
            self.updated_at = now;
        }
        Ok(())
    }

    /// Settles a fulfillment run and releases the lease.
    ///
    /// The order completes when `policy` is satisfied; otherwise it stays
    /// `Processing` so a later delivery or manual retry can pick it up. A
    /// retry on an order already completed only updates `needs_review`.
    pub fn finish_fulfillment(
        &mut self,
        token: Uuid,
        policy: FulfillmentPolicy,
        now: DateTime<Utc>,
    ) -> Result<OrderStatus, OrderError> {
        self.check_lease(token)?;
        self.lease = None;

        let undelivered_lines = self.undelivered_lines();
        if self.product_assigned {
            self.needs_review = !undelivered_lines.is_empty();
            self.record(now, OrderHistoryEvent::ReviewRetried { undelivered_lines });
            return Ok(self.order_status);
        }
        let delivered_count = self.lines.len() - undelivered_lines.len();
        let complete = match policy {
            FulfillmentPolicy::AllOrNothing => undelivered_lines.is_empty(),
            FulfillmentPolicy::BestEffort => delivered_count > 0,
        };

        if complete {
            self.order_status = OrderStatus::Completed;
            self.product_assigned = true;
            self.needs_review = !undelivered_lines.is_empty();
            self.record(now, OrderHistoryEvent::Completed { undelivered_lines });
        } else {
            self.record(
                now,
                OrderHistoryEvent::FulfillmentIncomplete { undelivered_lines },
            );
        }
        Ok(self.order_status)
    }

    /// Drops the lease without settling (used when a run aborts on an error).
    pub fn release_fulfillment(&mut self, token: Uuid, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.check_lease(token)?;
        self.lease = None;
        self.updated_at = now;
        Ok(())
    }

    /// Expires a pending order whose payment window has elapsed.
    ///
    /// Returns false if the order is not pending or not yet due.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<bool, OrderError> {
        if self.payment_status != PaymentStatus::Pending {
            return Ok(false);
        }
        match self.expires_at() {
            Some(expires_at) if expires_at <= now => {
                self.payment_status = PaymentStatus::Expired;
                self.order_status = OrderStatus::Expired;
                if let Some(payment) = self.payment.as_mut() {
                    payment.provider_status = "expired".to_string();
                }
                self.record(now, OrderHistoryEvent::Expired);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Cancels an order that has not been paid.
    pub fn cancel(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), OrderError> {
        if self.payment_status != PaymentStatus::Pending {
            return Err(self.invalid_transition("cancel"));
        }
        self.payment_status = PaymentStatus::Canceled;
        self.order_status = OrderStatus::Canceled;
        self.record(
            now,
            OrderHistoryEvent::Canceled {
                reason: reason.into(),
            },
        );
        Ok(())
    }

    fn check_lease(&self, token: Uuid) -> Result<(), OrderError> {
        match self.lease {
            Some(lease) if lease.token == token => Ok(()),
            _ => Err(OrderError::LeaseNotHeld),
        }
    }

    fn invalid_transition(&self, action: &'static str) -> OrderError {
        OrderError::InvalidStateTransition {
            current_state: self.order_status,
            action,
        }
    }

    fn record(&mut self, at: DateTime<Utc>, event: OrderHistoryEvent) {
        self.history.push(HistoryEntry { at, event });
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(quantity: u32) -> OrderLine {
        OrderLine::new(
            ProductId::new(),
            None,
            "Gift Card",
            quantity,
            Money::from_cents(1000),
        )
    }

    fn pix(payment_id: &str, expires_at: DateTime<Utc>) -> PaymentInfo {
        PaymentInfo {
            payment_id: payment_id.to_string(),
            method: PaymentMethod::Pix,
            provider_status: "pending".to_string(),
            expires_at: Some(expires_at),
            qr_code: Some("000201".to_string()),
            qr_code_base64: None,
            ticket_url: None,
            paid_at: None,
        }
    }

    fn paid_order(lines: Vec<OrderLine>) -> Order {
        let now = Utc::now();
        let mut order = Order::new(UserId::new(), lines, now).unwrap();
        order.attach_payment(pix("PAY-1", now + Duration::minutes(30)), now).unwrap();
        assert!(order.confirm_payment("PAY-1", now).unwrap());
        order
    }

    #[test]
    fn test_new_order_is_pending_with_total() {
        let order = Order::new(UserId::new(), vec![line(2), line(1)], Utc::now()).unwrap();
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert_eq!(order.order_status(), OrderStatus::Pending);
        assert_eq!(order.total().cents(), 3000);
        assert!(!order.product_assigned());
        assert_eq!(order.history().len(), 1);
    }

    #[test]
    fn test_new_order_rejects_empty_and_zero_quantity() {
        assert!(matches!(
            Order::new(UserId::new(), vec![], Utc::now()),
            Err(OrderError::NoItems)
        ));
        assert!(matches!(
            Order::new(UserId::new(), vec![line(0)], Utc::now()),
            Err(OrderError::InvalidQuantity { quantity: 0 })
        ));
    }

    #[test]
    fn test_confirm_payment_is_idempotent() {
        let mut order = paid_order(vec![line(1)]);
        assert_eq!(order.payment_status(), PaymentStatus::Paid);
        assert_eq!(order.order_status(), OrderStatus::Processing);
        let history_len = order.history().len();

        assert!(!order.confirm_payment("PAY-1", Utc::now()).unwrap());
        assert_eq!(order.history().len(), history_len);
    }

    #[test]
    fn test_confirm_payment_rejects_other_payment() {
        let mut order = paid_order(vec![line(1)]);
        let err = order.confirm_payment("PAY-2", Utc::now()).unwrap_err();
        assert!(matches!(err, OrderError::PaymentMismatch { .. }));
    }

    #[test]
    fn test_confirm_without_attached_payment_records_it() {
        let mut order = Order::new(UserId::new(), vec![line(1)], Utc::now()).unwrap();
        assert!(order.confirm_payment("CARD-9", Utc::now()).unwrap());
        assert_eq!(order.payment_id(), Some("CARD-9"));
    }

    #[test]
    fn test_begin_fulfillment_requires_payment() {
        let mut order = Order::new(UserId::new(), vec![line(1)], Utc::now()).unwrap();
        let err = order
            .begin_fulfillment(Uuid::new_v4(), Utc::now(), Duration::seconds(60))
            .unwrap_err();
        assert!(matches!(err, OrderError::NotPaid { .. }));
    }

    #[test]
    fn test_lease_is_exclusive_until_expiry() {
        let mut order = paid_order(vec![line(1)]);
        let now = Utc::now();
        let ttl = Duration::seconds(60);

        let first = Uuid::new_v4();
        assert_eq!(
            order.begin_fulfillment(first, now, ttl).unwrap(),
            LeaseOutcome::Acquired
        );
        assert_eq!(
            order.begin_fulfillment(Uuid::new_v4(), now, ttl).unwrap(),
            LeaseOutcome::Held
        );

        // A stale lease can be taken over.
        let later = now + Duration::seconds(61);
        assert_eq!(
            order.begin_fulfillment(Uuid::new_v4(), later, ttl).unwrap(),
            LeaseOutcome::Acquired
        );
        assert!(matches!(
            order.record_delivery(first, 0, &[StockItemId::new()], later),
            Err(OrderError::LeaseNotHeld)
        ));
    }

    #[test]
    fn test_full_delivery_completes_order() {
        let mut order = paid_order(vec![line(2)]);
        let now = Utc::now();
        let token = Uuid::new_v4();
        order.begin_fulfillment(token, now, Duration::seconds(60)).unwrap();
        order
            .record_delivery(token, 0, &[StockItemId::new(), StockItemId::new()], now)
            .unwrap();

        let status = order
            .finish_fulfillment(token, FulfillmentPolicy::AllOrNothing, now)
            .unwrap();
        assert_eq!(status, OrderStatus::Completed);
        assert!(order.product_assigned());
        assert!(!order.needs_review());
        assert!(order.lease().is_none());
        assert_eq!(order.delivered_items().count(), 2);

        assert_eq!(
            order.begin_fulfillment(Uuid::new_v4(), now, Duration::seconds(60)).unwrap(),
            LeaseOutcome::AlreadyAssigned
        );
    }

    #[test]
    fn test_record_delivery_ignores_repeated_items() {
        let mut order = paid_order(vec![line(2)]);
        let now = Utc::now();
        let token = Uuid::new_v4();
        order.begin_fulfillment(token, now, Duration::seconds(60)).unwrap();
        let item = StockItemId::new();
        order.record_delivery(token, 0, &[item], now).unwrap();
        order.record_delivery(token, 0, &[item], now).unwrap();
        assert_eq!(order.lines()[0].delivered.len(), 1);
        assert_eq!(order.lines()[0].outstanding(), 1);
        assert!(matches!(
            order.record_delivery(token, 5, &[item], now),
            Err(OrderError::LineNotFound { index: 5 })
        ));
    }

    #[test]
    fn test_partial_delivery_depends_on_policy() {
        let now = Utc::now();
        let ttl = Duration::seconds(60);

        let mut strict = paid_order(vec![line(1), line(1)]);
        let token = Uuid::new_v4();
        strict.begin_fulfillment(token, now, ttl).unwrap();
        strict.record_delivery(token, 0, &[StockItemId::new()], now).unwrap();
        let status = strict
            .finish_fulfillment(token, FulfillmentPolicy::AllOrNothing, now)
            .unwrap();
        assert_eq!(status, OrderStatus::Processing);
        assert!(!strict.product_assigned());

        let mut lenient = paid_order(vec![line(1), line(1)]);
        let token = Uuid::new_v4();
        lenient.begin_fulfillment(token, now, ttl).unwrap();
        lenient.record_delivery(token, 0, &[StockItemId::new()], now).unwrap();
        let status = lenient
            .finish_fulfillment(token, FulfillmentPolicy::BestEffort, now)
            .unwrap();
        assert_eq!(status, OrderStatus::Completed);
        assert!(lenient.needs_review());
        assert_eq!(lenient.undelivered_lines(), vec![1]);
    }

    #[test]
    fn test_order_needing_review_can_be_retried() {
        let now = Utc::now();
        let ttl = Duration::seconds(60);
        let mut order = paid_order(vec![line(1), line(1)]);

        let token = Uuid::new_v4();
        order.begin_fulfillment(token, now, ttl).unwrap();
        order.record_delivery(token, 0, &[StockItemId::new()], now).unwrap();
        order
            .finish_fulfillment(token, FulfillmentPolicy::BestEffort, now)
            .unwrap();
        assert!(order.needs_review());

        let retry = Uuid::new_v4();
        assert_eq!(
            order.begin_fulfillment(retry, now, ttl).unwrap(),
            LeaseOutcome::Acquired
        );
        order.record_delivery(retry, 1, &[StockItemId::new()], now).unwrap();
        let status = order
            .finish_fulfillment(retry, FulfillmentPolicy::BestEffort, now)
            .unwrap();

        assert_eq!(status, OrderStatus::Completed);
        assert!(!order.needs_review());
        assert!(order.undelivered_lines().is_empty());
        assert!(matches!(
            order.history().last().map(|entry| &entry.event),
            Some(OrderHistoryEvent::ReviewRetried { undelivered_lines }) if undelivered_lines.is_empty()
        ));
        assert_eq!(
            order.begin_fulfillment(Uuid::new_v4(), now, ttl).unwrap(),
            LeaseOutcome::AlreadyAssigned
        );
    }

    #[test]
    fn test_best_effort_with_nothing_delivered_stays_processing() {
        let mut order = paid_order(vec![line(1)]);
        let now = Utc::now();
        let token = Uuid::new_v4();
        order.begin_fulfillment(token, now, Duration::seconds(60)).unwrap();
        let status = order
            .finish_fulfillment(token, FulfillmentPolicy::BestEffort, now)
            .unwrap();
        assert_eq!(status, OrderStatus::Processing);
        assert!(order.lease().is_none());
    }

    #[test]
    fn test_expire_only_after_deadline() {
        let now = Utc::now();
        let mut order = Order::new(UserId::new(), vec![line(1)], now).unwrap();
        order
            .attach_payment(pix("PAY-1", now + Duration::minutes(30)), now)
            .unwrap();

        assert!(!order.expire(now).unwrap());
        assert!(order.expire(now + Duration::minutes(31)).unwrap());
        assert_eq!(order.payment_status(), PaymentStatus::Expired);
        assert_eq!(order.order_status(), OrderStatus::Expired);

        let err = order.confirm_payment("PAY-1", now).unwrap_err();
        assert!(matches!(err, OrderError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_paid_order_never_expires_or_cancels() {
        let mut order = paid_order(vec![line(1)]);
        assert!(!order.expire(Utc::now() + Duration::days(1)).unwrap());
        assert!(order.cancel("changed mind", Utc::now()).is_err());
    }

    #[test]
    fn test_serialization_roundtrip_keeps_history() {
        let order = paid_order(vec![line(1)]);
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["history"][1]["event"], "payment_attached");
        let back: Order = serde_json::from_value(json).unwrap();
        assert_eq!(back, order);
    }
}
