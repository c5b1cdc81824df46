//! Order fulfillment coordinator.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use common::{OrderId, ProductId, StockItemId, UserId, VariantId};
use domain::{
    AssignedBy, FulfillmentPolicy, LeaseOutcome, Money, Order, OrderLine, OrderStatus,
    PaymentInfo, PaymentMethod, PaymentStatus, StockKey,
};
use serde::{Deserialize, Serialize};
use storage::Storage;
use uuid::Uuid;

use crate::engine::{AssignStock, AssignmentEngine};
use crate::error::{FulfillmentError, Result};
use crate::import::StockImporter;
use crate::lookup::CatalogLookup;
use crate::notify::{Notifier, OrderSummary};
use crate::payment::{PaymentProvider, PixRequest, ProviderPayment, ProviderStatus};
use crate::sweeper::ExpirySweeper;
use crate::webhook::WebhookNotification;

/// Tunables for the fulfillment flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub policy: FulfillmentPolicy,
    /// How long a fulfillment run may hold an order before another caller
    /// can take over.
    pub lease_ttl: Duration,
    /// PIX payment window.
    pub pix_expiration: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            policy: FulfillmentPolicy::default(),
            lease_ttl: Duration::seconds(120),
            pix_expiration: Duration::minutes(30),
        }
    }
}

/// One line of a checkout request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    pub user_id: UserId,
    pub lines: Vec<CheckoutLine>,
}

/// What the customer needs to pay for a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
    pub order_id: OrderId,
    pub total: Money,
    pub payment_id: String,
    pub qr_code: Option<String>,
    pub qr_code_base64: Option<String>,
    pub ticket_url: Option<String>,
    pub expires_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentOutcome {
    /// Every line delivered and the order completed.
    Fulfilled,
    /// Completed with undelivered lines; flagged for review.
    PartiallyFulfilled,
    /// The policy was not satisfied; the order stays processing.
    Incomplete,
    /// Stock was already assigned by an earlier run.
    AlreadyProcessed,
    /// Another run holds the fulfillment lease.
    InProgress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LineStatus {
    Delivered { items: u32 },
    AlreadyDelivered,
    Failed {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        available: Option<u64>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineReport {
    pub index: usize,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
    #[serde(flatten)]
    pub status: LineStatus,
}

impl LineReport {
    fn new(index: usize, line: &OrderLine, status: LineStatus) -> Self {
        Self {
            index,
            product_id: line.product_id,
            variant_id: line.variant_id,
            quantity: line.quantity,
            status,
        }
    }

    fn failed(index: usize, line: &OrderLine, err: &FulfillmentError) -> Self {
        let available = match err {
            FulfillmentError::InsufficientStock { available, .. } => Some(*available),
            _ => None,
        };
        Self::new(
            index,
            line,
            LineStatus::Failed {
                reason: err.to_string(),
                available,
            },
        )
    }
}

/// Result of a fulfillment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FulfillmentReport {
    pub order_id: OrderId,
    pub outcome: FulfillmentOutcome,
    pub order_status: OrderStatus,
    pub product_assigned: bool,
    pub needs_review: bool,
    /// Per-line detail for the run. Empty when no run took place.
    pub lines: Vec<LineReport>,
}

impl FulfillmentReport {
    fn from_order(order: &Order, outcome: FulfillmentOutcome, lines: Vec<LineReport>) -> Self {
        Self {
            order_id: order.id(),
            outcome,
            order_status: order.order_status(),
            product_assigned: order.product_assigned(),
            needs_review: order.needs_review(),
            lines,
        }
    }

    /// True once the order's stock has been assigned.
    pub fn success(&self) -> bool {
        self.product_assigned
    }
}

/// What a webhook delivery led to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Not a payment notification.
    Ignored,
    PaymentPending {
        payment_id: String,
        provider_status: String,
    },
    PaymentFailed {
        payment_id: String,
        provider_status: String,
    },
    Processed(FulfillmentReport),
}

/// Payment state of an order after polling the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentCheck {
    pub order_id: OrderId,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub product_assigned: bool,
    pub provider_status: Option<String>,
}

impl PaymentCheck {
    fn from_order(order: &Order, provider_status: Option<String>) -> Self {
        Self {
            order_id: order.id(),
            payment_status: order.payment_status(),
            order_status: order.order_status(),
            product_assigned: order.product_assigned(),
            provider_status,
        }
    }
}

/// Drives orders from checkout through payment to delivered stock.
///
/// Every order mutation goes through `OrderRepository::modify`, so the
/// `Pending -> Paid` guard and the fulfillment lease are single atomic
/// writes. Repeated or concurrent notifications for the same payment never
/// claim stock twice.
pub struct FulfillmentCoordinator<S> {
    storage: S,
    engine: AssignmentEngine<S>,
    importer: StockImporter<S>,
    provider: Arc<dyn PaymentProvider>,
    notifier: Arc<dyn Notifier>,
    config: CoordinatorConfig,
}

impl<S: Storage> FulfillmentCoordinator<S> {
    pub fn new(
        lookup: CatalogLookup<S>,
        provider: Arc<dyn PaymentProvider>,
        notifier: Arc<dyn Notifier>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            storage: lookup.storage().clone(),
            engine: AssignmentEngine::new(lookup.clone()),
            importer: StockImporter::new(lookup),
            provider,
            notifier,
            config,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn engine(&self) -> &AssignmentEngine<S> {
        &self.engine
    }

    pub fn importer(&self) -> &StockImporter<S> {
        &self.importer
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Builds an expiry sweeper over the same storage.
    pub fn sweeper(&self) -> ExpirySweeper<S> {
        ExpirySweeper::new(self.storage.clone())
    }

    /// Loads an order, failing with `NotFound` when it does not exist.
    pub async fn order(&self, order_id: OrderId) -> Result<Order> {
        self.storage
            .get_order(order_id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("order", order_id))
    }

    /// Creates a pending order and its PIX payment.
    ///
    /// Nothing is stored when the provider rejects the payment.
    #[tracing::instrument(
        skip(self, checkout),
        fields(user_id = %checkout.user_id, lines = checkout.lines.len())
    )]
    pub async fn checkout(&self, checkout: Checkout) -> Result<CheckoutReceipt> {
        if checkout.lines.is_empty() {
            return Err(FulfillmentError::Validation(
                "order has no items".to_string(),
            ));
        }
        let lookup = self.engine.lookup();
        let user = lookup.user(checkout.user_id).await?;

        let mut lines = Vec::with_capacity(checkout.lines.len());
        let mut requested: HashMap<StockKey, u64> = HashMap::new();
        for line in &checkout.lines {
            if line.quantity == 0 {
                return Err(FulfillmentError::Validation(
                    "quantity must be greater than 0".to_string(),
                ));
            }
            let product = lookup.product(line.product_id).await?;
            let key = product.stock_key(line.variant_id)?;
            *requested.entry(key).or_default() += u64::from(line.quantity);

            let available = self.storage.count_free(key).await?;
            if available < requested[&key] {
                return Err(FulfillmentError::InsufficientStock {
                    product_id: line.product_id,
                    variant_id: line.variant_id,
                    available,
                    requested: requested[&key],
                });
            }

            lines.push(OrderLine::new(
                product.id,
                line.variant_id,
                product.display_name(line.variant_id),
                line.quantity,
                product.price_for(line.variant_id),
            ));
        }

        let now = Utc::now();
        let mut order = Order::new(user.id, lines, now)?;
        let description = order
            .lines()
            .iter()
            .map(|line| line.product_name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let payment = self
            .provider
            .create_pix_payment(&PixRequest {
                order_id: order.id(),
                amount: order.total(),
                description,
                payer_email: user.email.clone(),
                expires_at: now + self.config.pix_expiration,
            })
            .await?;

        order.attach_payment(
            PaymentInfo {
                payment_id: payment.id.clone(),
                method: PaymentMethod::Pix,
                provider_status: payment.raw_status.clone(),
                expires_at: payment
                    .expires_at
                    .or(Some(now + self.config.pix_expiration)),
                qr_code: payment.qr_code.clone(),
                qr_code_base64: payment.qr_code_base64.clone(),
                ticket_url: payment.ticket_url.clone(),
                paid_at: None,
            },
            now,
        )?;
        self.storage.insert_order(order.clone()).await?;

        metrics::counter!("checkouts_total").increment(1);
        tracing::info!(order_id = %order.id(), payment_id = %payment.id, total = %order.total(), "order created");

        Ok(CheckoutReceipt {
            order_id: order.id(),
            total: order.total(),
            payment_id: payment.id,
            qr_code: payment.qr_code,
            qr_code_base64: payment.qr_code_base64,
            ticket_url: payment.ticket_url,
            expires_at: order.expires_at(),
        })
    }

    /// Handles a payment webhook delivery.
    ///
    /// The payload only names the payment; its status is always read back
    /// from the provider. Safe to call any number of times for the same
    /// payment.
    #[tracing::instrument(skip(self, notification))]
    pub async fn handle_webhook(&self, notification: WebhookNotification) -> Result<WebhookOutcome> {
        let Some(payment_id) = notification.payment_id() else {
            metrics::counter!("payment_webhooks_total", "result" => "ignored").increment(1);
            tracing::debug!(?notification, "ignoring non-payment notification");
            return Ok(WebhookOutcome::Ignored);
        };

        let payment = self.provider.get_payment(&payment_id).await?;
        let order = self.resolve_order(&payment).await?;
        let outcome = self.apply_provider_status(&order, &payment).await?;

        let label = match &outcome {
            WebhookOutcome::Ignored => "ignored",
            WebhookOutcome::PaymentPending { .. } => "pending",
            WebhookOutcome::PaymentFailed { .. } => "failed",
            WebhookOutcome::Processed(_) => "approved",
        };
        metrics::counter!("payment_webhooks_total", "result" => label).increment(1);
        Ok(outcome)
    }

    /// Polls the provider for an order's payment and confirms it on approval.
    #[tracing::instrument(skip(self))]
    pub async fn check_payment(&self, order_id: OrderId) -> Result<PaymentCheck> {
        let order = self.order(order_id).await?;
        let Some(payment_id) = order.payment_id() else {
            return Err(FulfillmentError::Validation(
                "order has no payment".to_string(),
            ));
        };

        if order.payment_status() != PaymentStatus::Pending {
            let provider_status = order.payment().map(|p| p.provider_status.clone());
            return Ok(PaymentCheck::from_order(&order, provider_status));
        }

        let payment = self.provider.get_payment(payment_id).await?;
        self.apply_provider_status(&order, &payment).await?;

        let order = self.order(order_id).await?;
        Ok(PaymentCheck::from_order(&order, Some(payment.raw_status)))
    }

    /// Moves a pending order to paid. Returns false if it was already paid.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_payment(&self, order_id: OrderId, payment_id: &str) -> Result<bool> {
        let (confirmed, _) = self
            .storage
            .modify(order_id, |order| order.confirm_payment(payment_id, Utc::now()))
            .await?;
        if confirmed {
            metrics::counter!("payments_confirmed_total").increment(1);
            tracing::info!(%order_id, payment_id, "payment confirmed");
        }
        Ok(confirmed)
    }

    /// Confirms the payment, then fulfills unless stock was already assigned.
    pub async fn confirm_and_fulfill(
        &self,
        order_id: OrderId,
        payment_id: &str,
    ) -> Result<FulfillmentReport> {
        self.confirm_payment(order_id, payment_id).await?;
        self.fulfill_order(order_id).await
    }

    /// Assigns stock for every outstanding line of a paid order.
    ///
    /// Idempotent: once stock is assigned further calls report
    /// `AlreadyProcessed`, and a concurrent call reports `InProgress`.
    /// Failed lines are logged and skipped; whether the order completes is
    /// decided by the configured policy.
    #[tracing::instrument(skip(self), fields(policy = ?self.config.policy))]
    pub async fn fulfill_order(&self, order_id: OrderId) -> Result<FulfillmentReport> {
        metrics::counter!("fulfillment_runs_total").increment(1);
        let start = Instant::now();

        let token = Uuid::new_v4();
        let lease_ttl = self.config.lease_ttl;
        let (lease, order) = self
            .storage
            .modify(order_id, |order| {
                order.begin_fulfillment(token, Utc::now(), lease_ttl)
            })
            .await?;

        match lease {
            LeaseOutcome::AlreadyAssigned => {
                tracing::debug!(%order_id, "stock already assigned");
                return Ok(FulfillmentReport::from_order(
                    &order,
                    FulfillmentOutcome::AlreadyProcessed,
                    Vec::new(),
                ));
            }
            LeaseOutcome::Held => {
                tracing::info!(%order_id, "fulfillment already running");
                return Ok(FulfillmentReport::from_order(
                    &order,
                    FulfillmentOutcome::InProgress,
                    Vec::new(),
                ));
            }
            LeaseOutcome::Acquired => {}
        }
        // A completed order taken again only retries its undelivered lines.
        let review_retry = order.product_assigned();

        let lines = match self.deliver_lines(token, order).await {
            Ok(lines) => lines,
            Err(err) => {
                if let Err(release_err) = self
                    .storage
                    .modify(order_id, |order| order.release_fulfillment(token, Utc::now()))
                    .await
                {
                    tracing::warn!(%order_id, error = %release_err, "failed to release fulfillment lease");
                }
                tracing::error!(%order_id, error = %err, "fulfillment aborted");
                return Err(err);
            }
        };

        let policy = self.config.policy;
        let (status, order) = self
            .storage
            .modify(order_id, |order| {
                order.finish_fulfillment(token, policy, Utc::now())
            })
            .await?;

        let outcome = match (status, order.needs_review()) {
            (OrderStatus::Completed, false) => FulfillmentOutcome::Fulfilled,
            (OrderStatus::Completed, true) => FulfillmentOutcome::PartiallyFulfilled,
            _ => FulfillmentOutcome::Incomplete,
        };

        let duration = start.elapsed().as_secs_f64();
        metrics::histogram!("fulfillment_duration_seconds").record(duration);

        if review_retry {
            metrics::counter!("fulfillment_review_retries_total").increment(1);
            tracing::info!(
                %order_id,
                ?outcome,
                undelivered = ?order.undelivered_lines(),
                "review retry finished"
            );
        } else if status == OrderStatus::Completed {
            metrics::counter!("fulfillment_completed").increment(1);
            tracing::info!(%order_id, ?outcome, duration, "order fulfilled");
            self.notify_completed(&order).await;
        } else {
            metrics::counter!("fulfillment_incomplete").increment(1);
            tracing::warn!(
                %order_id,
                undelivered = ?order.undelivered_lines(),
                "order left processing"
            );
        }

        Ok(FulfillmentReport::from_order(&order, outcome, lines))
    }

    async fn resolve_order(&self, payment: &ProviderPayment) -> Result<Order> {
        if let Some(order_id) = payment.order_id()
            && let Some(order) = self.storage.get_order(order_id).await?
        {
            return Ok(order);
        }
        self.storage
            .find_by_payment_id(&payment.id)
            .await?
            .ok_or_else(|| FulfillmentError::not_found("order for payment", &payment.id))
    }

    async fn apply_provider_status(
        &self,
        order: &Order,
        payment: &ProviderPayment,
    ) -> Result<WebhookOutcome> {
        match payment.status {
            ProviderStatus::Approved => {
                let report = self.confirm_and_fulfill(order.id(), &payment.id).await?;
                Ok(WebhookOutcome::Processed(report))
            }
            ProviderStatus::Pending => Ok(WebhookOutcome::PaymentPending {
                payment_id: payment.id.clone(),
                provider_status: payment.raw_status.clone(),
            }),
            ProviderStatus::Failed => {
                let reason = format!("payment {}", payment.raw_status);
                let (canceled, _) = self
                    .storage
                    .modify(order.id(), |order| {
                        if order.payment_status() != PaymentStatus::Pending {
                            return Ok(false);
                        }
                        order.cancel(reason, Utc::now()).map(|()| true)
                    })
                    .await?;
                if canceled {
                    tracing::info!(order_id = %order.id(), status = %payment.raw_status, "order canceled by provider status");
                }
                Ok(WebhookOutcome::PaymentFailed {
                    payment_id: payment.id.clone(),
                    provider_status: payment.raw_status.clone(),
                })
            }
        }
    }

    /// Runs every outstanding line while holding the lease.
    async fn deliver_lines(&self, token: Uuid, mut order: Order) -> Result<Vec<LineReport>> {
        if self.config.policy == FulfillmentPolicy::AllOrNothing
            && let Some(reports) = self.check_availability(&order).await?
        {
            return Ok(reports);
        }

        let mut reports = Vec::with_capacity(order.lines().len());
        for index in 0..order.lines().len() {
            let line = order.lines()[index].clone();
            if line.is_delivered() {
                reports.push(LineReport::new(index, &line, LineStatus::AlreadyDelivered));
                continue;
            }

            match self.deliver_line(token, &order, index).await {
                Ok((items, updated)) => {
                    order = updated;
                    reports.push(LineReport::new(index, &line, LineStatus::Delivered { items }));
                }
                Err(err) if err.is_line_failure() => {
                    tracing::warn!(
                        order_id = %order.id(),
                        line = index,
                        product_id = %line.product_id,
                        variant_id = ?line.variant_id,
                        outstanding = line.outstanding(),
                        error = %err,
                        "line assignment failed"
                    );
                    reports.push(LineReport::failed(index, &line, &err));
                }
                Err(err) => return Err(err),
            }
        }
        Ok(reports)
    }

    /// Claims (or reuses) the items for one line and records them.
    async fn deliver_line(&self, token: Uuid, order: &Order, index: usize) -> Result<(u32, Order)> {
        let line = &order.lines()[index];
        let key = line.key();
        let outstanding = line.outstanding() as usize;

        // Items claimed for this order by an earlier run that never got
        // recorded on a line.
        let recorded: HashSet<StockItemId> = order.delivered_items().copied().collect();
        let mut items: Vec<StockItemId> = self
            .storage
            .assigned_to_order(order.id(), key)
            .await?
            .into_iter()
            .map(|item| item.id)
            .filter(|id| !recorded.contains(id))
            .take(outstanding)
            .collect();
        let reused = items.len();

        if reused < outstanding {
            let assignment = self
                .engine
                .assign_stock(AssignStock {
                    product_id: line.product_id,
                    variant_id: line.variant_id,
                    user_id: order.user_id(),
                    quantity: (outstanding - reused) as u32,
                    order_id: Some(order.id()),
                    assigned_by: AssignedBy::System,
                })
                .await?;
            items.extend(assignment.items.iter().map(|item| item.id));
        } else {
            self.storage.refresh_stock(key).await?;
        }
        if reused > 0 {
            tracing::info!(order_id = %order.id(), line = index, reused, "reusing items claimed by an earlier run");
        }

        let (_, updated) = self
            .storage
            .modify(order.id(), |order| {
                order.record_delivery(token, index, &items, Utc::now())
            })
            .await?;
        Ok((items.len() as u32, updated))
    }

    /// Checks every outstanding line can be served before claiming anything.
    ///
    /// Returns failure reports when any (product, variant) is short.
    async fn check_availability(&self, order: &Order) -> Result<Option<Vec<LineReport>>> {
        let recorded: HashSet<StockItemId> = order.delivered_items().copied().collect();
        let mut needed: HashMap<StockKey, u64> = HashMap::new();
        for line in order.lines().iter().filter(|line| !line.is_delivered()) {
            *needed.entry(line.key()).or_default() += u64::from(line.outstanding());
        }

        let mut available: HashMap<StockKey, u64> = HashMap::new();
        let mut short = false;
        for (key, need) in &needed {
            let reusable = self
                .storage
                .assigned_to_order(order.id(), *key)
                .await?
                .iter()
                .filter(|item| !recorded.contains(&item.id))
                .count() as u64;
            let free = self.storage.count_free(*key).await?;
            if free + reusable < *need {
                short = true;
            }
            available.insert(*key, free + reusable);
        }

        if !short {
            return Ok(None);
        }

        metrics::counter!("stock_insufficient_total").increment(1);
        let reports = order
            .lines()
            .iter()
            .enumerate()
            .map(|(index, line)| {
                if line.is_delivered() {
                    return LineReport::new(index, line, LineStatus::AlreadyDelivered);
                }
                let key = line.key();
                let err = FulfillmentError::InsufficientStock {
                    product_id: line.product_id,
                    variant_id: line.variant_id,
                    available: available.get(&key).copied().unwrap_or_default(),
                    requested: needed.get(&key).copied().unwrap_or_default(),
                };
                tracing::warn!(order_id = %order.id(), line = index, error = %err, "order cannot be served in full");
                LineReport::failed(index, line, &err)
            })
            .collect();
        Ok(Some(reports))
    }

    async fn notify_completed(&self, order: &Order) {
        let customer = match self.engine.lookup().user(order.user_id()).await {
            Ok(user) => Some(user.name),
            Err(_) => None,
        };
        let summary = OrderSummary::from_order(order, customer);
        if let Err(err) = self.notifier.order_completed(&summary).await {
            tracing::warn!(order_id = %order.id(), error = %err, "order notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlCache;
    use crate::notify::RecordingNotifier;
    use crate::payment::InMemoryPaymentProvider;
    use domain::{Product, User, Variant};
    use storage::{Catalog, InMemoryStorage, OrderRepository, StockLedger, UserDirectory};

    struct Harness {
        coordinator: FulfillmentCoordinator<InMemoryStorage>,
        storage: InMemoryStorage,
        provider: InMemoryPaymentProvider,
        notifier: RecordingNotifier,
        user: User,
    }

    async fn harness(policy: FulfillmentPolicy) -> Harness {
        let storage = InMemoryStorage::new();
        let provider = InMemoryPaymentProvider::new();
        let notifier = RecordingNotifier::new();
        let user = User::new("Ana", "ana@example.com");
        storage.save_user(user.clone()).await.unwrap();

        let lookup = CatalogLookup::new(
            storage.clone(),
            Arc::new(TtlCache::new()),
            Arc::new(TtlCache::new()),
            std::time::Duration::from_secs(60),
        );
        let coordinator = FulfillmentCoordinator::new(
            lookup,
            Arc::new(provider.clone()),
            Arc::new(notifier.clone()),
            CoordinatorConfig {
                policy,
                ..CoordinatorConfig::default()
            },
        );

        Harness {
            coordinator,
            storage,
            provider,
            notifier,
            user,
        }
    }

    async fn stocked_product(storage: &InMemoryStorage, name: &str, codes: usize) -> Product {
        let product = Product::new(name, Money::from_cents(1000));
        storage.save_product(product.clone()).await.unwrap();
        let key = StockKey::product(product.id);
        let batch = (0..codes).map(|i| format!("{name}-{i}")).collect();
        storage.import_codes(key, batch, Utc::now()).await.unwrap();
        storage.refresh_stock(key).await.unwrap();
        product
    }

    fn line(product: &Product, quantity: u32) -> CheckoutLine {
        CheckoutLine {
            product_id: product.id,
            variant_id: None,
            quantity,
        }
    }

    #[tokio::test]
    async fn test_checkout_creates_pending_order_with_pix() {
        let h = harness(FulfillmentPolicy::BestEffort).await;
        let product = stocked_product(&h.storage, "Gift", 3).await;

        let receipt = h
            .coordinator
            .checkout(Checkout {
                user_id: h.user.id,
                lines: vec![line(&product, 2)],
            })
            .await
            .unwrap();

        assert_eq!(receipt.total, Money::from_cents(2000));
        assert!(receipt.qr_code.is_some());
        assert!(receipt.expires_at.is_some());

        let order = h.storage.get_order(receipt.order_id).await.unwrap().unwrap();
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert_eq!(order.payment_id(), Some(receipt.payment_id.as_str()));
        assert_eq!(h.provider.payment_count(), 1);
    }

    #[tokio::test]
    async fn test_checkout_rejects_unavailable_stock() {
        let h = harness(FulfillmentPolicy::BestEffort).await;
        let product = stocked_product(&h.storage, "Gift", 1).await;

        let result = h
            .coordinator
            .checkout(Checkout {
                user_id: h.user.id,
                lines: vec![line(&product, 1), line(&product, 1)],
            })
            .await;
        assert!(matches!(
            result,
            Err(FulfillmentError::InsufficientStock {
                available: 1,
                requested: 2,
                ..
            })
        ));
        assert_eq!(h.provider.payment_count(), 0);
    }

    #[tokio::test]
    async fn test_checkout_provider_failure_stores_nothing() {
        let h = harness(FulfillmentPolicy::BestEffort).await;
        let product = stocked_product(&h.storage, "Gift", 1).await;
        h.provider.set_fail_on_create(true);

        let result = h
            .coordinator
            .checkout(Checkout {
                user_id: h.user.id,
                lines: vec![line(&product, 1)],
            })
            .await;
        assert!(matches!(result, Err(FulfillmentError::UpstreamPayment(_))));
        assert!(
            h.storage
                .pending_expired_before(Utc::now() + Duration::days(1))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_fulfill_requires_payment() {
        let h = harness(FulfillmentPolicy::BestEffort).await;
        let product = stocked_product(&h.storage, "Gift", 1).await;
        let receipt = h
            .coordinator
            .checkout(Checkout {
                user_id: h.user.id,
                lines: vec![line(&product, 1)],
            })
            .await
            .unwrap();

        let result = h.coordinator.fulfill_order(receipt.order_id).await;
        assert!(matches!(
            result,
            Err(FulfillmentError::Order(domain::OrderError::NotPaid { .. }))
        ));
    }

    #[tokio::test]
    async fn test_webhook_confirms_and_fulfills_once() {
        let h = harness(FulfillmentPolicy::BestEffort).await;
        let product = stocked_product(&h.storage, "Gift", 3).await;
        let receipt = h
            .coordinator
            .checkout(Checkout {
                user_id: h.user.id,
                lines: vec![line(&product, 2)],
            })
            .await
            .unwrap();
        h.provider.approve(&receipt.payment_id);

        let first = h
            .coordinator
            .handle_webhook(WebhookNotification::payment(&receipt.payment_id))
            .await
            .unwrap();
        let WebhookOutcome::Processed(report) = first else {
            panic!("expected processed outcome");
        };
        assert_eq!(report.outcome, FulfillmentOutcome::Fulfilled);
        assert!(report.success());

        let second = h
            .coordinator
            .handle_webhook(WebhookNotification::payment(&receipt.payment_id))
            .await
            .unwrap();
        let WebhookOutcome::Processed(report) = second else {
            panic!("expected processed outcome");
        };
        assert_eq!(report.outcome, FulfillmentOutcome::AlreadyProcessed);

        let key = StockKey::product(product.id);
        assert_eq!(h.storage.count_free(key).await.unwrap(), 1);
        assert_eq!(h.storage.items_for_user(h.user.id).await.unwrap().len(), 2);
        assert_eq!(h.notifier.sent().len(), 1);

        let order = h.storage.get_order(receipt.order_id).await.unwrap().unwrap();
        let confirmations = order
            .history()
            .iter()
            .filter(|entry| matches!(entry.event, domain::OrderHistoryEvent::PaymentConfirmed { .. }))
            .count();
        assert_eq!(confirmations, 1);
    }

    #[tokio::test]
    async fn test_pending_and_failed_provider_statuses() {
        let h = harness(FulfillmentPolicy::BestEffort).await;
        let product = stocked_product(&h.storage, "Gift", 1).await;
        let receipt = h
            .coordinator
            .checkout(Checkout {
                user_id: h.user.id,
                lines: vec![line(&product, 1)],
            })
            .await
            .unwrap();

        let pending = h
            .coordinator
            .handle_webhook(WebhookNotification::payment(&receipt.payment_id))
            .await
            .unwrap();
        assert!(matches!(pending, WebhookOutcome::PaymentPending { .. }));

        h.provider.set_status(&receipt.payment_id, "rejected");
        let failed = h
            .coordinator
            .handle_webhook(WebhookNotification::payment(&receipt.payment_id))
            .await
            .unwrap();
        assert!(matches!(failed, WebhookOutcome::PaymentFailed { .. }));

        let order = h.storage.get_order(receipt.order_id).await.unwrap().unwrap();
        assert_eq!(order.order_status(), OrderStatus::Canceled);
        assert_eq!(h.storage.count_free(StockKey::product(product.id)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_webhook_provider_failure_is_upstream_error() {
        let h = harness(FulfillmentPolicy::BestEffort).await;
        h.provider.set_fail_on_get(true);
        let result = h
            .coordinator
            .handle_webhook(WebhookNotification::payment("123"))
            .await;
        assert!(matches!(result, Err(FulfillmentError::UpstreamPayment(_))));
    }

    #[tokio::test]
    async fn test_check_payment_polls_provider() {
        let h = harness(FulfillmentPolicy::BestEffort).await;
        let product = stocked_product(&h.storage, "Gift", 1).await;
        let receipt = h
            .coordinator
            .checkout(Checkout {
                user_id: h.user.id,
                lines: vec![line(&product, 1)],
            })
            .await
            .unwrap();

        let before = h.coordinator.check_payment(receipt.order_id).await.unwrap();
        assert_eq!(before.payment_status, PaymentStatus::Pending);
        assert_eq!(before.provider_status.as_deref(), Some("pending"));

        h.provider.approve(&receipt.payment_id);
        let after = h.coordinator.check_payment(receipt.order_id).await.unwrap();
        assert_eq!(after.payment_status, PaymentStatus::Paid);
        assert_eq!(after.order_status, OrderStatus::Completed);
        assert!(after.product_assigned);
    }

    #[tokio::test]
    async fn test_best_effort_completes_partial_order_for_review() {
        let h = harness(FulfillmentPolicy::BestEffort).await;
        let plenty = stocked_product(&h.storage, "Plenty", 5).await;
        let scarce = stocked_product(&h.storage, "Scarce", 1).await;
        let receipt = h
            .coordinator
            .checkout(Checkout {
                user_id: h.user.id,
                lines: vec![line(&plenty, 2), line(&scarce, 1)],
            })
            .await
            .unwrap();

        // Someone else takes the last scarce item before payment lands.
        h.coordinator
            .engine()
            .assign_stock(AssignStock {
                product_id: scarce.id,
                variant_id: None,
                user_id: h.user.id,
                quantity: 1,
                order_id: None,
                assigned_by: AssignedBy::System,
            })
            .await
            .unwrap();

        let report = h
            .coordinator
            .confirm_and_fulfill(receipt.order_id, &receipt.payment_id)
            .await
            .unwrap();

        assert_eq!(report.outcome, FulfillmentOutcome::PartiallyFulfilled);
        assert_eq!(report.order_status, OrderStatus::Completed);
        assert!(report.needs_review);
        assert_eq!(report.lines[0].status, LineStatus::Delivered { items: 2 });
        assert!(matches!(
            report.lines[1].status,
            LineStatus::Failed {
                available: Some(0),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_review_retry_delivers_restocked_line() {
        let h = harness(FulfillmentPolicy::BestEffort).await;
        let plenty = stocked_product(&h.storage, "Plenty", 5).await;
        let scarce = stocked_product(&h.storage, "Scarce", 1).await;
        let receipt = h
            .coordinator
            .checkout(Checkout {
                user_id: h.user.id,
                lines: vec![line(&plenty, 1), line(&scarce, 1)],
            })
            .await
            .unwrap();
        h.coordinator
            .engine()
            .assign_stock(AssignStock {
                product_id: scarce.id,
                variant_id: None,
                user_id: h.user.id,
                quantity: 1,
                order_id: None,
                assigned_by: AssignedBy::System,
            })
            .await
            .unwrap();

        let first = h
            .coordinator
            .confirm_and_fulfill(receipt.order_id, &receipt.payment_id)
            .await
            .unwrap();
        assert_eq!(first.outcome, FulfillmentOutcome::PartiallyFulfilled);

        h.coordinator
            .importer()
            .import_text(scarce.id, None, "Scarce-restock")
            .await
            .unwrap();
        let retry = h.coordinator.fulfill_order(receipt.order_id).await.unwrap();

        assert_eq!(retry.outcome, FulfillmentOutcome::Fulfilled);
        assert!(!retry.needs_review);
        assert_eq!(retry.lines[0].status, LineStatus::AlreadyDelivered);
        assert_eq!(retry.lines[1].status, LineStatus::Delivered { items: 1 });

        let order = h.coordinator.order(receipt.order_id).await.unwrap();
        assert_eq!(order.order_status(), OrderStatus::Completed);
        assert!(order.undelivered_lines().is_empty());
        assert_eq!(
            h.storage.count_free(StockKey::product(scarce.id)).await.unwrap(),
            0
        );
        // Completion was announced by the first run only.
        assert_eq!(h.notifier.sent().len(), 1);

        let again = h.coordinator.fulfill_order(receipt.order_id).await.unwrap();
        assert_eq!(again.outcome, FulfillmentOutcome::AlreadyProcessed);
    }

    #[tokio::test]
    async fn test_all_or_nothing_claims_nothing_when_short() {
        let h = harness(FulfillmentPolicy::AllOrNothing).await;
        let plenty = stocked_product(&h.storage, "Plenty", 5).await;
        let scarce = stocked_product(&h.storage, "Scarce", 1).await;
        let receipt = h
            .coordinator
            .checkout(Checkout {
                user_id: h.user.id,
                lines: vec![line(&plenty, 2), line(&scarce, 1)],
            })
            .await
            .unwrap();
        h.coordinator
            .engine()
            .assign_stock(AssignStock {
                product_id: scarce.id,
                variant_id: None,
                user_id: h.user.id,
                quantity: 1,
                order_id: None,
                assigned_by: AssignedBy::System,
            })
            .await
            .unwrap();

        let report = h
            .coordinator
            .confirm_and_fulfill(receipt.order_id, &receipt.payment_id)
            .await
            .unwrap();
        assert_eq!(report.outcome, FulfillmentOutcome::Incomplete);
        assert_eq!(report.order_status, OrderStatus::Processing);
        assert_eq!(
            h.storage
                .count_free(StockKey::product(plenty.id))
                .await
                .unwrap(),
            5
        );

        // Restock and retry manually.
        h.coordinator
            .importer()
            .import_text(scarce.id, None, "RESTOCK-1")
            .await
            .unwrap();
        let retry = h.coordinator.fulfill_order(receipt.order_id).await.unwrap();
        assert_eq!(retry.outcome, FulfillmentOutcome::Fulfilled);
        assert_eq!(h.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_items_claimed_by_crashed_run_are_reused() {
        let h = harness(FulfillmentPolicy::BestEffort).await;
        let product = stocked_product(&h.storage, "Gift", 3).await;
        let receipt = h
            .coordinator
            .checkout(Checkout {
                user_id: h.user.id,
                lines: vec![line(&product, 2)],
            })
            .await
            .unwrap();
        h.coordinator
            .confirm_payment(receipt.order_id, &receipt.payment_id)
            .await
            .unwrap();

        // A run claimed the items and died before recording them.
        h.coordinator
            .engine()
            .assign_stock(AssignStock {
                product_id: product.id,
                variant_id: None,
                user_id: h.user.id,
                quantity: 2,
                order_id: Some(receipt.order_id),
                assigned_by: AssignedBy::System,
            })
            .await
            .unwrap();

        let report = h.coordinator.fulfill_order(receipt.order_id).await.unwrap();
        assert_eq!(report.outcome, FulfillmentOutcome::Fulfilled);
        assert_eq!(h.storage.count_free(StockKey::product(product.id)).await.unwrap(), 1);
        assert_eq!(h.storage.items_for_user(h.user.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_held_lease_reports_in_progress() {
        let h = harness(FulfillmentPolicy::BestEffort).await;
        let product = stocked_product(&h.storage, "Gift", 1).await;
        let receipt = h
            .coordinator
            .checkout(Checkout {
                user_id: h.user.id,
                lines: vec![line(&product, 1)],
            })
            .await
            .unwrap();
        h.coordinator
            .confirm_payment(receipt.order_id, &receipt.payment_id)
            .await
            .unwrap();
        h.storage
            .modify(receipt.order_id, |o| {
                o.begin_fulfillment(Uuid::new_v4(), Utc::now(), Duration::minutes(5))
            })
            .await
            .unwrap();

        let report = h.coordinator.fulfill_order(receipt.order_id).await.unwrap();
        assert_eq!(report.outcome, FulfillmentOutcome::InProgress);
        assert_eq!(h.storage.count_free(StockKey::product(product.id)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_variant_line_without_variant_stock_fails() {
        let h = harness(FulfillmentPolicy::BestEffort).await;
        let product = Product::new("Skin", Money::from_cents(700))
            .with_variant(Variant::new("Blue", Money::from_cents(700)));
        h.storage.save_product(product.clone()).await.unwrap();
        h.coordinator
            .importer()
            .import_text(product.id, Some(product.variants[0].id), "B1\nB2")
            .await
            .unwrap();

        let result = h
            .coordinator
            .checkout(Checkout {
                user_id: h.user.id,
                lines: vec![line(&product, 1)],
            })
            .await;
        assert!(matches!(result, Err(FulfillmentError::Validation(_))));

        let receipt = h
            .coordinator
            .checkout(Checkout {
                user_id: h.user.id,
                lines: vec![CheckoutLine {
                    product_id: product.id,
                    variant_id: Some(product.variants[0].id),
                    quantity: 2,
                }],
            })
            .await
            .unwrap();
        assert_eq!(receipt.total, Money::from_cents(1400));
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_block() {
        let h = harness(FulfillmentPolicy::BestEffort).await;
        let product = stocked_product(&h.storage, "Gift", 1).await;
        h.notifier.set_fail(true);
        let receipt = h
            .coordinator
            .checkout(Checkout {
                user_id: h.user.id,
                lines: vec![line(&product, 1)],
            })
            .await
            .unwrap();

        let report = h
            .coordinator
            .confirm_and_fulfill(receipt.order_id, &receipt.payment_id)
            .await
            .unwrap();
        assert_eq!(report.outcome, FulfillmentOutcome::Fulfilled);
        assert!(h.notifier.sent().is_empty());
    }
}
