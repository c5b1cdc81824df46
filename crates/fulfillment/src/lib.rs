//! Stock assignment and order fulfillment.
//!
//! The flow runs payment provider -> coordinator -> assignment engine ->
//! stock ledger -> order record:
//! 1. `checkout` creates a pending order and its PIX payment
//! 2. A webhook (or polling) confirms the payment with one atomic transition
//! 3. `fulfill_order` claims stock for every line under a fulfillment lease
//! 4. The sweeper expires orders whose payment window has elapsed

pub mod cache;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod import;
pub mod lookup;
pub mod notify;
pub mod payment;
pub mod sweeper;
pub mod webhook;

pub use cache::{Cache, NoopCache, TtlCache};
pub use coordinator::{
    Checkout, CheckoutLine, CheckoutReceipt, CoordinatorConfig, FulfillmentCoordinator,
    FulfillmentOutcome, FulfillmentReport, LineReport, LineStatus, PaymentCheck, WebhookOutcome,
};
pub use engine::{AssignStock, Assignment, AssignmentEngine};
pub use error::{FulfillmentError, Result};
pub use import::{ImportReport, StockImporter};
pub use lookup::CatalogLookup;
pub use notify::{
    DiscordNotifier, NoopNotifier, Notifier, NotifyError, OrderSummary, RecordingNotifier,
};
pub use payment::{
    InMemoryPaymentProvider, MERCADO_PAGO_BASE_URL, MercadoPagoClient, PaymentProvider,
    PixRequest, ProviderPayment, ProviderStatus,
};
pub use sweeper::ExpirySweeper;
pub use webhook::{ProviderId, WebhookData, WebhookNotification, is_valid_payment_id};
