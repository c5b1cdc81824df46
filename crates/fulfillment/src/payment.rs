//! Payment provider trait, Mercado Pago client and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use common::OrderId;
use domain::Money;
use serde::{Deserialize, Serialize};

use crate::error::{FulfillmentError, Result};
use crate::webhook::{ProviderId, is_valid_payment_id};

/// Default Mercado Pago API root.
pub const MERCADO_PAGO_BASE_URL: &str = "https://api.mercadopago.com";

/// Provider status collapsed to what fulfillment acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Approved,
    Pending,
    Failed,
}

impl ProviderStatus {
    /// Maps a raw provider status string. Unknown values stay pending.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "approved" | "paid" => ProviderStatus::Approved,
            "rejected" | "cancelled" | "refunded" | "charged_back" => ProviderStatus::Failed,
            _ => ProviderStatus::Pending,
        }
    }
}

/// Parameters for a PIX charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixRequest {
    pub order_id: OrderId,
    pub amount: Money,
    pub description: String,
    pub payer_email: String,
    pub expires_at: DateTime<Utc>,
}

/// A payment as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderPayment {
    pub id: String,
    pub status: ProviderStatus,
    /// The provider's own status string.
    pub raw_status: String,
    /// Our order id, echoed back by the provider.
    pub external_reference: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub qr_code: Option<String>,
    pub qr_code_base64: Option<String>,
    pub ticket_url: Option<String>,
}

impl ProviderPayment {
    /// Resolves the external reference to an order id.
    pub fn order_id(&self) -> Option<OrderId> {
        self.external_reference.as_deref()?.parse().ok()
    }
}

/// Trait for the external payment provider.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Creates a PIX payment for an order.
    async fn create_pix_payment(&self, request: &PixRequest) -> Result<ProviderPayment>;

    /// Fetches the current state of a payment.
    async fn get_payment(&self, payment_id: &str) -> Result<ProviderPayment>;
}

#[derive(Debug, Serialize)]
struct MpPixBody<'a> {
    transaction_amount: f64,
    description: &'a str,
    payment_method_id: &'static str,
    external_reference: String,
    date_of_expiration: String,
    payer: MpPayer<'a>,
}

#[derive(Debug, Serialize)]
struct MpPayer<'a> {
    email: &'a str,
}

#[derive(Debug, Deserialize)]
struct MpPayment {
    id: ProviderId,
    status: String,
    #[serde(default)]
    external_reference: Option<String>,
    #[serde(default)]
    date_of_expiration: Option<String>,
    #[serde(default)]
    point_of_interaction: Option<MpPointOfInteraction>,
}

#[derive(Debug, Deserialize)]
struct MpPointOfInteraction {
    #[serde(default)]
    transaction_data: Option<MpTransactionData>,
}

#[derive(Debug, Default, Deserialize)]
struct MpTransactionData {
    #[serde(default)]
    qr_code: Option<String>,
    #[serde(default)]
    qr_code_base64: Option<String>,
    #[serde(default)]
    ticket_url: Option<String>,
}

impl From<MpPayment> for ProviderPayment {
    fn from(payment: MpPayment) -> Self {
        let transaction = payment
            .point_of_interaction
            .and_then(|poi| poi.transaction_data)
            .unwrap_or_default();
        let expires_at = payment
            .date_of_expiration
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|at| at.with_timezone(&Utc));

        ProviderPayment {
            id: payment.id.to_string(),
            status: ProviderStatus::from_provider(&payment.status),
            raw_status: payment.status,
            external_reference: payment.external_reference,
            expires_at,
            qr_code: transaction.qr_code,
            qr_code_base64: transaction.qr_code_base64,
            ticket_url: transaction.ticket_url,
        }
    }
}

/// Mercado Pago REST client.
#[derive(Debug, Clone)]
pub struct MercadoPagoClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl MercadoPagoClient {
    pub fn new(access_token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(upstream)?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        })
    }

    /// `{base}/v1/payments/{id}`, with the id appended as a single path segment.
    fn payment_url(&self, payment_id: &str) -> Result<reqwest::Url> {
        if !is_valid_payment_id(payment_id) {
            return Err(FulfillmentError::Validation(format!(
                "invalid payment id: {payment_id:?}"
            )));
        }
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| {
            FulfillmentError::UpstreamPayment(format!("invalid provider base url: {e}"))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                FulfillmentError::UpstreamPayment("provider base url cannot have a path".to_string())
            })?
            .pop_if_empty()
            .extend(["v1", "payments", payment_id]);
        Ok(url)
    }

    async fn read_payment(response: reqwest::Response) -> Result<ProviderPayment> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FulfillmentError::UpstreamPayment(format!(
                "provider returned {status}: {body}"
            )));
        }
        let payment: MpPayment = response.json().await.map_err(upstream)?;
        Ok(payment.into())
    }
}

fn upstream(err: reqwest::Error) -> FulfillmentError {
    FulfillmentError::UpstreamPayment(err.to_string())
}

#[async_trait]
impl PaymentProvider for MercadoPagoClient {
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_pix_payment(&self, request: &PixRequest) -> Result<ProviderPayment> {
        let body = MpPixBody {
            transaction_amount: request.amount.as_decimal(),
            description: &request.description,
            payment_method_id: "pix",
            external_reference: request.order_id.to_string(),
            date_of_expiration: request
                .expires_at
                .to_rfc3339_opts(SecondsFormat::Millis, false),
            payer: MpPayer {
                email: &request.payer_email,
            },
        };

        let response = self
            .http
            .post(format!("{}/v1/payments", self.base_url))
            .bearer_auth(&self.access_token)
            .header("X-Idempotency-Key", request.order_id.to_string())
            .json(&body)
            .send()
            .await
            .map_err(upstream)?;
        Self::read_payment(response).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_payment(&self, payment_id: &str) -> Result<ProviderPayment> {
        let response = self
            .http
            .get(self.payment_url(payment_id)?)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(upstream)?;
        Self::read_payment(response).await
    }
}

#[derive(Debug, Default)]
struct InMemoryProviderState {
    payments: HashMap<String, ProviderPayment>,
    next_id: u64,
    fail_on_create: bool,
    fail_on_get: bool,
}

/// In-memory payment provider for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentProvider {
    state: Arc<RwLock<InMemoryProviderState>>,
}

impl InMemoryPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryProviderState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, InMemoryProviderState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures the provider to fail payment creation.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.write().fail_on_create = fail;
    }

    /// Configures the provider to fail status lookups.
    pub fn set_fail_on_get(&self, fail: bool) {
        self.write().fail_on_get = fail;
    }

    /// Overwrites the raw status of a payment. Returns false if unknown.
    pub fn set_status(&self, payment_id: &str, raw_status: &str) -> bool {
        match self.write().payments.get_mut(payment_id) {
            Some(payment) => {
                payment.raw_status = raw_status.to_string();
                payment.status = ProviderStatus::from_provider(raw_status);
                true
            }
            None => false,
        }
    }

    /// Marks a payment approved.
    pub fn approve(&self, payment_id: &str) -> bool {
        self.set_status(payment_id, "approved")
    }

    /// Registers a payment created outside this provider.
    pub fn insert(&self, payment: ProviderPayment) {
        self.write().payments.insert(payment.id.clone(), payment);
    }

    pub fn payment_count(&self) -> usize {
        self.read().payments.len()
    }
}

#[async_trait]
impl PaymentProvider for InMemoryPaymentProvider {
    async fn create_pix_payment(&self, request: &PixRequest) -> Result<ProviderPayment> {
        let mut state = self.write();
        if state.fail_on_create {
            return Err(FulfillmentError::UpstreamPayment(
                "payment creation failed".to_string(),
            ));
        }

        state.next_id += 1;
        let id = format!("{}", 1_000_000 + state.next_id);
        let payment = ProviderPayment {
            id: id.clone(),
            status: ProviderStatus::Pending,
            raw_status: "pending".to_string(),
            external_reference: Some(request.order_id.to_string()),
            expires_at: Some(request.expires_at),
            qr_code: Some(format!("PIX-{id}")),
            qr_code_base64: None,
            ticket_url: None,
        };
        state.payments.insert(id, payment.clone());
        Ok(payment)
    }

    async fn get_payment(&self, payment_id: &str) -> Result<ProviderPayment> {
        let state = self.read();
        if state.fail_on_get {
            return Err(FulfillmentError::UpstreamPayment(
                "payment lookup failed".to_string(),
            ));
        }
        state.payments.get(payment_id).cloned().ok_or_else(|| {
            FulfillmentError::UpstreamPayment(format!("unknown payment {payment_id}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pix_request() -> PixRequest {
        PixRequest {
            order_id: OrderId::new(),
            amount: Money::from_cents(1990),
            description: "Gift Card".to_string(),
            payer_email: "ana@example.com".to_string(),
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ProviderStatus::from_provider("approved"), ProviderStatus::Approved);
        assert_eq!(ProviderStatus::from_provider("paid"), ProviderStatus::Approved);
        assert_eq!(ProviderStatus::from_provider("in_process"), ProviderStatus::Pending);
        assert_eq!(ProviderStatus::from_provider("authorized"), ProviderStatus::Pending);
        assert_eq!(ProviderStatus::from_provider("charged_back"), ProviderStatus::Failed);
        assert_eq!(ProviderStatus::from_provider("something_new"), ProviderStatus::Pending);
    }

    #[test]
    fn test_mercado_pago_response_parsing() {
        let order_id = OrderId::new();
        let json = format!(
            r#"{{
                "id": 1319812345,
                "status": "pending",
                "external_reference": "{order_id}",
                "date_of_expiration": "2026-01-01T12:30:00.000-03:00",
                "point_of_interaction": {{
                    "transaction_data": {{
                        "qr_code": "000201...",
                        "qr_code_base64": "iVBOR...",
                        "ticket_url": "https://example.com/ticket"
                    }}
                }}
            }}"#
        );
        let payment: ProviderPayment = serde_json::from_str::<MpPayment>(&json).unwrap().into();

        assert_eq!(payment.id, "1319812345");
        assert_eq!(payment.status, ProviderStatus::Pending);
        assert_eq!(payment.order_id(), Some(order_id));
        assert_eq!(payment.qr_code.as_deref(), Some("000201..."));
        assert_eq!(
            payment.expires_at.unwrap().to_rfc3339(),
            "2026-01-01T15:30:00+00:00"
        );
    }

    #[test]
    fn test_minimal_response_parsing() {
        let payment: ProviderPayment =
            serde_json::from_str::<MpPayment>(r#"{"id": "42", "status": "approved"}"#)
                .unwrap()
                .into();
        assert_eq!(payment.status, ProviderStatus::Approved);
        assert_eq!(payment.order_id(), None);
        assert_eq!(payment.expires_at, None);
    }

    #[tokio::test]
    async fn test_in_memory_create_and_approve() {
        let provider = InMemoryPaymentProvider::new();
        let request = pix_request();

        let created = provider.create_pix_payment(&request).await.unwrap();
        assert_eq!(created.status, ProviderStatus::Pending);
        assert_eq!(created.order_id(), Some(request.order_id));

        assert!(provider.approve(&created.id));
        let fetched = provider.get_payment(&created.id).await.unwrap();
        assert_eq!(fetched.status, ProviderStatus::Approved);
        assert_eq!(fetched.raw_status, "approved");
        assert_eq!(provider.payment_count(), 1);
    }

    #[test]
    fn test_payment_url_keeps_id_in_one_segment() {
        let client = MercadoPagoClient::new("TEST-token", "https://api.example.com/").unwrap();
        assert_eq!(
            client.payment_url("123456").unwrap().as_str(),
            "https://api.example.com/v1/payments/123456"
        );

        let nested = MercadoPagoClient::new("TEST-token", "http://localhost:9000/mp").unwrap();
        assert_eq!(
            nested.payment_url("42").unwrap().as_str(),
            "http://localhost:9000/mp/v1/payments/42"
        );

        let err = client.payment_url("../../users/me").unwrap_err();
        assert!(matches!(err, FulfillmentError::Validation(_)));
    }

    #[tokio::test]
    async fn test_in_memory_failures() {
        let provider = InMemoryPaymentProvider::new();
        provider.set_fail_on_create(true);
        let result = provider.create_pix_payment(&pix_request()).await;
        assert!(matches!(result, Err(FulfillmentError::UpstreamPayment(_))));
        assert_eq!(provider.payment_count(), 0);

        let unknown = provider.get_payment("missing").await;
        assert!(matches!(unknown, Err(FulfillmentError::UpstreamPayment(_))));
    }
}
