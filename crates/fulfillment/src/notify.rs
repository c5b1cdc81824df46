//! Order notifications sent after fulfillment.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::{OrderId, UserId};
use domain::{Money, Order};
use serde::Serialize;
use thiserror::Error;

/// A notification delivery failed. Never affects the fulfillment outcome.
#[derive(Debug, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryLine {
    pub name: String,
    pub quantity: u32,
    pub delivered: u32,
}

/// What gets reported about a finished order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub customer: Option<String>,
    pub total: Money,
    pub needs_review: bool,
    pub lines: Vec<SummaryLine>,
}

impl OrderSummary {
    pub fn from_order(order: &Order, customer: Option<String>) -> Self {
        Self {
            order_id: order.id(),
            user_id: order.user_id(),
            customer,
            total: order.total(),
            needs_review: order.needs_review(),
            lines: order
                .lines()
                .iter()
                .map(|line| SummaryLine {
                    name: line.product_name.clone(),
                    quantity: line.quantity,
                    delivered: line.quantity - line.outstanding(),
                })
                .collect(),
        }
    }

    /// Plain-text rendering used as the message body.
    pub fn to_text(&self) -> String {
        let mut text = format!(
            "Order {} completed for {} ({})",
            self.order_id,
            self.customer.as_deref().unwrap_or("unknown customer"),
            self.total
        );
        for line in &self.lines {
            text.push_str(&format!(
                "\n- {} x{} (delivered {})",
                line.name, line.quantity, line.delivered
            ));
        }
        if self.needs_review {
            text.push_str("\nNeeds review: some lines were not delivered");
        }
        text
    }
}

/// Sink for order notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn order_completed(&self, summary: &OrderSummary) -> Result<(), NotifyError>;
}

/// Posts order summaries to a Discord webhook.
#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| NotifyError(e.to_string()))?;
        Ok(Self {
            http,
            webhook_url: webhook_url.into(),
        })
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn order_completed(&self, summary: &OrderSummary) -> Result<(), NotifyError> {
        self.http
            .post(&self.webhook_url)
            .json(&serde_json::json!({ "content": summary.to_text() }))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| NotifyError(e.to_string()))?;
        Ok(())
    }
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn order_completed(&self, _summary: &OrderSummary) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RecordingState {
    sent: Vec<OrderSummary>,
    fail: bool,
}

/// Keeps notifications in memory for tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    state: Arc<RwLock<RecordingState>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures every delivery to fail.
    pub fn set_fail(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail = fail;
    }

    pub fn sent(&self) -> Vec<OrderSummary> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
            .clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn order_completed(&self, summary: &OrderSummary) -> Result<(), NotifyError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail {
            return Err(NotifyError("sink unavailable".to_string()));
        }
        state.sent.push(summary.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::ProductId;
    use domain::OrderLine;

    fn summary() -> OrderSummary {
        let lines = vec![
            OrderLine::new(ProductId::new(), None, "Gift Card", 2, Money::from_cents(1000)),
            OrderLine::new(ProductId::new(), None, "Game Key", 1, Money::from_cents(4990)),
        ];
        let order = Order::new(UserId::new(), lines, Utc::now()).unwrap();
        OrderSummary::from_order(&order, Some("Ana".to_string()))
    }

    #[test]
    fn test_summary_text() {
        let text = summary().to_text();
        assert!(text.contains("completed for Ana (R$ 69.90)"));
        assert!(text.contains("- Gift Card x2 (delivered 0)"));
        assert!(!text.contains("Needs review"));
    }

    #[tokio::test]
    async fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        notifier.order_completed(&summary()).await.unwrap();
        assert_eq!(notifier.sent().len(), 1);

        notifier.set_fail(true);
        assert!(notifier.order_completed(&summary()).await.is_err());
        assert_eq!(notifier.sent().len(), 1);
    }
}
