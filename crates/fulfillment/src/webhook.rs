//! Payment webhook payloads.

use serde::{Deserialize, Serialize};

/// An identifier the provider sends either as a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderId {
    Number(u64),
    Text(String),
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderId::Number(n) => write!(f, "{n}"),
            ProviderId::Text(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookData {
    pub id: ProviderId,
}

/// A webhook delivery.
///
/// Two shapes arrive: `{"type": "payment", "data": {"id": ..}}` and
/// `{"action": "payment.updated", "data": {"id": ..}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookNotification {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<WebhookData>,
}

impl WebhookNotification {
    /// A `type: payment` notification for the given payment.
    pub fn payment(payment_id: impl Into<String>) -> Self {
        Self {
            topic: Some("payment".to_string()),
            action: None,
            data: Some(WebhookData {
                id: ProviderId::Text(payment_id.into()),
            }),
        }
    }

    /// Returns true when the notification concerns a payment.
    pub fn is_payment(&self) -> bool {
        self.topic.as_deref() == Some("payment")
            || self
                .action
                .as_deref()
                .is_some_and(|action| action.starts_with("payment."))
    }

    /// The payment id, for payment notifications that carry one.
    pub fn payment_id(&self) -> Option<String> {
        if !self.is_payment() {
            return None;
        }
        self.data
            .as_ref()
            .map(|data| data.id.to_string())
            .filter(|id| is_valid_payment_id(id))
    }
}

/// Provider payment ids are short tokens of ASCII letters, digits, `-` and `_`.
///
/// Anything else is refused before it reaches an authenticated provider call.
pub fn is_valid_payment_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
