//! Periodic expiry of unpaid orders.

use std::time::Duration;

use chrono::{DateTime, Utc};
use storage::Storage;
use tokio::sync::watch;

use crate::error::{FulfillmentError, Result};

/// Moves pending orders past their payment window to `Expired`.
#[derive(Clone)]
pub struct ExpirySweeper<S> {
    storage: S,
}

impl<S: Storage> ExpirySweeper<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Expires every pending order due at `now`. Returns how many expired.
    ///
    /// Each order is re-checked inside its own atomic transition, so an order
    /// paid between the scan and the update is left alone.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.storage.pending_expired_before(now).await?;
        let mut expired = 0;

        for order_id in due {
            match self.storage.modify(order_id, |order| order.expire(now)).await {
                Ok((true, _)) => {
                    expired += 1;
                    tracing::info!(%order_id, "order expired");
                }
                Ok((false, _)) => {}
                Err(err) => match FulfillmentError::from(err) {
                    FulfillmentError::NotFound { .. } => {
                        tracing::warn!(%order_id, "order vanished during sweep");
                    }
                    other => return Err(other),
                },
            }
        }

        if expired > 0 {
            metrics::counter!("orders_expired_total").increment(expired as u64);
        }
        Ok(expired)
    }

    /// Sweeps every `interval` until `shutdown` flips to true.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep(Utc::now()).await {
                        tracing::error!(error = %err, "expiry sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("expiry sweeper stopped");
                        return;
                    }
                }
            }
        }
    }
}
