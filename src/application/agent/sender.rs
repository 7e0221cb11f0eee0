use crate::domain::errors::{CodecError, DeliveryError};
use crate::domain::metric::WireMetric;
use crate::domain::ports::MetricTransport;
use crate::domain::store::MetricStore;
use crate::infrastructure::security::Authenticator;
use crate::infrastructure::transport::Codec;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Outcome of one report attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Sent(usize),
    Empty,
}

/// Report task: sign, encode and deliver the store's contents.
///
/// Counters in the agent store hold the delta not yet acknowledged by the
/// collector. A successful send subtracts what was sent; a failed one leaves
/// the store untouched for the next tick.
pub struct Sender {
    store: Arc<MetricStore>,
    authenticator: Authenticator,
    codec: Codec,
    transport: Arc<dyn MetricTransport>,
    interval: Duration,
}

impl Sender {
    pub fn new(
        store: Arc<MetricStore>,
        authenticator: Authenticator,
        codec: Codec,
        transport: Arc<dyn MetricTransport>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            authenticator,
            codec,
            transport,
            interval,
        }
    }

    pub async fn report_once(&self) -> Result<ReportOutcome, ReportError> {
        let snapshot = self.store.snapshot();
        if snapshot.is_empty() {
            return Ok(ReportOutcome::Empty);
        }

        let batch: Vec<WireMetric> = snapshot.iter().map(|m| self.authenticator.sign(m)).collect();
        let body = self.codec.encode_batch(&batch)?;
        self.transport.deliver(body).await?;

        self.store.settle(&snapshot);
        Ok(ReportOutcome::Sent(snapshot.len()))
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!("Sender: reporting every {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Sender: stopped");
                    return;
                }
                _ = ticker.tick() => {
                    // A send in flight is abandoned on shutdown
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!("Sender: stopped during report");
                            return;
                        }
                        outcome = self.report_once() => match outcome {
                            Ok(ReportOutcome::Sent(n)) => debug!("Sender: delivered {} metric(s)", n),
                            Ok(ReportOutcome::Empty) => debug!("Sender: nothing to report"),
                            Err(e) => warn!("Sender: report failed, retrying next tick: {}", e),
                        },
                    }
                }
            }
        }
    }
}
