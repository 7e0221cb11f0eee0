use crate::domain::metric::MetricValue;
use crate::domain::ports::{MetricWriter, SampleSource};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const POLL_COUNT: &str = "PollCount";
pub const RANDOM_VALUE: &str = "RandomValue";

/// Poll task: records one round of readings into the agent's store.
pub struct Sampler<S: SampleSource> {
    source: S,
    store: Arc<dyn MetricWriter>,
    interval: Duration,
}

impl<S: SampleSource> Sampler<S> {
    pub fn new(source: S, store: Arc<dyn MetricWriter>, interval: Duration) -> Self {
        Self {
            source,
            store,
            interval,
        }
    }

    /// Take one round of readings. Every reading becomes a gauge, plus a
    /// random gauge and a `PollCount` increment.
    pub fn poll_once(&mut self) {
        let readings = self.source.sample();
        let count = readings.len();
        for (id, value) in readings {
            if let Err(e) = self.store.apply(&id, MetricValue::Gauge(value)) {
                warn!("Sampler: dropping reading {}: {}", id, e);
            }
        }

        let random: f64 = rand::rng().random();
        if let Err(e) = self.store.apply(RANDOM_VALUE, MetricValue::Gauge(random)) {
            warn!("Sampler: {}", e);
        }
        if let Err(e) = self.store.apply(POLL_COUNT, MetricValue::Counter(1)) {
            warn!("Sampler: {}", e);
        }
        debug!("Sampler: recorded {} readings", count);
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Sampler: polling every {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Sampler: stopped");
                    return;
                }
                _ = ticker.tick() => self.poll_once(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::store::MetricStore;

    struct FixedSource(Vec<(String, f64)>);

    impl SampleSource for FixedSource {
        fn sample(&mut self) -> Vec<(String, f64)> {
            self.0.clone()
        }
    }

    #[test]
    fn test_poll_records_readings_and_counts() {
        let store = Arc::new(MetricStore::new());
        let mut sampler = Sampler::new(
            FixedSource(vec![("Alloc".to_string(), 100.0)]),
            store.clone(),
            Duration::from_secs(1),
        );

        sampler.poll_once();
        sampler.poll_once();
        sampler.poll_once();

        assert_eq!(store.get("Alloc"), Some(MetricValue::Gauge(100.0)));
        assert_eq!(store.get(POLL_COUNT), Some(MetricValue::Counter(3)));
        match store.get(RANDOM_VALUE) {
            Some(MetricValue::Gauge(v)) => assert!((0.0..1.0).contains(&v)),
            other => panic!("unexpected RandomValue {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_polls_until_cancelled() {
        let store = Arc::new(MetricStore::new());
        let sampler = Sampler::new(FixedSource(vec![]), store.clone(), Duration::from_millis(10));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(sampler.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(45)).await;
        cancel.cancel();
        task.await.unwrap();

        match store.get(POLL_COUNT) {
            Some(MetricValue::Counter(n)) => assert!(n >= 2),
            other => panic!("unexpected PollCount {:?}", other),
        }
    }
}
