mod common;

use async_trait::async_trait;
use common::*;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use rustmetrics::application::agent::{ReportOutcome, Sampler, Sender};
use rustmetrics::application::system::{AgentApplication, ServerApplication};
use rustmetrics::config::{AgentConfig, ServerConfig};
use rustmetrics::domain::errors::DeliveryError;
use rustmetrics::domain::metric::{Metric, MetricValue};
use rustmetrics::domain::ports::MetricTransport;
use rustmetrics::domain::store::MetricStore;
use rustmetrics::infrastructure::security::{Authenticator, PayloadDecryptor, PayloadEncryptor};
use rustmetrics::infrastructure::transport::{Codec, HttpTransport};
use rustmetrics::interfaces::http::router;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn agent_config(key: Option<&str>) -> AgentConfig {
    AgentConfig {
        key: key.map(str::to_string),
        poll_interval: Duration::from_millis(20),
        report_interval: Duration::from_millis(50),
        ..AgentConfig::default()
    }
}

#[tokio::test]
async fn test_unsigned_gauge_reaches_collector() {
    let server = build_server(memory_config()).await;
    let transport = Arc::new(RouterTransport {
        app: router(server.state.clone()),
    });

    let store = Arc::new(MetricStore::new());
    let mut sampler = Sampler::new(
        FixedSource(vec![("Alloc".to_string(), 100.0)]),
        store.clone(),
        Duration::from_secs(1),
    );
    sampler.poll_once();

    let sender = Sender::new(
        store.clone(),
        Authenticator::disabled(),
        Codec::plain(),
        transport,
        Duration::from_secs(1),
    );
    let outcome = sender.report_once().await.unwrap();

    assert_eq!(outcome, ReportOutcome::Sent(3));
    assert_eq!(server.store.get("Alloc"), Some(MetricValue::Gauge(100.0)));
    assert_eq!(server.store.get("PollCount"), Some(MetricValue::Counter(1)));
    // Sent counters are settled on the agent side
    assert_eq!(store.get("PollCount"), Some(MetricValue::Counter(0)));
}

#[tokio::test]
async fn test_poll_count_not_double_counted_across_reports() {
    let server = build_server(memory_config()).await;
    let transport = Arc::new(RouterTransport {
        app: router(server.state.clone()),
    });
    let store = Arc::new(MetricStore::new());
    let mut sampler = Sampler::new(FixedSource(vec![]), store.clone(), Duration::from_secs(1));
    let sender = Sender::new(
        store,
        Authenticator::disabled(),
        Codec::plain(),
        transport,
        Duration::from_secs(1),
    );

    sampler.poll_once();
    sampler.poll_once();
    sender.report_once().await.unwrap();
    sampler.poll_once();
    sender.report_once().await.unwrap();

    assert_eq!(server.store.get("PollCount"), Some(MetricValue::Counter(3)));
}

/// Fails the first `failures` deliveries, then forwards to the router.
struct FlakyTransport {
    inner: RouterTransport,
    failures: AtomicUsize,
}

#[async_trait]
impl MetricTransport for FlakyTransport {
    async fn deliver(&self, body: Vec<u8>) -> Result<(), DeliveryError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DeliveryError::Transport("connection refused".into()));
        }
        self.inner.deliver(body).await
    }
}

#[tokio::test]
async fn test_failed_report_keeps_counters_for_next_attempt() {
    let server = build_server(memory_config()).await;
    let transport = Arc::new(FlakyTransport {
        inner: RouterTransport {
            app: router(server.state.clone()),
        },
        failures: AtomicUsize::new(1),
    });
    let store = Arc::new(MetricStore::new());
    store.apply("Hits", MetricValue::Counter(4)).unwrap();
    let sender = Sender::new(
        store.clone(),
        Authenticator::disabled(),
        Codec::plain(),
        transport,
        Duration::from_secs(1),
    );

    assert!(sender.report_once().await.is_err());
    assert_eq!(store.get("Hits"), Some(MetricValue::Counter(4)));
    assert!(server.store.is_empty());

    sender.report_once().await.unwrap();
    assert_eq!(server.store.get("Hits"), Some(MetricValue::Counter(4)));
    assert_eq!(store.get("Hits"), Some(MetricValue::Counter(0)));
}

#[tokio::test]
async fn test_encrypted_signed_batch_round_trip() {
    let mut rng = rsa::rand_core::OsRng;
    let private = RsaPrivateKey::new(&mut rng, 1024).unwrap();
    let public = RsaPublicKey::from(&private);

    let dir = tempfile::tempdir().unwrap();
    let private_path = dir.path().join("private.pem");
    let public_path = dir.path().join("public.pem");
    std::fs::write(&private_path, private.to_pkcs8_pem(LineEnding::LF).unwrap().as_bytes()).unwrap();
    std::fs::write(&public_path, public.to_public_key_pem(LineEnding::LF).unwrap()).unwrap();

    let server = build_server(ServerConfig {
        key: Some("k".into()),
        crypto_key: Some(private_path),
        ..memory_config()
    })
    .await;
    let transport = Arc::new(RouterTransport {
        app: router(server.state.clone()),
    });

    // Enough metrics that the compressed body spans several RSA blocks
    let store = Arc::new(MetricStore::new());
    let mut expected = Vec::new();
    for i in 0..200 {
        let metric = Metric::gauge(format!("Gauge{i:03}"), i as f64 * 1.25 + 0.333);
        store.apply(&metric.id, metric.value).unwrap();
        expected.push(metric);
    }

    let encryptor = PayloadEncryptor::from_key_file(&public_path).unwrap();
    let codec = Codec::plain().with_encryptor(encryptor);
    let auth = Authenticator::new(Some("k"));
    let signed: Vec<_> = store.snapshot().iter().map(|m| auth.sign(m)).collect();
    let body = codec.encode_batch(&signed).unwrap();
    let block = PayloadDecryptor::new(private).block_size();
    assert_eq!(body.len() % block, 0);
    assert!(body.len() > block);

    let sender = Sender::new(
        store,
        auth,
        codec,
        transport,
        Duration::from_secs(1),
    );
    assert_eq!(sender.report_once().await.unwrap(), ReportOutcome::Sent(200));
    assert_eq!(server.store.snapshot(), expected);
}

#[tokio::test]
async fn test_unencrypted_body_rejected_by_decrypting_collector() {
    let mut rng = rsa::rand_core::OsRng;
    let private = RsaPrivateKey::new(&mut rng, 1024).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let private_path = dir.path().join("private.pem");
    std::fs::write(&private_path, private.to_pkcs8_pem(LineEnding::LF).unwrap().as_bytes()).unwrap();

    let server = build_server(ServerConfig {
        crypto_key: Some(private_path),
        ..memory_config()
    })
    .await;
    let transport = RouterTransport {
        app: router(server.state.clone()),
    };

    let body = Codec::plain()
        .encode_batch(&[Authenticator::disabled().sign(&Metric::gauge("Alloc", 1.0))])
        .unwrap();
    let err = transport.deliver(body).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Status(400)));
    assert!(server.store.is_empty());
}

#[tokio::test]
async fn test_agent_application_reports_over_live_socket() {
    let server = ServerApplication::build(ServerConfig {
        address: "127.0.0.1:0".into(),
        ..memory_config()
    })
    .await
    .unwrap();
    let collector = server.store.clone();
    let running_server = server.start().await.unwrap();

    let config = AgentConfig {
        address: running_server.local_addr.to_string(),
        ..agent_config(None)
    };
    let transport = HttpTransport::new(&config.address, 0, Duration::from_secs(5)).unwrap();
    let agent = AgentApplication::build_with_transport(config, Arc::new(transport)).unwrap();
    let running_agent = agent.start_with_source(FixedSource(vec![("Alloc".into(), 12.5)]));

    let mut delivered = false;
    for _ in 0..100 {
        if collector.get("Alloc").is_some() {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    running_agent.shutdown().await;
    running_server.shutdown().await;

    assert!(delivered, "agent never reached the collector");
    assert_eq!(collector.get("Alloc"), Some(MetricValue::Gauge(12.5)));
    assert!(matches!(collector.get("PollCount"), Some(MetricValue::Counter(n)) if n >= 1));
}
