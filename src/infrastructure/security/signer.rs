use crate::domain::errors::AuthError;
use crate::domain::metric::{Metric, WireMetric};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Text the MAC is computed over: `<id>:<kind>:<value>`.
pub fn canonical_form(metric: &Metric) -> String {
    format!("{}:{}:{}", metric.id, metric.kind(), metric.value)
}

fn keyed_mac(metric: &Metric, secret: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(canonical_form(metric).as_bytes());
    mac
}

/// HMAC-SHA256 of the canonical form, lower-case hex.
pub fn compute_mac(metric: &Metric, secret: &[u8]) -> String {
    hex::encode(keyed_mac(metric, secret).finalize().into_bytes())
}

/// Check the `hash` carried by a wire metric. False when the hash is absent,
/// not hex, or the metric has no usable value.
pub fn verify_mac(wire: &WireMetric, secret: &[u8]) -> bool {
    let Some(hash) = wire.hash.as_deref() else {
        return false;
    };
    let Ok(expected) = hex::decode(hash) else {
        return false;
    };
    let Ok(metric) = wire.to_metric() else {
        return false;
    };
    keyed_mac(&metric, secret).verify_slice(&expected).is_ok()
}

/// Shared-secret signing for both ends of the pipeline.
///
/// An empty or absent key disables signing and verification.
#[derive(Clone, Default)]
pub struct Authenticator {
    secret: Option<Vec<u8>>,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl Authenticator {
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            secret: secret
                .filter(|s| !s.is_empty())
                .map(|s| s.as_bytes().to_vec()),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Wire form of `metric`, with a hash when a key is configured.
    pub fn sign(&self, metric: &Metric) -> WireMetric {
        let mut wire = WireMetric::from(metric);
        if let Some(secret) = &self.secret {
            wire.hash = Some(compute_mac(metric, secret));
        }
        wire
    }

    pub fn verify(&self, wire: &WireMetric) -> Result<(), AuthError> {
        let Some(secret) = &self.secret else {
            return Ok(());
        };
        if wire.hash.as_deref().is_none_or(str::is_empty) {
            return Err(AuthError::MissingHash {
                id: wire.id.clone(),
            });
        }
        if verify_mac(wire, secret) {
            Ok(())
        } else {
            Err(AuthError::Mismatch {
                id: wire.id.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"secret";

    #[test]
    fn test_canonical_form() {
        assert_eq!(canonical_form(&Metric::counter("PollCount", 5)), "PollCount:counter:5");
        assert_eq!(canonical_form(&Metric::gauge("Alloc", 1.5)), "Alloc:gauge:1.5");
    }

    #[test]
    fn test_mac_is_deterministic_hex() {
        let metric = Metric::gauge("Alloc", 100.0);
        let a = compute_mac(&metric, KEY);
        assert_eq!(a, compute_mac(&metric, KEY));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_verify_detects_tampering() {
        let auth = Authenticator::new(Some("secret"));
        let signed = auth.sign(&Metric::counter("PollCount", 3));
        assert!(verify_mac(&signed, KEY));
        assert!(!verify_mac(&signed, b"other"));

        let mut changed_value = signed.clone();
        changed_value.delta = Some(4);
        assert!(!verify_mac(&changed_value, KEY));

        let mut changed_id = signed.clone();
        changed_id.id = "PollCount2".into();
        assert!(!verify_mac(&changed_id, KEY));

        let mut changed_kind = signed.clone();
        changed_kind.kind = "gauge".into();
        changed_kind.value = Some(3.0);
        assert!(!verify_mac(&changed_kind, KEY));

        let mut garbage = signed;
        garbage.hash = Some("zz".into());
        assert!(!verify_mac(&garbage, KEY));
    }

    #[test]
    fn test_disabled_authenticator() {
        let auth = Authenticator::new(Some(""));
        assert!(!auth.is_enabled());
        let wire = auth.sign(&Metric::gauge("Alloc", 1.0));
        assert!(wire.hash.is_none());
        assert!(auth.verify(&wire).is_ok());
    }

    #[test]
    fn test_enabled_authenticator_requires_hash() {
        let auth = Authenticator::new(Some("secret"));
        let unsigned = Authenticator::disabled().sign(&Metric::gauge("Alloc", 1.0));
        assert!(matches!(auth.verify(&unsigned), Err(AuthError::MissingHash { .. })));

        let foreign = Authenticator::new(Some("other")).sign(&Metric::gauge("Alloc", 1.0));
        assert!(matches!(auth.verify(&foreign), Err(AuthError::Mismatch { .. })));

        assert!(auth.verify(&auth.sign(&Metric::gauge("Alloc", 1.0))).is_ok());
    }
}
