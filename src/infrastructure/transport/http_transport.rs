use crate::domain::errors::DeliveryError;
use crate::domain::ports::MetricTransport;
use crate::infrastructure::core::HttpClientFactory;
use async_trait::async_trait;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest_middleware::ClientWithMiddleware;
use std::net::{IpAddr, UdpSocket};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const REAL_IP_HEADER: &str = "X-Real-IP";

/// Build the batch endpoint from a configured address. Bare `host:port`
/// values get an `http://` scheme.
pub fn updates_endpoint(address: &str) -> Result<Url, url::ParseError> {
    let base = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };
    Url::parse(&base)?.join("/updates/")
}

/// Local address the OS would use to reach `endpoint`. No packet is sent.
pub fn outbound_ip(endpoint: &Url) -> Option<IpAddr> {
    let host = endpoint.host_str()?;
    let port = endpoint.port_or_known_default()?;
    let bind = if host.contains(':') { "[::]:0" } else { "0.0.0.0:0" };
    let socket = UdpSocket::bind(bind).ok()?;
    socket.connect((host.trim_matches(['[', ']']), port)).ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

/// POSTs encoded batches to the collector's `/updates/` route.
pub struct HttpTransport {
    client: ClientWithMiddleware,
    endpoint: Url,
    real_ip: Option<IpAddr>,
}

impl HttpTransport {
    pub fn new(address: &str, max_retries: u32, timeout: Duration) -> Result<Self, url::ParseError> {
        let endpoint = updates_endpoint(address)?;
        let real_ip = outbound_ip(&endpoint);
        debug!("HttpTransport: endpoint {} (local ip {:?})", endpoint, real_ip);
        Ok(Self {
            client: HttpClientFactory::create_client(max_retries, timeout),
            endpoint,
            real_ip,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl MetricTransport for HttpTransport {
    async fn deliver(&self, body: Vec<u8>) -> Result<(), DeliveryError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip");
        if let Some(ip) = self.real_ip {
            request = request.header(REAL_IP_HEADER, ip.to_string());
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status(status.as_u16()))
        }
    }
}
