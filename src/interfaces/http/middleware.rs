use crate::infrastructure::transport::REAL_IP_HEADER;
use crate::infrastructure::transport::codec::compress;
use crate::interfaces::http::AppState;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::IpAddr;
use tracing::{debug, warn};

/// Refuse requests whose `X-Real-IP` is absent or outside the trusted subnet.
pub async fn trusted_subnet(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(subnet) = state.trusted_subnet else {
        return next.run(request).await;
    };

    let claimed = request
        .headers()
        .get(REAL_IP_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok());

    match claimed {
        Some(ip) if subnet.contains(ip) => next.run(request).await,
        other => {
            warn!("Http: refusing request from {:?} outside {}", other, subnet);
            state.ingest.reject_request("subnet");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// Gzip response bodies for clients that accept it.
pub async fn gzip_response(request: Request, next: Next) -> Response {
    let accepts_gzip = request
        .headers()
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.split(',').any(|enc| enc.trim().starts_with("gzip")));

    let response = next.run(request).await;
    if !accepts_gzip || response.headers().contains_key(header::CONTENT_ENCODING) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Http: cannot buffer response body: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if bytes.is_empty() {
        return Response::from_parts(parts, Body::empty());
    }

    match compress(&bytes) {
        Ok(compressed) => {
            debug!("Http: gzip response {} -> {} bytes", bytes.len(), compressed.len());
            parts.headers.remove(header::CONTENT_LENGTH);
            parts
                .headers
                .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            Response::from_parts(parts, Body::from(compressed))
        }
        Err(e) => {
            warn!("Http: gzip failed, sending identity body: {}", e);
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}
