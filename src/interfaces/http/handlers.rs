use crate::domain::errors::{CodecError, IngestError};
use crate::domain::metric::WireMetric;
use crate::infrastructure::transport::codec::decompress;
use crate::interfaces::http::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use tracing::{debug, warn};

fn is_gzipped(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("gzip"))
}

fn protocol(e: impl Into<CodecError>) -> IngestError {
    IngestError::Protocol(e.into())
}

/// `GET /`
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let mut html = String::from("<html><head><title>Metrics</title></head><body><ul>\n");
    for metric in state.ingest.list() {
        html.push_str(&format!(
            "<li>{} ({}): {}</li>\n",
            escape(&metric.id),
            metric.kind(),
            metric.value
        ));
    }
    html.push_str("</ul></body></html>\n");
    Html(html)
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// `GET /value/{type}/{name}`
pub async fn value_path(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<String, IngestError> {
    let metric = state.ingest.read(&kind, &id)?;
    Ok(metric.value.to_string())
}

/// `POST /update/{type}/{name}/{value}`
pub async fn update_path(
    State(state): State<AppState>,
    Path((kind, id, raw)): Path<(String, String, String)>,
) -> Result<String, IngestError> {
    let stored = state.ingest.update_raw(&kind, &id, &raw).await?;
    Ok(stored.value.to_string())
}

/// `POST /update/`
pub async fn update_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WireMetric>, IngestError> {
    let json = state
        .codec
        .decode_body(&body, is_gzipped(&headers))
        .map_err(|e| {
            state.ingest.reject_request("protocol");
            IngestError::Protocol(e)
        })?;
    let wire: WireMetric = serde_json::from_slice(&json).map_err(|e| {
        state.ingest.reject_request("protocol");
        protocol(e)
    })?;
    let stored = state.ingest.ingest_one(wire).await?;
    Ok(Json(stored))
}

/// `POST /updates/`
pub async fn updates(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Vec<WireMetric>>, IngestError> {
    let batch = state
        .codec
        .decode_batch(&body, is_gzipped(&headers))
        .map_err(|e| {
            state.ingest.reject_request("protocol");
            IngestError::Protocol(e)
        })?;
    debug!("Http: batch of {} metric(s)", batch.len());
    let applied = state.ingest.ingest_batch(batch).await?;
    Ok(Json(applied.iter().map(WireMetric::from).collect()))
}

/// `POST /value/`. Read requests are never encrypted, only optionally gzipped.
pub async fn value_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WireMetric>, IngestError> {
    let json = if is_gzipped(&headers) {
        decompress(&body).map_err(IngestError::Protocol)?
    } else {
        body.to_vec()
    };
    let query: WireMetric = serde_json::from_slice(&json).map_err(protocol)?;
    Ok(Json(state.ingest.read_signed(&query)?))
}

/// `GET /ping`: 200 only when the database is connected and answering.
pub async fn ping(State(state): State<AppState>) -> Response {
    let Some(slot) = &state.database else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "database not configured").into_response();
    };
    let Some(db) = slot.get() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "database not connected").into_response();
    };
    match db.ping().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            warn!("Http: ping failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
