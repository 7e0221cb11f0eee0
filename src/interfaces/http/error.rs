use crate::domain::errors::IngestError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, self.to_string()).into_response()
    }
}
