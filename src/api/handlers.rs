use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Form, Json,
};
use tracing::error;

use super::types::*;
use crate::config::MetadataConfig;
use crate::model::PredictError;
use crate::server::AppState;

/// `POST /model/predict` — rank the catalog for one user.
pub async fn predict(
    State(state): State<AppState>,
    Form(req): Form<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    let user_id = req
        .user_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing required parameter: user_id".to_string()))?;

    let num_results = match req.num_results.as_deref() {
        None | Some("") => DEFAULT_NUM_RESULTS,
        Some(raw) => match raw.parse::<usize>() {
            Ok(n) if n >= 1 => n,
            // covers zero, negatives and non-numeric input
            _ => {
                return Err(ApiError::BadRequest(
                    "num_results must be a positive integer".to_string(),
                ))
            }
        },
    };

    let predictions = state.model.predict(&user_id, num_results)?;

    Ok(Json(PredictResponse {
        status: "ok".to_string(),
        predictions,
    }))
}

/// `GET /model/metadata` — static descriptive fields from configuration.
pub async fn metadata(State(state): State<AppState>) -> Json<MetadataConfig> {
    Json(state.config.metadata.clone())
}

pub async fn health() -> &'static str {
    "OK"
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl From<PredictError> for ApiError {
    fn from(err: PredictError) -> Self {
        match err {
            PredictError::UnknownUser => ApiError::BadRequest("Unknown user ID.".to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(message) => {
                error!("internal error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        let body = ErrorBody {
            status: "error".to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_internal_error_is_generic_500() {
        let response = ApiError::Internal("scoring blew up".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.status, "error");
        // the internal detail must not leak to the client
        assert_eq!(body.message, "Internal server error");
    }

    #[tokio::test]
    async fn test_bad_request_keeps_message() {
        let response = ApiError::BadRequest("Unknown user ID.".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.message, "Unknown user ID.");
    }
}
