use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use race_analysis::{AnalysisError, SessionKey, ThresholdOverrides};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub race: String,
    pub session: String,
    #[serde(default)]
    pub overrides: ThresholdOverrides,
}

#[derive(Debug, Deserialize)]
pub struct SessionRef {
    pub race: String,
    pub session: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct InvalidateOut {
    pub evicted: bool,
}

/// Trimmed, non-empty session key from request fields.
pub fn session_key(race: &str, session: &str) -> Result<SessionKey, ApiError> {
    let (race, session) = (race.trim(), session.trim());
    if race.is_empty() || session.is_empty() {
        return Err(ApiError::BadRequest("race and session must not be empty".into()));
    }
    Ok(SessionKey::new(race, session))
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("{0}")]
    BadRequest(String),
    #[error("analysis task failed: {0}")]
    Task(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Analysis(AnalysisError::DataNotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Analysis(AnalysisError::Schema(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Analysis(AnalysisError::ThresholdConfig(_)) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Analysis(_) | ApiError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
