use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fatigue_core::SessionError;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub trace_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn bad_request(code: &str, message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    pub fn conflict(code: &str, message: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::warn!(status = %self.status, code = %self.code, error = %self.message, "API error");

        (
            self.status,
            Json(ErrorBody {
                success: false,
                code: self.code,
                message: self.message,
                trace_id: None,
            }),
        )
            .into_response()
    }
}

// 会话状态机拒绝的操作都是调用顺序问题，统一映射为 409
impl From<SessionError> for AppError {
    fn from(value: SessionError) -> Self {
        AppError::conflict("SESSION_CONFLICT", &value.to_string())
    }
}

pub fn ok<T: Serialize>(data: T) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            data,
        }),
    )
}
