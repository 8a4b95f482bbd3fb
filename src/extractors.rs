use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;

use crate::response::AppError;

/// `axum::Json<T>` 的包装：反序列化失败时返回统一的 `AppError` 信封，
/// 而不是 axum 默认的纯文本拒绝
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(rejection_to_app_error(rejection)),
        }
    }
}

fn rejection_to_app_error(rejection: JsonRejection) -> AppError {
    match rejection {
        JsonRejection::MissingJsonContentType(e) => {
            tracing::warn!(error = %e, "Missing or invalid JSON Content-Type");
            AppError::bad_request("INVALID_REQUEST_BODY", "请求需要 application/json")
        }
        JsonRejection::BytesRejection(e) => {
            tracing::warn!(error = %e, "Failed to read request body bytes");
            AppError::bad_request("INVALID_REQUEST_BODY", "无法读取请求体")
        }
        other => {
            tracing::warn!(error = %other, "JSON body rejected");
            AppError::bad_request("INVALID_REQUEST_BODY", "请求体格式无效")
        }
    }
}
