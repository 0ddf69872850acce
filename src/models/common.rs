use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 错误响应里的 error 字段, 见 AppError::error_response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}
