use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Product not found: {0}")]
    ProductNotFound(i64),

    #[error("Insufficient stock for {product_name}: requested {requested}, available {available}")]
    OutOfStock {
        product_name: String,
        requested: i32,
        available: i32,
    },

    #[error("Order not found: {0}")]
    OrderNotFound(i64),

    #[error("Invalid order status: {0}")]
    InvalidStatus(String),

    #[error("Order number collision")]
    DuplicateOrderNumber,

    #[error("Order is already cancelled")]
    AlreadyCancelled,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Auth error: {0}")]
    AuthError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;

        let (status_code, error_code, message) = match self {
            AppError::InvalidOrder(msg) => {
                log::warn!("Invalid order: {msg}");
                (StatusCode::BAD_REQUEST, "INVALID_ORDER", msg.clone())
            }
            AppError::ProductNotFound(id) => (
                StatusCode::NOT_FOUND,
                "PRODUCT_NOT_FOUND",
                format!("Product {id} not found"),
            ),
            AppError::OutOfStock {
                product_name,
                requested,
                available,
            } => {
                log::warn!(
                    "Out of stock: {product_name} requested={requested} available={available}"
                );
                // 带上数量细节, 前端可以渲染精确的缺货提示
                return HttpResponse::Conflict().json(json!({
                    "success": false,
                    "error": {
                        "code": "OUT_OF_STOCK",
                        "message": self.to_string(),
                        "details": {
                            "product_name": product_name,
                            "requested": requested,
                            "available": available,
                        }
                    }
                }));
            }
            AppError::OrderNotFound(id) => (
                StatusCode::NOT_FOUND,
                "ORDER_NOT_FOUND",
                format!("Order {id} not found"),
            ),
            AppError::InvalidStatus(msg) => {
                log::warn!("Invalid status: {msg}");
                (StatusCode::BAD_REQUEST, "INVALID_STATUS", msg.clone())
            }
            AppError::DuplicateOrderNumber => (
                StatusCode::CONFLICT,
                "DUPLICATE_ORDER_NUMBER",
                "Order number collision, please retry".to_string(),
            ),
            AppError::AlreadyCancelled => (
                StatusCode::CONFLICT,
                "ALREADY_CANCELLED",
                "Order is already cancelled".to_string(),
            ),
            AppError::ValidationError(msg) => {
                log::warn!("Validation error: {msg}");
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::AuthError(msg) => {
                log::warn!("Authentication error: {msg}");
                (StatusCode::UNAUTHORIZED, "AUTH_ERROR", msg.clone())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::PermissionDenied => {
                log::warn!("Permission denied");
                (
                    StatusCode::FORBIDDEN,
                    "FORBIDDEN",
                    "Permission denied".to_string(),
                )
            }
            AppError::DatabaseError(err) => {
                log::error!("Database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error".to_string(),
                )
            }
            AppError::JwtError(err) => {
                log::warn!("JWT error: {err}");
                (
                    StatusCode::UNAUTHORIZED,
                    "AUTH_ERROR",
                    "Invalid token".to_string(),
                )
            }
            _ => {
                log::error!("Internal error: {self}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        HttpResponse::build(status_code).json(json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": message
            }
        }))
    }
}
