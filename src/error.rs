// 错误类型定义
// 认证、支付、存储三类错误，以及到HTTP响应的映射

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;
use crate::models::ApiResponse;

/// 存储层错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 数据库访问失败
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// 唯一约束冲突 (例如支付单号重复)
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    /// 并发更新时状态已被修改
    #[error("row changed concurrently: {0}")]
    StaleRow(String),
    /// 写入违反业务约束 (例如同一订单已有待支付记录)
    #[error("business rule violated: {0}")]
    Rejected(String),
}

/// 认证错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing or malformed bearer credential")]
    MissingCredential,
    #[error("invalid credential")]
    InvalidCredential,
    #[error("credential expired")]
    Expired,
    #[error("credential revoked")]
    Revoked,
    #[error("revocation store unavailable: {0}")]
    StoreUnavailable(String),
    /// 令牌签发失败
    #[error("failed to sign credential: {0}")]
    Signing(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::StoreUnavailable(err.to_string())
    }
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let code = self.status_code();
        HttpResponse::build(code).json(ApiResponse::<()>::error(code.as_u16() as i32, self.to_string()))
    }
}

/// 支付账本错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("order not found")]
    OrderNotFound,
    #[error("payment not found")]
    PaymentNotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// 订单已超过支付截止时间
    #[error("order expired")]
    Expired,
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<StoreError> for PaymentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::StaleRow(what) | StoreError::Rejected(what) => PaymentError::InvalidState(what),
            other => PaymentError::StoreUnavailable(other.to_string()),
        }
    }
}

impl ResponseError for PaymentError {
    fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::OrderNotFound | PaymentError::PaymentNotFound => StatusCode::NOT_FOUND,
            PaymentError::Forbidden => StatusCode::FORBIDDEN,
            PaymentError::InvalidState(_) => StatusCode::CONFLICT,
            PaymentError::Expired => StatusCode::GONE,
            PaymentError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let code = self.status_code();
        HttpResponse::build(code).json(ApiResponse::<()>::error(code.as_u16() as i32, self.to_string()))
    }
}
