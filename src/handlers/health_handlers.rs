// 健康检查API处理器
// 报告服务版本和存储连接状态

use actix_web::{http::StatusCode, web, HttpResponse, Result as ActixResult};
use serde::Serialize;
use crate::state::AppState;

/// 系统健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 版本信息
    pub version: String,
    /// 存储连接状态
    pub store: String,
    /// 当前时间戳
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// 基础健康检查
///
/// GET /health
///
/// 无需认证
/// 响应: HealthResponse
pub async fn health_check(
    data: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let mut health = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: "connected".to_string(),
        timestamp: chrono::Utc::now(),
    };

    if let Err(e) = data.store.ping().await {
        log::error!("Store health check failed: {}", e);
        health.store = "disconnected".to_string();
        health.status = "unhealthy".to_string();
    }

    let status_code = if health.status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    Ok(HttpResponse::build(status_code).json(health))
}
