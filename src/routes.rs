// API路由配置
// 定义所有HTTP接口的路由规则

use actix_web::{dev::HttpServiceFactory, error::InternalError, web, HttpResponse, Scope};
use crate::handlers::*;
use crate::middleware::BearerAuth;
use crate::models::ApiResponse;

/// 注册全部路由
///
/// `/api/v1` 下的接口统一经过Bearer令牌认证中间件，公开接口由中间件放行。
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/health", web::get().to(health_check))
        .service(api_v1_routes());
}

/// API v1路由配置
pub fn api_v1_routes() -> impl HttpServiceFactory {
    web::scope("/api/v1")
        .wrap(BearerAuth)
        // 令牌路由
        .service(auth_routes())
        // 支付路由
        .service(payment_routes())
}

/// 令牌路由
fn auth_routes() -> Scope {
    web::scope("/auth")
        .route("/token", web::post().to(issue_token))
        .route("/verify", web::post().to(verify_token))
        .route("/renew", web::post().to(renew_token))
        .route("/revoke", web::post().to(revoke_token))
}

/// 支付路由
fn payment_routes() -> Scope {
    web::scope("/payments")
        .route("", web::post().to(create_payment))
        .route("/callback", web::post().to(payment_callback))
        .route("/{payment_id}", web::get().to(get_payment))
}

/// JSON请求体解析失败时返回统一格式的400响应
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(64 * 1024)
        .error_handler(|err, _req| {
            let response = HttpResponse::BadRequest()
                .json(ApiResponse::<()>::error(400, format!("Invalid request body: {}", err)));
            InternalError::from_response(err, response).into()
        })
}
