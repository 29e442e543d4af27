// CORS中间件配置
// 允许前端应用携带Bearer令牌访问API，并暴露续期提示头

use actix_cors::Cors;
use actix_web::http::header;
use super::TOKEN_RENEWAL_HEADER;

/// 创建CORS中间件
///
/// # Arguments
/// * `allowed_origins` - 允许的源列表，为空时只放行本地开发地址
///
/// # Returns
/// * 配置好的CORS中间件
pub fn create_cors(allowed_origins: &[String]) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::ACCEPT,
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-callback-signature"),
            header::HeaderName::from_static("x-issuer-signature"),
        ])
        .expose_headers(vec![header::HeaderName::from_static(TOKEN_RENEWAL_HEADER)])
        .max_age(3600);

    if allowed_origins.is_empty() {
        return cors.allowed_origin_fn(|origin, _req_head| is_local_origin(origin.as_bytes()));
    }

    for origin in allowed_origins {
        cors = cors.allowed_origin(origin);
    }
    cors
}

fn is_local_origin(origin: &[u8]) -> bool {
    origin.starts_with(b"http://localhost") ||
    origin.starts_with(b"https://localhost") ||
    origin.starts_with(b"http://127.0.0.1") ||
    origin.starts_with(b"https://127.0.0.1")
}
