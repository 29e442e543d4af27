// 认证工具函数
// 提供Bearer令牌提取、请求体签名验证等功能

use actix_web::HttpRequest;
use actix_web::http::header::AUTHORIZATION;
use crate::error::AuthError;

/// 支付渠道回调签名头
pub const CALLBACK_SIGNATURE_HEADER: &str = "X-Callback-Signature";

/// 上游登录流程签发令牌时的签名头
pub const ISSUER_SIGNATURE_HEADER: &str = "X-Issuer-Signature";

/// 解析 `Authorization` 头部的值
///
/// 必须恰好是以第一个空格分隔的两段 `"Bearer <token>"`，方案名区分大小写，令牌不能为空。
///
/// # Arguments
/// * `header` - 头部原始值
///
/// # Returns
/// * 令牌字符串
pub fn parse_bearer(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingCredential)?;
    match header.split_once(' ') {
        Some(("Bearer", token)) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::MissingCredential),
    }
}

/// 从HTTP请求中提取Bearer令牌
pub fn extract_bearer_token(req: &HttpRequest) -> Result<String, AuthError> {
    let header = match req.headers().get(AUTHORIZATION) {
        Some(value) => Some(value.to_str().map_err(|_| AuthError::MissingCredential)?),
        None => None,
    };
    parse_bearer(header).map(str::to_string)
}

/// 验证请求体的HMAC-SHA256签名
///
/// 未配置密钥时一律拒绝；签名缺失或错误都视为无效凭证。
///
/// # Arguments
/// * `body` - 原始请求体
/// * `signature` - 请求头中的签名
/// * `secret` - 共享密钥
pub fn verify_body_signature(
    body: &[u8],
    signature: Option<&str>,
    secret: Option<&str>,
) -> Result<(), AuthError> {
    let secret = secret.ok_or(AuthError::InvalidCredential)?;
    let signature = signature.ok_or(AuthError::InvalidCredential)?;
    match crate::utils::crypto::verify_hmac_signature(body, signature, secret) {
        Ok(true) => Ok(()),
        _ => Err(AuthError::InvalidCredential),
    }
}
