// 令牌API处理器
// 处理令牌签发、验证、续期和吊销的HTTP请求

use actix_web::{web, HttpRequest, HttpResponse, ResponseError, Result as ActixResult};
use crate::models::{
    ApiResponse, Identity, IssueTokenRequest, RenewTokenRequest, TokenResponse,
    VerifyTokenRequest, VerifyTokenResponse,
};
use crate::state::AppState;
use crate::utils::{extract_bearer_token, validate_username, verify_body_signature, ISSUER_SIGNATURE_HEADER};

/// 签发令牌
///
/// POST /api/v1/auth/token
///
/// 仅供上游登录流程调用：`X-Issuer-Signature` 必须是请求体在签发密钥下的HMAC-SHA256，
/// 未配置签发密钥时接口始终拒绝
/// 请求体: IssueTokenRequest
/// 响应: TokenResponse
pub async fn issue_token(
    data: web::Data<AppState>,
    body: web::Bytes,
    req: HttpRequest,
) -> ActixResult<HttpResponse> {
    let signature = req
        .headers()
        .get(ISSUER_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    if let Err(e) = verify_body_signature(&body, signature, data.config.security.issuer_secret.as_deref()) {
        log::warn!("Rejected token issue request without a valid issuer signature");
        return Ok(e.error_response());
    }

    let request: IssueTokenRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return Ok(HttpResponse::BadRequest().json(ApiResponse::<()>::error(400, format!("Invalid request body: {}", e))));
        }
    };

    if request.user_id <= 0 {
        return Ok(HttpResponse::BadRequest().json(ApiResponse::<()>::error(400, "Invalid user id".to_string())));
    }
    if let Err(e) = validate_username(&request.username) {
        return Ok(HttpResponse::BadRequest().json(ApiResponse::<()>::error(400, e.to_string())));
    }

    match data.token_service.issue_token(request.user_id, &request.username, request.role) {
        Ok((token, expires_at)) => {
            log::info!("Issued token for user {} ({:?})", request.user_id, request.role);
            Ok(HttpResponse::Ok().json(ApiResponse::success(TokenResponse { token, expires_at })))
        },
        Err(e) => {
            log::error!("Failed to issue token for user {}: {}", request.user_id, e);
            Ok(e.error_response())
        }
    }
}

/// 验证令牌
///
/// POST /api/v1/auth/verify
///
/// 请求体: VerifyTokenRequest
/// 响应: VerifyTokenResponse
pub async fn verify_token(
    data: web::Data<AppState>,
    request: web::Json<VerifyTokenRequest>,
) -> ActixResult<HttpResponse> {
    match data.token_service.verify_token(&request.token).await {
        Ok(identity) => Ok(HttpResponse::Ok().json(ApiResponse::success(VerifyTokenResponse::from(identity)))),
        Err(e) => {
            log::debug!("Token verification failed: {}", e);
            Ok(e.error_response())
        }
    }
}

/// 续期令牌
///
/// POST /api/v1/auth/renew
///
/// 旧令牌在其原始过期时间之前都会被拒绝
/// 请求体: RenewTokenRequest
/// 响应: TokenResponse
pub async fn renew_token(
    data: web::Data<AppState>,
    request: web::Json<RenewTokenRequest>,
) -> ActixResult<HttpResponse> {
    match data.token_service.renew_token(&request.old_token).await {
        Ok((token, expires_at)) => Ok(HttpResponse::Ok().json(ApiResponse::success(TokenResponse { token, expires_at }))),
        Err(e) => {
            log::warn!("Token renewal rejected: {}", e);
            Ok(e.error_response())
        }
    }
}

/// 吊销当前令牌 (登出)
///
/// POST /api/v1/auth/revoke
///
/// 需要Bearer令牌认证
pub async fn revoke_token(
    data: web::Data<AppState>,
    identity: Identity,
    req: HttpRequest,
) -> ActixResult<HttpResponse> {
    let token = match extract_bearer_token(&req) {
        Ok(token) => token,
        Err(e) => return Ok(e.error_response()),
    };

    match data.token_service.revoke_token(&token).await {
        Ok(()) => {
            log::info!("User {} revoked their token", identity.user_id);
            Ok(HttpResponse::Ok().json(ApiResponse::<()>::success_no_data("Token revoked")))
        },
        Err(e) => {
            log::error!("Failed to revoke token for user {}: {}", identity.user_id, e);
            Ok(e.error_response())
        }
    }
}
