// Bearer令牌认证中间件
// 从Authorization头部提取令牌，经令牌服务验证后把调用方身份注入请求上下文

use actix_web::{
    body::EitherBody,
    dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    web, Error, FromRequest, HttpMessage, HttpRequest, ResponseError,
};
use futures_util::future::{ok, ready, Ready};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use crate::error::AuthError;
use crate::models::Identity;
use crate::state::AppState;
use crate::utils::extract_bearer_token;

/// 令牌即将过期时附加的响应头
pub const TOKEN_RENEWAL_HEADER: &str = "x-token-renewal";

/// Bearer令牌认证中间件
pub struct BearerAuth;

impl<S, B> Transform<S, ServiceRequest> for BearerAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = BearerAuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(BearerAuthMiddleware {
            service: Rc::new(service),
        })
    }
}

pub struct BearerAuthMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for BearerAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        // 检查是否需要认证
        if should_skip_auth(req.path()) {
            return Box::pin(async move {
                service.call(req).await.map(ServiceResponse::map_into_left_body)
            });
        }

        // 提取Bearer令牌
        let token = match extract_bearer_token(req.request()) {
            Ok(token) => token,
            Err(e) => return reject(req, e),
        };

        let token_service = match req.app_data::<web::Data<AppState>>() {
            Some(data) => data.token_service.clone(),
            None => {
                log::error!("Token service not configured for {}", req.path());
                return reject(req, AuthError::StoreUnavailable("token service unavailable".to_string()));
            }
        };

        Box::pin(async move {
            let identity = match token_service.verify_token(&token).await {
                Ok(identity) => identity,
                Err(e) => {
                    log::warn!("Rejected credential on {} {}: {}", req.method(), req.path(), e);
                    let response = e.error_response();
                    return Ok(req.into_response(response).map_into_right_body());
                }
            };

            let needs_renewal = identity.needs_renewal;
            req.extensions_mut().insert(identity);

            let mut response = service.call(req).await?;
            if needs_renewal {
                response.headers_mut().insert(
                    HeaderName::from_static(TOKEN_RENEWAL_HEADER),
                    HeaderValue::from_static("required"),
                );
            }
            Ok(response.map_into_left_body())
        })
    }
}

fn reject<B: 'static>(
    req: ServiceRequest,
    err: AuthError,
) -> Pin<Box<dyn Future<Output = Result<ServiceResponse<EitherBody<B>>, Error>>>> {
    log::warn!("Rejected call to {} {}: {}", req.method(), req.path(), err);
    let response = err.error_response();
    Box::pin(async move { Ok(req.into_response(response).map_into_right_body()) })
}

/// 检查路径是否需要跳过认证
fn should_skip_auth(path: &str) -> bool {
    let public_paths = [
        "/health",
        "/api/v1/auth/token",
        "/api/v1/auth/verify",
        "/api/v1/auth/renew",
        "/api/v1/payments/callback", // 渠道回调使用签名校验
    ];

    public_paths.iter().any(|&public_path| path == public_path)
}

/// 从请求上下文读取认证中间件注入的调用方身份
impl FromRequest for Identity {
    type Error = AuthError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<Identity>()
                .cloned()
                .ok_or(AuthError::MissingCredential),
        )
    }
}
