// 请求日志中间件
// 记录每个API请求的来源、耗时、状态码，以及认证通过的调用方

use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures_util::future::{ok, Ready};
use std::task::{Context, Poll};
use std::pin::Pin;
use std::future::Future;
use std::time::Instant;
use crate::models::Identity;

/// 请求日志中间件
pub struct RequestLogging;

impl<S, B> Transform<S, ServiceRequest> for RequestLogging
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequestLoggingMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequestLoggingMiddleware { service })
    }
}

pub struct RequestLoggingMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestLoggingMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();
        let remote_addr = req.connection_info().realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration = start_time.elapsed().as_millis();

            match &result {
                Ok(response) => {
                    let status = response.status().as_u16();
                    // 认证中间件在内层注入身份，这里只能在响应返回后读取
                    let caller = response
                        .request()
                        .extensions()
                        .get::<Identity>()
                        .map(|identity| format!("user={}", identity.user_id))
                        .unwrap_or_else(|| "anonymous".to_string());

                    if status >= 500 {
                        log::error!("{} {} {} {} {}ms - {}", remote_addr, caller, method, path, duration, status);
                    } else if status >= 400 {
                        log::warn!("{} {} {} {} {}ms - {}", remote_addr, caller, method, path, duration, status);
                    } else {
                        log::info!("{} {} {} {} {}ms - {}", remote_addr, caller, method, path, duration, status);
                    }
                },
                Err(e) => {
                    log::error!(
                        "{} {} {} {}ms - ERROR: {}",
                        remote_addr, method, path, duration, e
                    );
                }
            }

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, web, App, HttpResponse};

    #[actix_web::test]
    async fn test_logging_passes_response_through() {
        let app = test::init_service(
            App::new()
                .wrap(RequestLogging)
                .route("/ping", web::get().to(|| async { HttpResponse::Ok().body("pong") }))
                .route("/teapot", web::get().to(|| async { HttpResponse::ImATeapot().finish() })),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, "pong");

        let resp = test::call_service(&app, test::TestRequest::get().uri("/teapot").to_request()).await;
        assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
    }
}
