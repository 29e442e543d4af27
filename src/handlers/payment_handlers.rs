// 支付API处理器
// 处理支付记录创建、支付渠道回调、支付查询等HTTP请求

use actix_web::{web, HttpRequest, HttpResponse, ResponseError, Result as ActixResult};
use uuid::Uuid;
use crate::models::{ApiResponse, CreatePaymentRequest, Identity, PaymentCallbackRequest};
use crate::state::AppState;
use crate::utils::{validate_payment_number, verify_body_signature, CALLBACK_SIGNATURE_HEADER};

/// 为订单创建支付记录
///
/// POST /api/v1/payments
///
/// 需要Bearer令牌认证，付款人取自令牌身份
/// 请求体: CreatePaymentRequest
/// 响应: CreatePaymentResponse
pub async fn create_payment(
    data: web::Data<AppState>,
    identity: Identity,
    request: web::Json<CreatePaymentRequest>,
) -> ActixResult<HttpResponse> {
    let request = request.into_inner();

    match data
        .payment_service
        .create_payment(identity.user_id, request.order_id, request.payment_method)
        .await
    {
        Ok(response) => Ok(HttpResponse::Created().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

/// 支付渠道回调
///
/// POST /api/v1/payments/callback
///
/// 不使用Bearer令牌；`X-Callback-Signature` 必须是请求体在回调密钥下的HMAC-SHA256，
/// 未配置回调密钥时拒绝所有回调
/// 请求体: PaymentCallbackRequest
pub async fn payment_callback(
    data: web::Data<AppState>,
    body: web::Bytes,
    req: HttpRequest,
) -> ActixResult<HttpResponse> {
    let signature = req
        .headers()
        .get(CALLBACK_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    if let Err(e) = verify_body_signature(&body, signature, data.config.security.callback_secret.as_deref()) {
        log::warn!("Rejected payment callback with bad signature");
        return Ok(e.error_response());
    }

    let request: PaymentCallbackRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return Ok(HttpResponse::BadRequest().json(ApiResponse::<()>::error(400, format!("Invalid callback payload: {}", e))));
        }
    };

    if let Err(e) = validate_payment_number(&request.payment_number) {
        return Ok(HttpResponse::BadRequest().json(ApiResponse::<()>::error(400, e.to_string())));
    }

    match data
        .payment_service
        .payment_callback(&request.payment_number, request.status)
        .await
    {
        Ok(()) => Ok(HttpResponse::Ok().json(ApiResponse::<()>::success_no_data("Callback processed"))),
        Err(e) => Ok(e.error_response()),
    }
}

/// 获取支付记录详情
///
/// GET /api/v1/payments/{payment_id}
///
/// 需要Bearer令牌认证，只能查询自己的支付记录
/// 响应: PaymentResponse
pub async fn get_payment(
    data: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
) -> ActixResult<HttpResponse> {
    let payment_id = path.into_inner();

    match data.payment_service.get_payment(identity.user_id, payment_id).await {
        Ok(payment) => Ok(HttpResponse::Ok().json(ApiResponse::success(payment.to_response()))),
        Err(e) => {
            log::warn!("User {} failed to read payment {}: {}", identity.user_id, payment_id, e);
            Ok(e.error_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use actix_web::{http::StatusCode, test, web, App};
    use actix_web::http::header::AUTHORIZATION;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use crate::config::Config;
    use crate::models::{Order, OrderStatus, Role};
    use crate::routes::configure;
    use crate::state::{AppState, TEST_CALLBACK_SECRET};
    use crate::store::{InMemoryStore, PaymentStore};
    use crate::utils::{generate_hmac_signature, CALLBACK_SIGNATURE_HEADER};

    /// 构造带渠道签名的回调请求
    fn signed_callback(payload: serde_json::Value) -> test::TestRequest {
        let body = payload.to_string();
        let signature = generate_hmac_signature(body.as_bytes(), TEST_CALLBACK_SECRET).unwrap();
        test::TestRequest::post()
            .uri("/api/v1/payments/callback")
            .insert_header((CALLBACK_SIGNATURE_HEADER, signature))
            .set_payload(body)
    }

    macro_rules! api_app {
        ($state:expr) => {
            test::init_service(App::new().app_data($state.clone()).configure(configure)).await
        };
    }

    fn bearer(state: &AppState, user_id: i64) -> String {
        let (token, _) = state
            .token_service
            .issue_token(user_id, &format!("user{}", user_id), Role::User)
            .unwrap();
        format!("Bearer {}", token)
    }

    async fn seed_order(store: &InMemoryStore, user_id: i64) -> Order {
        let order = Order::new_pending(user_id, dec!(99.99), Duration::hours(1));
        store.insert_order(&order).await.unwrap();
        order
    }

    #[actix_web::test]
    async fn test_pay_order_end_to_end() {
        let (state, store) = AppState::new_for_test();
        let state = web::Data::new(state);
        let order = seed_order(&store, 1).await;
        let app = api_app!(state);
        let u1 = bearer(&state, 1);

        // 创建支付
        let req = test::TestRequest::post()
            .uri("/api/v1/payments")
            .insert_header((AUTHORIZATION, u1.clone()))
            .set_json(json!({ "order_id": order.id, "payment_method": "alipay" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        let payment_id = body["data"]["payment_id"].as_str().unwrap().to_string();
        let payment_number = body["data"]["payment_number"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["amount"], "99.99");
        assert!(payment_number.starts_with("PAY"));

        // 渠道回调
        let req = signed_callback(json!({ "payment_number": payment_number, "status": "success" })).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        // 查询支付记录
        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/payments/{}", payment_id))
            .insert_header((AUTHORIZATION, u1.clone()))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["status"], "paid");
        assert!(!body["data"]["paid_at"].is_null());

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Paid);

        // 重复回调被拒绝
        let req = signed_callback(json!({ "payment_number": payment_number, "status": "success" })).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        // 已支付订单不能再次发起支付
        let req = test::TestRequest::post()
            .uri("/api/v1/payments")
            .insert_header((AUTHORIZATION, u1))
            .set_json(json!({ "order_id": order.id, "payment_method": "alipay" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        // 其他用户查询被禁止
        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/payments/{}", payment_id))
            .insert_header((AUTHORIZATION, bearer(&state, 2)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_create_payment_errors() {
        let (state, store) = AppState::new_for_test();
        let state = web::Data::new(state);
        let order = seed_order(&store, 1).await;
        let mut stale = Order::new_pending(1, dec!(10.00), Duration::hours(1));
        stale.expired_at = chrono::Utc::now() - Duration::minutes(1);
        store.insert_order(&stale).await.unwrap();
        let app = api_app!(state);

        // 未携带令牌
        let req = test::TestRequest::post()
            .uri("/api/v1/payments")
            .set_json(json!({ "order_id": order.id, "payment_method": "wechat" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        // 订单不存在
        let req = test::TestRequest::post()
            .uri("/api/v1/payments")
            .insert_header((AUTHORIZATION, bearer(&state, 1)))
            .set_json(json!({ "order_id": uuid::Uuid::new_v4(), "payment_method": "wechat" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        // 他人订单
        let req = test::TestRequest::post()
            .uri("/api/v1/payments")
            .insert_header((AUTHORIZATION, bearer(&state, 2)))
            .set_json(json!({ "order_id": order.id, "payment_method": "wechat" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        // 已过期订单
        let req = test::TestRequest::post()
            .uri("/api/v1/payments")
            .insert_header((AUTHORIZATION, bearer(&state, 1)))
            .set_json(json!({ "order_id": stale.id, "payment_method": "wechat" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::GONE);
    }

    #[actix_web::test]
    async fn test_get_unknown_payment_is_not_found() {
        let (state, _) = AppState::new_for_test();
        let state = web::Data::new(state);
        let app = api_app!(state);

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/payments/{}", uuid::Uuid::new_v4()))
            .insert_header((AUTHORIZATION, bearer(&state, 1)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_callback_payload_validation() {
        let (state, _) = AppState::new_for_test();
        let state = web::Data::new(state);
        let app = api_app!(state);

        let body = "{not json";
        let signature = generate_hmac_signature(body.as_bytes(), TEST_CALLBACK_SECRET).unwrap();
        let req = test::TestRequest::post()
            .uri("/api/v1/payments/callback")
            .insert_header((CALLBACK_SIGNATURE_HEADER, signature))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = signed_callback(json!({ "payment_number": "pay-lowercase", "status": "success" })).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = signed_callback(json!({ "payment_number": "PAY20240101000000100ABCDEF", "status": "success" })).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_callback_signature_required() {
        let (state, store) = AppState::new_for_test();
        let state = web::Data::new(state);
        let order = seed_order(&store, 3).await;
        let created = state
            .payment_service
            .create_payment(3, order.id, crate::models::PaymentMethod::Wechat)
            .await
            .unwrap();
        let app = api_app!(state);

        let payload = json!({ "payment_number": created.payment_number, "status": "success" });

        // 缺少签名
        let req = test::TestRequest::post()
            .uri("/api/v1/payments/callback")
            .set_json(payload.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        // 签名错误
        let req = test::TestRequest::post()
            .uri("/api/v1/payments/callback")
            .insert_header((CALLBACK_SIGNATURE_HEADER, "00ff"))
            .set_json(payload.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);

        let req = signed_callback(payload).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Paid);
    }

    #[actix_web::test]
    async fn test_callback_rejected_without_configured_secret() {
        let store = InMemoryStore::new();
        let mut config = Config::default();
        config.security.jwt_secret = "test-jwt-secret-test-jwt-secret-0000".to_string();
        let state = web::Data::new(AppState::new(Arc::new(store.clone()), config));
        let order = seed_order(&store, 3).await;
        let created = state
            .payment_service
            .create_payment(3, order.id, crate::models::PaymentMethod::Alipay)
            .await
            .unwrap();
        let app = api_app!(state);

        // 签名对任何密钥都无效
        let req = signed_callback(json!({ "payment_number": created.payment_number, "status": "success" })).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
    }
}
