// 支付服务
// 负责支付记录创建、支付回调对账、支付查询等核心业务逻辑

use std::sync::Arc;
use std::time::Duration as StdDuration;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use crate::error::PaymentError;
use crate::models::{
    generate_payment_number, CallbackStatus, CreatePaymentResponse, OrderStatus, Payment,
    PaymentMethod, PaymentStatus,
};
use crate::store::{PaymentStore, PaymentTx};

/// 事务提交前允许花费的默认时间
pub const DEFAULT_STAGE_DEADLINE: StdDuration = StdDuration::from_secs(30);

/// 支付服务
///
/// 不在调用之间缓存任何状态，每次操作都在事务内重新读取订单/支付记录。
/// 截止时间只覆盖开启事务到提交之前的阶段：超时的事务被直接丢弃回滚，
/// 因此超时返回的 `StoreUnavailable` 一定没有提交；提交本身不会被截断。
#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn PaymentStore>,
    deadline: StdDuration,
}

impl PaymentService {
    /// 创建新的支付服务实例
    pub fn new(store: Arc<dyn PaymentStore>) -> Self {
        Self {
            store,
            deadline: DEFAULT_STAGE_DEADLINE,
        }
    }

    /// 设置事务提交前的截止时间
    pub fn with_deadline(mut self, deadline: StdDuration) -> Self {
        self.deadline = deadline;
        self
    }

    /// 为订单创建支付记录
    ///
    /// # Arguments
    /// * `caller_id` - 调用方用户ID (来自认证上下文)
    /// * `order_id` - 订单ID
    /// * `method` - 支付方式
    ///
    /// # Returns
    /// * 支付记录创建响应，包含订单支付截止时间
    pub async fn create_payment(
        &self,
        caller_id: i64,
        order_id: Uuid,
        method: PaymentMethod,
    ) -> Result<CreatePaymentResponse, PaymentError> {
        self.create_payment_at(caller_id, order_id, method, Utc::now()).await
    }

    /// 以指定时间为当前时间创建支付记录
    pub async fn create_payment_at(
        &self,
        caller_id: i64,
        order_id: Uuid,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<CreatePaymentResponse, PaymentError> {
        let staged = tokio::time::timeout(
            self.deadline,
            self.stage_create(caller_id, order_id, method, now),
        )
        .await
        .map_err(|_| {
            log::error!("Create payment for order {} missed its deadline, rolled back", order_id);
            deadline_exceeded()
        })?;

        let (tx, payment, expired_at) = staged.map_err(|e| {
            log::warn!("Create payment rejected for order {} by user {}: {}", order_id, caller_id, e);
            e
        })?;

        tx.commit().await.map_err(|e| {
            log::error!("Failed to commit payment for order {}: {}", order_id, e);
            PaymentError::from(e)
        })?;

        log::info!(
            "Created payment {} ({}) for order {} by user {}",
            payment.payment_number, payment.id, order_id, caller_id
        );

        Ok(CreatePaymentResponse {
            payment_id: payment.id,
            payment_number: payment.payment_number,
            amount: payment.amount,
            expired_at,
        })
    }

    /// 处理支付渠道回调
    ///
    /// # Arguments
    /// * `payment_number` - 支付单号
    /// * `reported` - 渠道上报的支付结果
    pub async fn payment_callback(
        &self,
        payment_number: &str,
        reported: CallbackStatus,
    ) -> Result<(), PaymentError> {
        self.payment_callback_at(payment_number, reported, Utc::now()).await
    }

    /// 以指定时间为当前时间处理支付回调
    pub async fn payment_callback_at(
        &self,
        payment_number: &str,
        reported: CallbackStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PaymentError> {
        let staged = tokio::time::timeout(
            self.deadline,
            self.stage_callback(payment_number, reported, now),
        )
        .await
        .map_err(|_| {
            log::error!("Callback for payment {} missed its deadline, rolled back", payment_number);
            deadline_exceeded()
        })?;

        let (tx, payment) = staged.map_err(|e| {
            log::warn!("Payment callback rejected for {}: {}", payment_number, e);
            e
        })?;

        tx.commit().await.map_err(|e| {
            log::error!("Failed to commit callback for payment {}: {}", payment_number, e);
            PaymentError::from(e)
        })?;

        log::info!(
            "Payment {} settled as {:?}, order {}",
            payment_number, reported, payment.order_id
        );
        Ok(())
    }

    /// 开启事务并写入待支付记录，返回尚未提交的事务
    async fn stage_create(
        &self,
        caller_id: i64,
        order_id: Uuid,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<(Box<dyn PaymentTx>, Payment, DateTime<Utc>), PaymentError> {
        let mut tx = self.store.begin().await?;
        let result = Self::insert_pending_payment(tx.as_mut(), caller_id, order_id, method, now).await;
        match result {
            Ok((payment, expired_at)) => Ok((tx, payment, expired_at)),
            Err(e) => {
                rollback(tx).await;
                Err(e)
            }
        }
    }

    /// 开启事务并结算支付记录，返回尚未提交的事务
    async fn stage_callback(
        &self,
        payment_number: &str,
        reported: CallbackStatus,
        now: DateTime<Utc>,
    ) -> Result<(Box<dyn PaymentTx>, Payment), PaymentError> {
        let mut tx = self.store.begin().await?;
        let result = Self::settle_payment(tx.as_mut(), payment_number, reported, now).await;
        match result {
            Ok(payment) => Ok((tx, payment)),
            Err(e) => {
                rollback(tx).await;
                Err(e)
            }
        }
    }

    /// 查询支付记录
    ///
    /// # Arguments
    /// * `caller_id` - 调用方用户ID
    /// * `payment_id` - 支付记录ID
    pub async fn get_payment(&self, caller_id: i64, payment_id: Uuid) -> Result<Payment, PaymentError> {
        let payment = self
            .store
            .get_payment(payment_id)
            .await?
            .ok_or(PaymentError::PaymentNotFound)?;

        if !payment.is_owned_by(caller_id) {
            return Err(PaymentError::Forbidden);
        }

        Ok(payment)
    }

    /// 在事务内校验订单并插入待支付记录
    async fn insert_pending_payment(
        tx: &mut dyn PaymentTx,
        caller_id: i64,
        order_id: Uuid,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<(Payment, DateTime<Utc>), PaymentError> {
        let order = tx
            .lock_order(order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound)?;

        if !order.is_owned_by(caller_id) {
            return Err(PaymentError::Forbidden);
        }

        if order.status != OrderStatus::Pending {
            return Err(PaymentError::InvalidState(format!(
                "order status is {:?}",
                order.status
            )));
        }

        if order.is_expired_at(now) {
            return Err(PaymentError::Expired);
        }

        // 同一订单同时只允许一条待支付记录
        if let Some(active) = tx.find_pending_payment(order_id).await? {
            return Err(PaymentError::InvalidState(format!(
                "order already has pending payment {}",
                active.payment_number
            )));
        }

        let payment = Payment::new_pending(
            generate_payment_number(now, caller_id),
            order.id,
            caller_id,
            order.total_amount,
            method,
            now,
        );
        tx.insert_payment(&payment).await?;

        Ok((payment, order.expired_at))
    }

    /// 在事务内把待支付记录结算为终态，成功时同时把订单置为已支付
    async fn settle_payment(
        tx: &mut dyn PaymentTx,
        payment_number: &str,
        reported: CallbackStatus,
        now: DateTime<Utc>,
    ) -> Result<Payment, PaymentError> {
        let payment = tx
            .lock_payment_by_number(payment_number)
            .await?
            .ok_or(PaymentError::PaymentNotFound)?;

        if payment.status.is_terminal() {
            return Err(PaymentError::InvalidState(format!(
                "payment status is {:?}",
                payment.status
            )));
        }

        match reported {
            CallbackStatus::Success => {
                tx.update_payment_status(payment.id, PaymentStatus::Pending, PaymentStatus::Paid, Some(now), now)
                    .await?;
                tx.update_order_status(payment.order_id, OrderStatus::Pending, OrderStatus::Paid, now)
                    .await?;
            }
            CallbackStatus::Failed => {
                // 订单保持待支付，允许重新发起支付
                tx.update_payment_status(payment.id, PaymentStatus::Pending, PaymentStatus::Cancelled, None, now)
                    .await?;
            }
        }

        Ok(payment)
    }
}

fn deadline_exceeded() -> PaymentError {
    PaymentError::StoreUnavailable("deadline exceeded before commit, nothing was written".to_string())
}

async fn rollback(tx: Box<dyn PaymentTx>) {
    if let Err(e) = tx.rollback().await {
        log::error!("Failed to roll back transaction: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use crate::models::Order;
    use crate::store::InMemoryStore;

    async fn setup_test_service() -> (PaymentService, InMemoryStore) {
        let store = InMemoryStore::new();
        (PaymentService::new(Arc::new(store.clone())), store)
    }

    async fn seed_order(store: &InMemoryStore, user_id: i64, ttl: Duration) -> Order {
        let order = Order::new_pending(user_id, dec!(99.99), ttl);
        store.insert_order(&order).await.unwrap();
        order
    }

    #[tokio::test]
    async fn test_create_payment() {
        let (service, store) = setup_test_service().await;
        let order = seed_order(&store, 1, Duration::hours(1)).await;

        let response = service
            .create_payment(1, order.id, PaymentMethod::Alipay)
            .await
            .unwrap();

        assert_eq!(response.amount, dec!(99.99));
        assert_eq!(response.expired_at, order.expired_at);
        assert!(response.payment_number.starts_with("PAY"));

        let payment = service.get_payment(1, response.payment_id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.order_id, order.id);
        assert_eq!(payment.user_id, 1);
        assert!(payment.paid_at.is_none());
    }

    #[tokio::test]
    async fn test_create_payment_unknown_order() {
        let (service, _) = setup_test_service().await;
        let err = service
            .create_payment(1, Uuid::new_v4(), PaymentMethod::Wechat)
            .await
            .unwrap_err();
        assert_eq!(err, PaymentError::OrderNotFound);
    }

    #[tokio::test]
    async fn test_create_payment_for_foreign_order() {
        let (service, store) = setup_test_service().await;
        let order = seed_order(&store, 1, Duration::hours(1)).await;

        let err = service
            .create_payment(2, order.id, PaymentMethod::Alipay)
            .await
            .unwrap_err();
        assert_eq!(err, PaymentError::Forbidden);
    }

    #[tokio::test]
    async fn test_create_payment_for_expired_order() {
        let (service, store) = setup_test_service().await;
        let order = seed_order(&store, 1, Duration::hours(-1)).await;

        let err = service
            .create_payment(1, order.id, PaymentMethod::Alipay)
            .await
            .unwrap_err();
        assert_eq!(err, PaymentError::Expired);

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_expiry_checked_against_supplied_clock() {
        let (service, store) = setup_test_service().await;
        let order = seed_order(&store, 1, Duration::hours(1)).await;

        let at_deadline = service
            .create_payment_at(1, order.id, PaymentMethod::Alipay, order.expired_at)
            .await;
        assert!(at_deadline.is_ok());

        let order = seed_order(&store, 1, Duration::hours(1)).await;
        let err = service
            .create_payment_at(1, order.id, PaymentMethod::Alipay, order.expired_at + Duration::seconds(1))
            .await
            .unwrap_err();
        assert_eq!(err, PaymentError::Expired);
    }

    #[tokio::test]
    async fn test_second_pending_payment_rejected() {
        let (service, store) = setup_test_service().await;
        let order = seed_order(&store, 1, Duration::hours(1)).await;

        service.create_payment(1, order.id, PaymentMethod::Alipay).await.unwrap();
        let err = service
            .create_payment(1, order.id, PaymentMethod::Wechat)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_concurrent_create_payment_single_winner() {
        let (service, store) = setup_test_service().await;
        let order = seed_order(&store, 1, Duration::hours(1)).await;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move {
                    service.create_payment(1, order.id, PaymentMethod::Alipay).await
                })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(e) => assert!(matches!(e, PaymentError::InvalidState(_))),
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_full_settlement_scenario() {
        let (service, store) = setup_test_service().await;
        let order = seed_order(&store, 1, Duration::hours(1)).await;

        let created = service
            .create_payment(1, order.id, PaymentMethod::Alipay)
            .await
            .unwrap();
        assert_eq!(created.amount, dec!(99.99));

        service
            .payment_callback(&created.payment_number, CallbackStatus::Success)
            .await
            .unwrap();

        let payment = service.get_payment(1, created.payment_id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert!(payment.paid_at.is_some());

        let order_after = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(order_after.status, OrderStatus::Paid);

        let err = service
            .create_payment(1, order.id, PaymentMethod::Alipay)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidState(_)));

        // 其他用户查看
        let err = service.get_payment(2, created.payment_id).await.unwrap_err();
        assert_eq!(err, PaymentError::Forbidden);
    }

    #[tokio::test]
    async fn test_duplicate_callback_rejected_without_change() {
        let (service, store) = setup_test_service().await;
        let order = seed_order(&store, 1, Duration::hours(1)).await;
        let created = service.create_payment(1, order.id, PaymentMethod::Wechat).await.unwrap();

        service
            .payment_callback(&created.payment_number, CallbackStatus::Success)
            .await
            .unwrap();
        let first = service.get_payment(1, created.payment_id).await.unwrap();

        let err = service
            .payment_callback(&created.payment_number, CallbackStatus::Success)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidState(_)));

        let second = service.get_payment(1, created.payment_id).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_concurrent_callbacks_apply_once() {
        let (service, store) = setup_test_service().await;
        let order = seed_order(&store, 1, Duration::hours(1)).await;
        let created = service.create_payment(1, order.id, PaymentMethod::Alipay).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let number = created.payment_number.clone();
                tokio::spawn(async move {
                    service.payment_callback(&number, CallbackStatus::Success).await
                })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_callback_unknown_payment() {
        let (service, _) = setup_test_service().await;
        let err = service
            .payment_callback("PAY20240101000000199ZZZZZZ", CallbackStatus::Success)
            .await
            .unwrap_err();
        assert_eq!(err, PaymentError::PaymentNotFound);
    }

    #[tokio::test]
    async fn test_failed_callback_frees_order() {
        let (service, store) = setup_test_service().await;
        let order = seed_order(&store, 1, Duration::hours(1)).await;
        let first = service.create_payment(1, order.id, PaymentMethod::Alipay).await.unwrap();

        service
            .payment_callback(&first.payment_number, CallbackStatus::Failed)
            .await
            .unwrap();

        let cancelled = service.get_payment(1, first.payment_id).await.unwrap();
        assert_eq!(cancelled.status, PaymentStatus::Cancelled);
        assert!(cancelled.paid_at.is_none());

        let order_after = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(order_after.status, OrderStatus::Pending);

        let retry = service.create_payment(1, order.id, PaymentMethod::Wechat).await;
        assert!(retry.is_ok());
    }

    #[tokio::test]
    async fn test_callback_commit_failure_rolls_back_both_rows() {
        let (service, store) = setup_test_service().await;
        let order = seed_order(&store, 1, Duration::hours(1)).await;
        let created = service.create_payment(1, order.id, PaymentMethod::Alipay).await.unwrap();

        store.set_fail_commits(true);
        let err = service
            .payment_callback(&created.payment_number, CallbackStatus::Success)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::StoreUnavailable(_)));

        let payment = service.get_payment(1, created.payment_id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(payment.paid_at.is_none());
        let order_after = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(order_after.status, OrderStatus::Pending);

        // 提交恢复后可以正常结算
        store.set_fail_commits(false);
        service
            .payment_callback(&created.payment_number, CallbackStatus::Success)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missed_deadline_writes_nothing() {
        let store = InMemoryStore::new();
        let service = PaymentService::new(Arc::new(store.clone()))
            .with_deadline(StdDuration::from_millis(50));
        let order = seed_order(&store, 1, Duration::hours(1)).await;

        // 另一个事务占住存储，使创建无法在截止时间内完成
        let held = store.begin().await.unwrap();
        let err = service
            .create_payment(1, order.id, PaymentMethod::Alipay)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::StoreUnavailable(_)));
        held.rollback().await.unwrap();

        // 超时没有留下任何写入，订单仍可正常支付
        let created = service.create_payment(1, order.id, PaymentMethod::Alipay).await.unwrap();
        service
            .payment_callback(&created.payment_number, CallbackStatus::Success)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_payment_not_found() {
        let (service, _) = setup_test_service().await;
        let err = service.get_payment(1, Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err, PaymentError::PaymentNotFound);
    }
}
