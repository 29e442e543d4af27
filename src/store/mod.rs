// 订单/支付存储层
// 定义支付账本依赖的事务边界，以及令牌吊销表的存取接口

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::error::StoreError;
use crate::models::{Order, OrderStatus, Payment, PaymentStatus};

/// 订单/支付存储
///
/// 支付账本的所有多行读写都必须在 [`PaymentTx`] 内完成；
/// 其余方法只做单行读取，依赖存储自身的读一致性。
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// 开启一个事务
    async fn begin(&self) -> Result<Box<dyn PaymentTx>, StoreError>;

    /// 写入订单 (上游下单流程使用)
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError>;

    /// 按主键读取订单
    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    /// 按主键读取支付记录
    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, StoreError>;

    /// 健康检查
    async fn ping(&self) -> Result<(), StoreError>;
}

/// 存储事务
///
/// 未调用 `commit` 就被丢弃的事务等同于回滚，请求被取消或超时时不会留下部分写入。
#[async_trait]
pub trait PaymentTx: Send {
    /// 读取并锁定订单行
    async fn lock_order(&mut self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    /// 查找订单下仍处于待支付状态的支付记录
    async fn find_pending_payment(&mut self, order_id: Uuid) -> Result<Option<Payment>, StoreError>;

    /// 插入支付记录，支付单号重复时返回 `StoreError::Conflict`，
    /// 订单已有待支付记录时返回 `StoreError::Rejected`
    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError>;

    /// 按支付单号读取并锁定支付记录
    async fn lock_payment_by_number(&mut self, payment_number: &str) -> Result<Option<Payment>, StoreError>;

    /// 比较并交换支付状态，当前状态不是 `from` 时返回 `StoreError::StaleRow`
    async fn update_payment_status(
        &mut self,
        payment_id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
        paid_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// 比较并交换订单状态，当前状态不是 `from` 时返回 `StoreError::StaleRow`
    async fn update_order_status(
        &mut self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// 提交事务；失败时不留下任何部分效果
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// 显式回滚
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// 令牌吊销表
///
/// 条目只在 `expired_at > now` 时生效，过期条目可以随时清理。
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// 认领吊销条目
    ///
    /// # Returns
    /// * `true` 表示本次调用写入了条目；条目已存在时返回 `false` 且不做修改
    async fn revoke(&self, token: &str, expired_at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// 检查令牌是否存在仍然有效的吊销条目
    async fn is_revoked(&self, token: &str, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// 删除已失效的吊销条目，返回删除数量
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
