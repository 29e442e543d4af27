// 订单数据模型
// 订单由上游下单流程创建，支付开始后只由支付账本读取和修改

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

/// 订单模型
#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq)]
pub struct Order {
    /// 订单唯一标识符
    pub id: Uuid,
    /// 下单用户ID
    pub user_id: i64,
    /// 订单总金额
    pub total_amount: Decimal,
    /// 订单状态
    pub status: OrderStatus,
    /// 支付截止时间
    pub expired_at: DateTime<Utc>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

/// 订单状态枚举
///
/// "已过期" 不落库：处于 `Pending` 且超过 `expired_at` 的订单在检查时视为过期。
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "varchar")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// 待支付
    #[sqlx(rename = "pending")]
    Pending,
    /// 已支付
    #[sqlx(rename = "paid")]
    Paid,
    /// 已取消
    #[sqlx(rename = "cancelled")]
    Cancelled,
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

impl Order {
    /// 构造一个新的待支付订单
    ///
    /// # Arguments
    /// * `user_id` - 下单用户ID
    /// * `total_amount` - 订单总金额
    /// * `ttl` - 支付有效期
    pub fn new_pending(user_id: i64, total_amount: Decimal, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            total_amount,
            status: OrderStatus::Pending,
            expired_at: now + ttl,
            created_at: now,
            updated_at: now,
        }
    }

    /// 检查订单在给定时间点是否已过期
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expired_at
    }

    /// 检查订单是否属于指定用户
    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.user_id == user_id
    }
}
