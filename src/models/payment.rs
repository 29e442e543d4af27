// 支付记录数据模型
// 定义支付相关的数据结构、状态枚举和请求/响应格式

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use crate::utils::generate_random_suffix;

/// 支付单号随机后缀长度
pub const PAYMENT_NUMBER_SUFFIX_LEN: usize = 6;

/// 支付记录模型
#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq)]
pub struct Payment {
    /// 支付记录唯一标识符
    pub id: Uuid,
    /// 支付单号 (全局唯一，按时间可排序)
    pub payment_number: String,
    /// 关联订单ID
    pub order_id: Uuid,
    /// 付款用户ID (与订单所有者一致)
    pub user_id: i64,
    /// 支付金额 (创建时从订单复制)
    pub amount: Decimal,
    /// 支付方式
    pub payment_method: PaymentMethod,
    /// 支付状态
    pub status: PaymentStatus,
    /// 支付完成时间
    pub paid_at: Option<DateTime<Utc>>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

/// 支付状态枚举
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "varchar")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// 待支付
    #[sqlx(rename = "pending")]
    Pending,
    /// 已支付
    #[sqlx(rename = "paid")]
    Paid,
    /// 已取消
    #[sqlx(rename = "cancelled")]
    Cancelled,
    /// 已退款
    #[sqlx(rename = "refunded")]
    Refunded,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Pending
    }
}

impl PaymentStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

/// 支付方式枚举
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "varchar")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// 支付宝
    #[sqlx(rename = "alipay")]
    Alipay,
    /// 微信支付
    #[sqlx(rename = "wechat")]
    Wechat,
}

/// 支付渠道回调上报的结果
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallbackStatus {
    Success,
    Failed,
}

/// 创建支付请求
#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    /// 订单ID
    pub order_id: Uuid,
    /// 支付方式
    pub payment_method: PaymentMethod,
}

/// 创建支付响应
#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePaymentResponse {
    /// 支付记录ID
    pub payment_id: Uuid,
    /// 支付单号
    pub payment_number: String,
    /// 支付金额
    pub amount: Decimal,
    /// 订单支付截止时间
    pub expired_at: DateTime<Utc>,
}

/// 支付回调请求
#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentCallbackRequest {
    /// 支付单号
    pub payment_number: String,
    /// 渠道上报状态
    pub status: CallbackStatus,
}

/// 支付记录查询响应
#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub payment_id: Uuid,
    pub payment_number: String,
    pub order_id: Uuid,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// 为订单创建一条新的待支付记录
    ///
    /// # Arguments
    /// * `payment_number` - 已生成的支付单号
    /// * `order_id` - 订单ID
    /// * `user_id` - 付款用户ID
    /// * `amount` - 订单金额快照
    /// * `payment_method` - 支付方式
    /// * `now` - 创建时间
    pub fn new_pending(
        payment_number: String,
        order_id: Uuid,
        user_id: i64,
        amount: Decimal,
        payment_method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_number,
            order_id,
            user_id,
            amount,
            payment_method,
            status: PaymentStatus::Pending,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 检查支付记录是否属于指定用户
    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.user_id == user_id
    }

    /// 转换为API响应格式
    pub fn to_response(&self) -> PaymentResponse {
        PaymentResponse {
            payment_id: self.id,
            payment_number: self.payment_number.clone(),
            order_id: self.order_id,
            amount: self.amount,
            payment_method: self.payment_method,
            status: self.status,
            paid_at: self.paid_at,
            created_at: self.created_at,
        }
    }
}

/// 生成支付单号
///
/// 格式: `PAY` + UTC时间(`YYYYMMDDHHMMSS`) + 用户ID + 随机后缀。
/// 同一用户同一秒内的多次创建依靠随机后缀区分，数据库唯一索引兜底。
pub fn generate_payment_number(now: DateTime<Utc>, user_id: i64) -> String {
    format!(
        "PAY{}{}{}",
        now.format("%Y%m%d%H%M%S"),
        user_id,
        generate_random_suffix(PAYMENT_NUMBER_SUFFIX_LEN)
    )
}
