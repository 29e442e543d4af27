// PostgreSQL存储实现
// 事务内对订单/支付行使用 SELECT ... FOR UPDATE 行锁，状态更新带 WHERE status 比较

use std::time::Duration;
use async_trait::async_trait;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;
use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::models::{Order, OrderStatus, Payment, PaymentStatus};
use crate::store::{PaymentStore, PaymentTx, RevocationStore};
use crate::utils::token_fingerprint;

const ORDER_COLUMNS: &str =
    "id, user_id, total_amount, status, expired_at, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, payment_number, order_id, user_id, amount, payment_method, \
     status, paid_at, created_at, updated_at";

/// PostgreSQL存储
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// 使用已有连接池创建存储
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 按配置建立连接池
    ///
    /// # Arguments
    /// * `config` - 数据库配置
    /// * `url` - 数据库连接URL
    pub async fn connect(config: &DatabaseConfig, url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout))
            .idle_timeout(Duration::from_secs(config.idle_timeout))
            .connect(url)
            .await
            .context("Failed to connect to database")?;

        Ok(Self::new(pool))
    }

    /// 执行数据库迁移
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }
}

/// 每个订单最多一条待支付记录的部分唯一索引
const PENDING_PER_ORDER_INDEX: &str = "uniq_payments_pending_order";

/// 转换插入错误：待支付唯一索引冲突是业务拒绝，其他唯一约束冲突为 `StoreError::Conflict`
fn map_insert_error(err: sqlx::Error, what: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            map_unique_violation(db_err.constraint(), what)
        }
        _ => StoreError::Database(err),
    }
}

fn map_unique_violation(constraint: Option<&str>, what: &str) -> StoreError {
    match constraint {
        Some(PENDING_PER_ORDER_INDEX) => {
            StoreError::Rejected("order already has a pending payment".to_string())
        }
        _ => StoreError::Conflict(what.to_string()),
    }
}

#[async_trait]
impl PaymentStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn PaymentTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgPaymentTx { tx }))
    }

    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, total_amount, status, expired_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.total_amount)
        .bind(order.status)
        .bind(order.expired_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, "order id"))?;
        Ok(())
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments WHERE id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payment)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// PostgreSQL事务，丢弃时由sqlx自动回滚
struct PgPaymentTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl PaymentTx for PgPaymentTx {
    async fn lock_order(&mut self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE id = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(order)
    }

    async fn find_pending_payment(&mut self, order_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments WHERE order_id = $1 AND status = $2 LIMIT 1",
            PAYMENT_COLUMNS
        ))
        .bind(order_id)
        .bind(PaymentStatus::Pending)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(payment)
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, payment_number, order_id, user_id, amount, payment_method,
                status, paid_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(payment.id)
        .bind(&payment.payment_number)
        .bind(payment.order_id)
        .bind(payment.user_id)
        .bind(payment.amount)
        .bind(payment.payment_method)
        .bind(payment.status)
        .bind(payment.paid_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_insert_error(e, "payment_number or pending payment per order"))?;
        Ok(())
    }

    async fn lock_payment_by_number(&mut self, payment_number: &str) -> Result<Option<Payment>, StoreError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments WHERE payment_number = $1 FOR UPDATE",
            PAYMENT_COLUMNS
        ))
        .bind(payment_number)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(payment)
    }

    async fn update_payment_status(
        &mut self,
        payment_id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
        paid_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE payments
            SET status = $1, paid_at = COALESCE($2, paid_at), updated_at = $3
            WHERE id = $4 AND status = $5
            "#,
        )
        .bind(to)
        .bind(paid_at)
        .bind(now)
        .bind(payment_id)
        .bind(from)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(StoreError::StaleRow(format!("payment {}", payment_id)));
        }
        Ok(())
    }

    async fn update_order_status(
        &mut self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let rows_affected = sqlx::query(
            "UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4",
        )
        .bind(to)
        .bind(now)
        .bind(order_id)
        .bind(from)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(StoreError::StaleRow(format!("order {}", order_id)));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl RevocationStore for PostgresStore {
    async fn revoke(&self, token: &str, expired_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let rows_affected = sqlx::query(
            r#"
            INSERT INTO token_revocations (token_hash, expired_at)
            VALUES ($1, $2)
            ON CONFLICT (token_hash) DO NOTHING
            "#,
        )
        .bind(token_fingerprint(token))
        .bind(expired_at)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows_affected == 1)
    }

    async fn is_revoked(&self, token: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let revoked: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM token_revocations WHERE token_hash = $1 AND expired_at > $2)",
        )
        .bind(token_fingerprint(token))
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(revoked)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let rows_affected = sqlx::query("DELETE FROM token_revocations WHERE expired_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows_affected)
    }
}
