// 内存存储实现
// 用于测试和本地运行；事务在整个生命周期内持有存储锁，写入只在提交时生效

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;
use crate::error::StoreError;
use crate::models::{Order, OrderStatus, Payment, PaymentStatus};
use crate::store::{PaymentStore, PaymentTx, RevocationStore};
use crate::utils::token_fingerprint;

#[derive(Debug, Default, Clone)]
struct Tables {
    orders: HashMap<Uuid, Order>,
    payments: HashMap<Uuid, Payment>,
    /// 支付单号 -> 支付记录ID
    payment_numbers: HashMap<String, Uuid>,
}

/// 线程安全的内存存储
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    revocations: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
    fail_commits: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// 创建空的内存存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 让后续的提交全部失败，用于验证回滚语义
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// 当前吊销表条目数量 (包含尚未清理的过期条目)
    pub async fn revocation_count(&self) -> usize {
        self.revocations.read().await.len()
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn PaymentTx>, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTx {
            guard,
            working,
            fail_commit: self.fail_commits.load(Ordering::SeqCst),
        }))
    }

    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.orders.contains_key(&order.id) {
            return Err(StoreError::Conflict(format!("order {}", order.id)));
        }
        tables.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.orders.get(&order_id).cloned())
    }

    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.payments.get(&payment_id).cloned())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// 内存事务
struct InMemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    fail_commit: bool,
}

#[async_trait]
impl PaymentTx for InMemoryTx {
    async fn lock_order(&mut self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.working.orders.get(&order_id).cloned())
    }

    async fn find_pending_payment(&mut self, order_id: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .working
            .payments
            .values()
            .find(|p| p.order_id == order_id && p.status == PaymentStatus::Pending)
            .cloned())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        if self.working.payment_numbers.contains_key(&payment.payment_number) {
            return Err(StoreError::Conflict(format!(
                "payment_number {}",
                payment.payment_number
            )));
        }
        if payment.status == PaymentStatus::Pending
            && self
                .working
                .payments
                .values()
                .any(|p| p.order_id == payment.order_id && p.status == PaymentStatus::Pending)
        {
            return Err(StoreError::Rejected("order already has a pending payment".to_string()));
        }
        self.working
            .payment_numbers
            .insert(payment.payment_number.clone(), payment.id);
        self.working.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn lock_payment_by_number(&mut self, payment_number: &str) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .working
            .payment_numbers
            .get(payment_number)
            .and_then(|id| self.working.payments.get(id))
            .cloned())
    }

    async fn update_payment_status(
        &mut self,
        payment_id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
        paid_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        match self.working.payments.get_mut(&payment_id) {
            Some(payment) if payment.status == from => {
                payment.status = to;
                payment.paid_at = paid_at.or(payment.paid_at);
                payment.updated_at = now;
                Ok(())
            }
            _ => Err(StoreError::StaleRow(format!("payment {}", payment_id))),
        }
    }

    async fn update_order_status(
        &mut self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        match self.working.orders.get_mut(&order_id) {
            Some(order) if order.status == from => {
                order.status = to;
                order.updated_at = now;
                Ok(())
            }
            _ => Err(StoreError::StaleRow(format!("order {}", order_id))),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if self.fail_commit {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        let InMemoryTx { mut guard, working, .. } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl RevocationStore for InMemoryStore {
    async fn revoke(&self, token: &str, expired_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut revocations = self.revocations.write().await;
        match revocations.entry(token_fingerprint(token)) {
            Entry::Vacant(entry) => {
                entry.insert(expired_at);
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
        }
    }

    async fn is_revoked(&self, token: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let key = token_fingerprint(token);
        let mut revocations = self.revocations.write().await;
        match revocations.get(&key) {
            Some(expired_at) if *expired_at > now => Ok(true),
            Some(_) => {
                // 过期条目读时即删
                revocations.remove(&key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut revocations = self.revocations.write().await;
        let before = revocations.len();
        revocations.retain(|_, expired_at| *expired_at > now);
        Ok((before - revocations.len()) as u64)
    }
}
