// 应用状态管理
// 包含存储、令牌服务、支付服务和配置信息

use std::sync::Arc;
use std::time::Duration;
use crate::config::Config;
use crate::services::{PaymentService, TokenService};
use crate::store::{InMemoryStore, PaymentStore, RevocationStore};

/// 应用全局状态
pub struct AppState {
    /// 订单/支付存储
    pub store: Arc<dyn PaymentStore>,
    /// 令牌服务
    pub token_service: TokenService,
    /// 支付服务
    pub payment_service: PaymentService,
    /// 应用配置
    pub config: Config,
}

impl AppState {
    /// 创建新的应用状态实例
    ///
    /// # Arguments
    /// * `store` - 同时提供订单/支付存储和令牌吊销表的存储
    /// * `config` - 应用配置
    pub fn new<S>(store: Arc<S>, config: Config) -> Self
    where
        S: PaymentStore + RevocationStore + 'static,
    {
        let revocations: Arc<dyn RevocationStore> = store.clone();
        let store: Arc<dyn PaymentStore> = store;

        Self {
            token_service: TokenService::from_config(&config.security, revocations),
            payment_service: PaymentService::new(store.clone())
                .with_deadline(Duration::from_secs(config.server.timeout)),
            store,
            config,
        }
    }

    /// 创建使用内存存储的应用状态
    pub fn in_memory(config: Config) -> Self {
        Self::new(Arc::new(InMemoryStore::new()), config)
    }

    /// 创建测试用的应用状态，同时返回底层内存存储便于准备数据
    #[cfg(test)]
    pub fn new_for_test() -> (Self, InMemoryStore) {
        let store = InMemoryStore::new();
        let mut config = Config::default();
        config.security.jwt_secret = "test-jwt-secret-test-jwt-secret-0000".to_string();
        config.security.callback_secret = Some(TEST_CALLBACK_SECRET.to_string());
        config.security.issuer_secret = Some(TEST_ISSUER_SECRET.to_string());
        (Self::new(Arc::new(store.clone()), config), store)
    }
}

#[cfg(test)]
pub const TEST_CALLBACK_SECRET: &str = "test-callback-secret";

#[cfg(test)]
pub const TEST_ISSUER_SECRET: &str = "test-issuer-secret";
