// 令牌服务
// 负责JWT令牌的签发、验证、续期和吊销

use std::collections::HashSet;
use std::sync::Arc;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;
use crate::config::SecurityConfig;
use crate::error::AuthError;
use crate::models::{Claims, Identity, Role};
use crate::store::RevocationStore;

/// HS256签名密钥，由令牌服务实例持有
#[derive(Clone)]
pub struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    /// 从共享密钥构造
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// 令牌服务
#[derive(Clone)]
pub struct TokenService {
    key: SigningKey,
    ttl: Duration,
    renewal_threshold: Duration,
    revocations: Arc<dyn RevocationStore>,
}

impl TokenService {
    /// 创建新的令牌服务实例
    ///
    /// # Arguments
    /// * `key` - 签名密钥
    /// * `ttl` - 令牌有效期
    /// * `renewal_threshold` - 剩余有效期低于该值时提示续期
    /// * `revocations` - 吊销表
    pub fn new(
        key: SigningKey,
        ttl: Duration,
        renewal_threshold: Duration,
        revocations: Arc<dyn RevocationStore>,
    ) -> Self {
        Self {
            key,
            ttl,
            renewal_threshold,
            revocations,
        }
    }

    /// 按安全配置创建令牌服务
    pub fn from_config(config: &SecurityConfig, revocations: Arc<dyn RevocationStore>) -> Self {
        let ttl = Duration::seconds(config.token_ttl);
        let threshold = Duration::seconds((config.token_ttl as f64 * config.renewal_ratio).round() as i64);
        Self::new(
            SigningKey::from_secret(config.jwt_secret.as_bytes()),
            ttl,
            threshold,
            revocations,
        )
    }

    /// 签发令牌
    ///
    /// # Returns
    /// * (令牌, 过期时间)
    pub fn issue_token(
        &self,
        user_id: i64,
        username: &str,
        role: Role,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        self.issue_at(user_id, username, role, Utc::now())
    }

    /// 以指定时间为签发时间签发令牌
    pub fn issue_at(
        &self,
        user_id: i64,
        username: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let expires_at = now + self.ttl;
        let claims = Claims {
            user_id,
            username: username.to_string(),
            role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.key.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))?;

        log::debug!("Issued token for user {} expiring at {}", user_id, expires_at);
        Ok((token, expires_at))
    }

    /// 验证令牌
    ///
    /// # Returns
    /// * 调用方身份，包含是否需要续期
    pub async fn verify_token(&self, token: &str) -> Result<Identity, AuthError> {
        self.verify_at(token, Utc::now()).await
    }

    /// 以指定时间为当前时间验证令牌
    pub async fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Identity, AuthError> {
        let claims = self.verify_claims(token, now).await?;
        let remaining = Duration::seconds(claims.exp - now.timestamp());

        Ok(Identity {
            user_id: claims.user_id,
            username: claims.username,
            role: claims.role,
            needs_renewal: remaining < self.renewal_threshold,
        })
    }

    /// 续期令牌：先认领旧令牌的吊销条目 (吊销到它原本的过期时间)，认领成功才签发新令牌
    ///
    /// 同一旧令牌的并发续期只有一个能成功，其余返回 `Revoked`
    pub async fn renew_token(&self, old_token: &str) -> Result<(String, DateTime<Utc>), AuthError> {
        self.renew_at(old_token, Utc::now()).await
    }

    /// 以指定时间为当前时间续期令牌
    pub async fn renew_at(
        &self,
        old_token: &str,
        now: DateTime<Utc>,
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let claims = self.verify_claims(old_token, now).await?;

        let claimed = self
            .revocations
            .revoke(old_token, timestamp_to_datetime(claims.exp)?)
            .await?;
        if !claimed {
            return Err(AuthError::Revoked);
        }

        let (token, expires_at) = self.issue_at(claims.user_id, &claims.username, claims.role, now)?;

        log::info!("Renewed token for user {}", claims.user_id);
        Ok((token, expires_at))
    }

    /// 主动吊销一个仍然有效的令牌 (登出)
    pub async fn revoke_token(&self, token: &str) -> Result<(), AuthError> {
        let claims = self.verify_claims(token, Utc::now()).await?;
        let claimed = self
            .revocations
            .revoke(token, timestamp_to_datetime(claims.exp)?)
            .await?;
        if !claimed {
            return Err(AuthError::Revoked);
        }

        log::info!("Revoked token for user {}", claims.user_id);
        Ok(())
    }

    /// 清理已失效的吊销条目
    pub async fn sweep_revocations(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
        let removed = self.revocations.sweep_expired(now).await?;
        if removed > 0 {
            log::info!("Swept {} expired revocation entries", removed);
        }
        Ok(removed)
    }

    /// 依次检查吊销、编码、过期、签名，全部通过才返回声明
    async fn verify_claims(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        if self.revocations.is_revoked(token, now).await? {
            return Err(AuthError::Revoked);
        }

        // 过期判断不依赖签名是否有效
        let unverified = decode_unverified(token)?;
        if now.timestamp() >= unverified.exp {
            return Err(AuthError::Expired);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        let data = decode::<Claims>(token, &self.key.decoding, &validation)
            .map_err(|_| AuthError::InvalidCredential)?;
        Ok(data.claims)
    }
}

/// 不校验签名地解析声明，仅用于读取过期时间
fn decode_unverified(token: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims = HashSet::new();

    decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|_| AuthError::InvalidCredential)
}

fn timestamp_to_datetime(secs: i64) -> Result<DateTime<Utc>, AuthError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or(AuthError::InvalidCredential)
}
