// 令牌数据模型
// 定义JWT声明、调用方身份以及令牌接口的请求/响应格式

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// 用户角色
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

/// JWT声明
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// 用户ID
    pub user_id: i64,
    /// 用户名
    pub username: String,
    /// 用户角色
    pub role: Role,
    /// 签发时间 (Unix秒)
    pub iat: i64,
    /// 过期时间 (Unix秒)
    pub exp: i64,
    /// 令牌唯一标识，保证同一秒内续期得到不同的令牌串
    pub jti: String,
}

/// 认证通过后注入请求上下文的调用方身份
///
/// 下游处理器只能通过这个值获知调用方，绝不读取请求体里的用户字段。
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Identity {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    /// 令牌剩余有效期低于续期阈值
    pub needs_renewal: bool,
}

/// 签发令牌请求
#[derive(Debug, Serialize, Deserialize)]
pub struct IssueTokenRequest {
    pub user_id: i64,
    pub username: String,
    #[serde(default)]
    pub role: Role,
}

/// 签发/续期令牌响应
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// 验证令牌请求
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyTokenRequest {
    pub token: String,
}

/// 验证令牌响应
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyTokenResponse {
    pub valid: bool,
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub needs_renewal: bool,
}

/// 续期令牌请求
#[derive(Debug, Serialize, Deserialize)]
pub struct RenewTokenRequest {
    pub old_token: String,
}

impl From<Identity> for VerifyTokenResponse {
    fn from(identity: Identity) -> Self {
        Self {
            valid: true,
            user_id: identity.user_id,
            username: identity.username,
            role: identity.role,
            needs_renewal: identity.needs_renewal,
        }
    }
}
