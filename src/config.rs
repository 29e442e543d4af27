// 配置管理模块
// 负责加载和管理应用程序配置

use serde::{Deserialize, Serialize};
use std::env;
use anyhow::{Result, Context};

/// 令牌有效期上限 (秒)，一年
pub const MAX_TOKEN_TTL: i64 = 365 * 24 * 3600;

/// 应用程序配置结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 服务器配置
    pub server: ServerConfig,
    /// 数据库配置
    pub database: DatabaseConfig,
    /// 安全配置
    pub security: SecurityConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 服务器监听地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
    /// 工作线程数
    pub workers: Option<usize>,
    /// 请求超时时间 (秒)，超时的支付事务会被回滚
    pub timeout: u64,
    /// 允许跨域访问的源，为空时只允许本地开发地址
    pub cors_allowed_origins: Vec<String>,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库连接URL，未设置时使用内存存储
    pub url: Option<String>,
    /// 最大连接数
    pub max_connections: u32,
    /// 最小空闲连接数
    pub min_connections: u32,
    /// 连接超时时间 (秒)
    pub connect_timeout: u64,
    /// 空闲超时时间 (秒)
    pub idle_timeout: u64,
}

/// 安全配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// JWT签名密钥
    pub jwt_secret: String,
    /// 令牌有效期 (秒)
    pub token_ttl: i64,
    /// 续期阈值：剩余有效期占总有效期的比例低于该值时提示续期
    pub renewal_ratio: f64,
    /// 吊销表清理间隔 (秒)
    pub revocation_sweep_interval: u64,
    /// 支付渠道回调签名密钥，未配置时拒绝所有回调
    pub callback_secret: Option<String>,
    /// 上游登录流程签发令牌时使用的签名密钥，未配置时签发接口关闭
    pub issuer_secret: Option<String>,
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // 加载.env文件，忽略错误

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .context("Invalid SERVER_PORT")?,
                workers: env::var("SERVER_WORKERS")
                    .ok()
                    .and_then(|s| s.parse().ok()),
                timeout: env::var("SERVER_TIMEOUT")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .context("Invalid SERVER_TIMEOUT")?,
                cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                    .map(|s| parse_origin_list(&s))
                    .unwrap_or_default(),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
                max_connections: env::var("DB_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .context("Invalid DB_MAX_CONNECTIONS")?,
                min_connections: env::var("DB_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()
                    .context("Invalid DB_MIN_CONNECTIONS")?,
                connect_timeout: env::var("DB_CONNECT_TIMEOUT")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .context("Invalid DB_CONNECT_TIMEOUT")?,
                idle_timeout: env::var("DB_IDLE_TIMEOUT")
                    .unwrap_or_else(|_| "600".to_string())
                    .parse()
                    .context("Invalid DB_IDLE_TIMEOUT")?,
            },
            security: SecurityConfig {
                jwt_secret: env::var("JWT_SECRET")
                    .context("JWT_SECRET environment variable is required")?,
                token_ttl: env::var("TOKEN_TTL")
                    .unwrap_or_else(|_| "86400".to_string())
                    .parse()
                    .context("Invalid TOKEN_TTL")?,
                renewal_ratio: env::var("TOKEN_RENEWAL_RATIO")
                    .unwrap_or_else(|_| "0.3333".to_string())
                    .parse()
                    .context("Invalid TOKEN_RENEWAL_RATIO")?,
                revocation_sweep_interval: env::var("REVOCATION_SWEEP_INTERVAL")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .context("Invalid REVOCATION_SWEEP_INTERVAL")?,
                callback_secret: env::var("PAYMENT_CALLBACK_SECRET").ok().filter(|s| !s.is_empty()),
                issuer_secret: env::var("TOKEN_ISSUER_SECRET").ok().filter(|s| !s.is_empty()),
            },
        })
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        // 验证服务器配置
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.server.timeout == 0 {
            anyhow::bail!("Server timeout cannot be 0");
        }

        // 验证安全配置
        if self.security.jwt_secret.len() < 32 {
            anyhow::bail!("JWT secret must be at least 32 characters");
        }

        if self.security.token_ttl <= 0 {
            anyhow::bail!("Token TTL must be positive");
        }

        if self.security.token_ttl > MAX_TOKEN_TTL {
            anyhow::bail!("Token TTL cannot exceed {} seconds", MAX_TOKEN_TTL);
        }

        if !(self.security.renewal_ratio > 0.0 && self.security.renewal_ratio < 1.0) {
            anyhow::bail!("Token renewal ratio must be between 0 and 1");
        }

        if self.security.revocation_sweep_interval == 0 {
            anyhow::bail!("Revocation sweep interval cannot be 0");
        }

        // 持久化部署必须校验支付渠道回调签名
        if self.database.url.is_some() && self.security.callback_secret.is_none() {
            anyhow::bail!("PAYMENT_CALLBACK_SECRET is required when DATABASE_URL is set");
        }

        Ok(())
    }

    /// 获取服务器绑定地址
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// 解析逗号分隔的源列表
fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                workers: None,
                timeout: 30,
                cors_allowed_origins: Vec::new(),
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                min_connections: 1,
                connect_timeout: 30,
                idle_timeout: 600,
            },
            security: SecurityConfig {
                jwt_secret: "default-jwt-secret-change-in-production".to_string(),
                token_ttl: 86400,
                renewal_ratio: 1.0 / 3.0,
                revocation_sweep_interval: 300,
                callback_secret: None,
                issuer_secret: None,
            },
        }
    }
}
