// 加密工具函数
// 提供HMAC签名验证、令牌指纹、随机后缀生成等安全功能

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use rand::{distributions::Uniform, Rng};
use anyhow::{Result, Context};

type HmacSha256 = Hmac<Sha256>;

/// 生成HMAC-SHA256签名
///
/// # Arguments
/// * `message` - 要签名的消息
/// * `secret` - 签名密钥
///
/// # Returns
/// * 十六进制格式的签名字符串
pub fn generate_hmac_signature(message: &[u8], secret: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .context("Invalid HMAC key")?;

    mac.update(message);
    let result = mac.finalize();
    Ok(hex::encode(result.into_bytes()))
}

/// 验证HMAC-SHA256签名
///
/// # Arguments
/// * `message` - 原始消息
/// * `signature` - 要验证的签名 (十六进制)
/// * `secret` - 签名密钥
///
/// # Returns
/// * 签名是否有效
pub fn verify_hmac_signature(message: &[u8], signature: &str, secret: &str) -> Result<bool> {
    let expected_signature = generate_hmac_signature(message, secret)?;
    Ok(constant_time_eq(&expected_signature, &signature.to_ascii_lowercase()))
}

/// 常量时间字符串比较 (防止时序攻击)
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a ^ byte_b;
    }

    result == 0
}

/// 令牌指纹 (SHA-256十六进制)，吊销表以此为键
pub fn token_fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// 生成大写字母和数字组成的随机后缀
///
/// # Arguments
/// * `length` - 后缀长度
pub fn generate_random_suffix(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let range = Uniform::from(0..CHARSET.len());
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| CHARSET[rng.sample(range)] as char)
        .collect()
}
