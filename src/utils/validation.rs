// 数据验证工具函数
// 提供请求字段的格式检查

use anyhow::Result;

/// 验证支付单号格式
///
/// # Arguments
/// * `payment_number` - 支付单号
///
/// # Returns
/// * 单号是否合法
pub fn validate_payment_number(payment_number: &str) -> Result<()> {
    if !payment_number.starts_with("PAY") {
        anyhow::bail!("Payment number must start with PAY");
    }

    if payment_number.len() > 64 {
        anyhow::bail!("Payment number too long (max 64 characters)");
    }

    if !payment_number[3..].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        anyhow::bail!("Payment number contains invalid characters");
    }

    Ok(())
}

/// 验证用户名
///
/// # Arguments
/// * `username` - 用户名
pub fn validate_username(username: &str) -> Result<()> {
    if username.trim().is_empty() {
        anyhow::bail!("Username cannot be empty");
    }

    if username.len() > 64 {
        anyhow::bail!("Username too long (max 64 characters)");
    }

    // 检查是否包含有害字符
    let forbidden_chars = ['<', '>', '"', '\'', '&'];
    if username.chars().any(|c| forbidden_chars.contains(&c)) {
        anyhow::bail!("Username contains forbidden characters");
    }

    Ok(())
}
