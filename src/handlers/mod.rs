// API处理器模块
// 包含令牌、支付、健康检查的HTTP请求处理逻辑

pub mod token_handlers;
pub mod payment_handlers;
pub mod health_handlers;

// 重新导出处理器
pub use token_handlers::*;
pub use payment_handlers::*;
pub use health_handlers::*;
