// 服务层模块
// 包含令牌服务和支付服务两类业务逻辑

pub mod token_service;
pub mod payment_service;

// 重新导出服务
pub use token_service::{SigningKey, TokenService};
pub use payment_service::PaymentService;
