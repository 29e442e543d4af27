// 中间件模块
// 包含Bearer令牌认证、请求日志、跨域配置

pub mod auth;
pub mod logging;
pub mod cors;

// 重新导出中间件
pub use auth::*;
pub use logging::*;
pub use cors::*;
