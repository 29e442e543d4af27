// mallpay 订单支付结算与令牌认证服务
// 对外提供令牌签发/验证/续期以及支付创建/回调/查询接口

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod utils;
