// mallpay 服务入口
// 初始化日志与配置，选择存储后端，启动吊销表清理任务和HTTP服务

use std::io;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use chrono::Local;
use log::{info, warn};
use mallpay::config::Config;
use mallpay::middleware::{create_cors, RequestLogging};
use mallpay::routes::configure;
use mallpay::services::TokenService;
use mallpay::state::AppState;
use mallpay::store::PostgresStore;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    let mut log_builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    log_builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S %:z"),
                record.level(),
                record.args()
            )
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e)) // 转换为 io::Result
        })
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // 选择存储后端
    let app_state = match config.database.url.clone() {
        Some(url) => {
            let store = PostgresStore::connect(&config.database, &url).await?;
            store.migrate().await?;
            info!("Using PostgreSQL store");
            AppState::new(Arc::new(store), config.clone())
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory store; data is lost on restart");
            AppState::in_memory(config.clone())
        }
    };
    let app_state = web::Data::new(app_state);

    if config.security.callback_secret.is_none() {
        warn!("PAYMENT_CALLBACK_SECRET not set, all payment callbacks will be rejected");
    }
    if config.security.issuer_secret.is_none() {
        warn!("TOKEN_ISSUER_SECRET not set, token issue endpoint is disabled");
    }

    spawn_revocation_sweeper(
        app_state.token_service.clone(),
        config.security.revocation_sweep_interval,
    );

    let bind_address = config.bind_address();
    let cors_origins = config.server.cors_allowed_origins.clone();
    info!("Starting mallpay on {}", bind_address);

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(create_cors(&cors_origins))
            .wrap(RequestLogging)
            .configure(configure)
    });
    if let Some(workers) = config.server.workers {
        server = server.workers(workers);
    }

    server
        .bind(&bind_address)
        .with_context(|| format!("Failed to bind {}", bind_address))?
        .run()
        .await
        .context("HTTP server terminated with error")?;

    info!("mallpay stopped");
    Ok(())
}

/// 定期清理已过自然过期时间的吊销记录
fn spawn_revocation_sweeper(token_service: TokenService, interval_secs: u64) {
    actix_web::rt::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            if let Err(e) = token_service.sweep_revocations(chrono::Utc::now()).await {
                log::error!("Revocation sweep failed: {}", e);
            }
        }
    });
}
