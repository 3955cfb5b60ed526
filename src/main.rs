mod api;
mod auth;
mod clock;
mod common;
mod gate;
mod http_client;
mod model;
mod optimizer;
mod store;

use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::Parser;

use crate::api::{AppState, create_router};
use crate::auth::TokenVerifier;
use crate::clock::SystemClock;
use crate::gate::RateGate;
use crate::model::arg::Args;
use crate::model::config::{Config, ENV_JWT_SECRET, ENV_UPSTREAM_API_KEY};
use crate::optimizer::{AnthropicBackend, InvokerConfig, OptimizationInvoker, RequestHandler};
use crate::store::{SqliteSubmissionStore, SubmissionStore, retention};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 不存在时忽略
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // 加载配置
    let config_path = args
        .config
        .unwrap_or_else(|| Config::default_config_path().to_string());
    let mut config = Config::load(&config_path)
        .with_context(|| format!("加载配置失败: {}", config_path))?;
    config.apply_env_overrides();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    config.validate()?;
    if let Some(path) = config.config_path() {
        tracing::debug!("配置文件: {}", path.display());
    }

    let api_key = config.upstream_api_key.clone().ok_or_else(|| {
        anyhow!(
            "缺少上游 API Key，请在配置文件中设置 upstreamApiKey 或设置环境变量 {}",
            ENV_UPSTREAM_API_KEY
        )
    })?;
    let jwt_secret = config.jwt_secret.clone().ok_or_else(|| {
        anyhow!(
            "缺少 JWT 密钥，请在配置文件中设置 jwtSecret 或设置环境变量 {}",
            ENV_JWT_SECRET
        )
    })?;

    // 存储
    let store: Arc<dyn SubmissionStore> = Arc::new(
        SqliteSubmissionStore::open(&config.db_path)
            .with_context(|| format!("打开数据库失败: {}", config.db_path))?,
    );
    tracing::info!("数据库已打开: {}", config.db_path);

    // 上游
    let client = http_client::build_client(config.proxy_url.as_deref(), config.upstream_timeout())?;
    if let Some(proxy) = &config.proxy_url {
        tracing::info!("已配置上游代理: {}", proxy);
    }
    let backend = Arc::new(AnthropicBackend::new(
        client,
        config.upstream_base_url.clone(),
        api_key,
        config.upstream_model.clone(),
        config.upstream_max_tokens,
    ));
    let invoker = OptimizationInvoker::new(backend, InvokerConfig::from_config(&config));

    let gate = RateGate::new(store.clone(), config.cooldown());
    let handler = RequestHandler::new(
        gate,
        invoker,
        store.clone(),
        Arc::new(SystemClock),
        config.retention_cap,
    );

    let state = AppState::new(handler, store.clone(), TokenVerifier::new(&jwt_secret));
    let app = create_router(state);

    let sweeper = retention::start_retention_task(
        store,
        config.retention_cap,
        config.retention_sweep_interval(),
    );

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("启动提示词优化服务: {}", addr);
    tracing::info!(
        model = %config.upstream_model,
        cooldown_secs = config.cooldown_secs,
        retention_cap = config.retention_cap,
        "服务配置"
    );
    tracing::info!("可用 API:");
    tracing::info!("  POST /api/optimize");
    tracing::info!("  GET  /api/history");
    tracing::info!("  GET  /api/history/{{id}}");
    tracing::info!("  DELETE /api/history/{{id}}");
    tracing::info!("  GET  /health");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("监听地址失败: {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("监听退出信号失败: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("收到退出信号，正在关闭服务");
}
