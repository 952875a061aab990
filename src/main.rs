pub mod config;
pub mod credential;
pub mod diagnostics;
pub mod error;
pub mod gateway;
pub mod gemini;
pub mod generation;
pub mod imaging;
pub mod logging;
pub mod scenario;
pub mod util;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::Config::load().context("加载配置失败")?;

    init_tracing();

    let source = credential::CredentialSource::from_config(&cfg.api_keys_pool, &cfg.legacy_api_key);
    if source.is_empty() {
        tracing::warn!("未配置 API Key（API_KEYS_POOL / API_KEY），生成请求将直接失败");
    } else {
        tracing::info!("已加载 {} 个 API Key", source.len());
    }

    let backend = Arc::new(gemini::GeminiClient::new(&cfg).context("初始化 GeminiClient 失败")?);
    let preference = Arc::new(credential::FilePreferenceStore::open(cfg.preference_path()).await);
    let catalog = scenario::ScenarioCatalog::new(&cfg).context("初始化场景目录失败")?;
    if !cfg.scenario_catalog_enabled() {
        tracing::info!("未配置 SUPABASE_URL，场景列表使用内置场景");
    }

    let state = Arc::new(gateway::api::AppState {
        generator: generation::Generator::from_config(backend.clone(), preference.clone(), &cfg),
        prober: diagnostics::Prober::from_config(backend, &cfg),
        catalog,
        log_level: cfg.log_level(),
    });
    let app = gateway::router(state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], cfg.port)));

    tracing::info!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("绑定监听端口失败")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("服务异常退出")?;

    preference.persisted().await;
    Ok(())
}

fn init_tracing() {
    // DEBUG 只控制请求/响应转储；本项目自身日志至少保持 info。
    let env = std::env::var("RUST_LOG").unwrap_or_default();
    let env = env.trim();
    let filter = if env.is_empty() {
        EnvFilter::new("warn,mockgen=info")
    } else if env.contains("mockgen") {
        EnvFilter::new(env)
    } else {
        EnvFilter::new(format!("{env},mockgen=info"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .try_init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("收到退出信号，准备关闭服务...");
}
