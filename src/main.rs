//! # vrshell 会话层演示
//!
//! 在 Mock 引擎上驱动会话注册表，演示会话创建、窗口绑定、导航、引擎切换、崩溃恢复和持久化。
//!
//! ## 环境变量
//! - `VRSHELL_CONFIG`: TOML 配置文件路径（未设置时从 `VRSHELL_*` 环境变量读取）
//! - `RUST_LOG`: 日志过滤（默认使用配置中的 `log_level`）

use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use vrshell_session::{
    engine::{ClearDataFlags, EngineEventKind, MockEngineRuntime},
    history::{InMemoryHistoryStore, VisitRecorder},
    CaptureOutcome, SessionRegistry, ShellConfig, SurfaceGeometry, WindowId, WindowSurfaceBinding,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::var("VRSHELL_CONFIG") {
        Ok(path) => ShellConfig::from_file(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => ShellConfig::from_env().context("reading VRSHELL_* variables")?,
    };

    // Initialize tracing - RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    info!("vrshell-session demo v{}", vrshell_session::VERSION);

    let runtime = Arc::new(MockEngineRuntime::new());
    let registry = SessionRegistry::new(runtime.clone(), config.clone());

    tokio::select! {
        result = run_demo(&registry, &runtime, &config) => result?,
        _ = tokio::signal::ctrl_c() => warn!("Interrupted"),
    }

    let persisted = registry.persistable_sessions();
    info!("Persisting {} sessions", persisted.len());
    for session in &persisted {
        info!("{}", session.to_json()?);
    }

    registry.shutdown_all();
    info!("Demo complete");
    Ok(())
}

async fn run_demo(
    registry: &Arc<SessionRegistry>,
    runtime: &Arc<MockEngineRuntime>,
    config: &ShellConfig,
) -> anyhow::Result<()> {
    let history = Arc::new(InMemoryHistoryStore::new());

    let session = registry.create_session(false, None).await?;
    session.set_history_delegate(Some(Arc::new(VisitRecorder::new(history.clone()))));
    registry.set_active_session(session.id())?;

    let window = WindowSurfaceBinding::new(
        WindowId(1),
        SurfaceGeometry::new(1600, 900).with_border(8),
        config,
    );
    window.attach(&session)?;
    registry.process_pending_events().await;
    info!("Window 1 shows {}", session.current_uri());

    registry.set_region(Some("DE"));
    registry.process_pending_events().await;

    session.load_uri(Some("https://m.example.com/articles"));
    registry.process_pending_events().await;
    session.set_user_agent_mode(vrshell_session::session::UserAgentMode::Desktop);
    registry.process_pending_events().await;
    info!("Desktop mode loaded {}", session.current_uri());

    if session.toggle_alternate_engine().await {
        registry.process_pending_events().await;
        info!("Session now on {:?}", session.current_handle_id());
    }

    // Simulate an engine process crash
    if let Some(handle) = session.current_handle_id().and_then(|id| runtime.handle(id)) {
        handle.emit(EngineEventKind::Crash);
        registry.process_pending_events().await;
        info!("Recovered from crash at {}", session.current_uri());
    }

    session.clear_cache(ClearDataFlags::ALL_CACHES).await?;
    registry.process_pending_events().await;
    info!("Caches cleared, session at {}", session.current_uri());

    match window.capture_thumbnail().await {
        CaptureOutcome::Captured => info!("Thumbnail captured"),
        other => warn!("Thumbnail capture: {:?}", other),
    }

    let private = registry.create_session(true, None).await?;
    registry.process_pending_events().await;
    info!("Private session {} started", private.id());

    window.detach();
    registry.clear_active_session();
    registry.destroy_session(&private);

    Ok(())
}
