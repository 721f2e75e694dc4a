use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;
use tokio::sync::broadcast;

use dice_session_backend::config::{
    Config, LimitsConfig, RateLimitConfig, SessionConfig, WorkerConfig,
};
use dice_session_backend::routes::build_router;
use dice_session_backend::session::events::SessionEvents;
use dice_session_backend::state::AppState;
use dice_session_backend::store::Store;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    _temp_dir: TempDir,
}

pub fn test_config(sled_path: String) -> Config {
    // 直接构造 Config，避免使用 set_var 造成多线程测试环境变量竞态
    Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path,
        cors_origin: "*".to_string(),
        trust_proxy: false,
        rate_limit: RateLimitConfig {
            window_secs: 60,
            max_requests: 100,
            max_allocations: 20,
        },
        worker: WorkerConfig {
            is_leader: false,
            ..WorkerConfig::default()
        },
        session: SessionConfig::default(),
        limits: LimitsConfig::default(),
    }
}

pub async fn spawn_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("dice-test.sled");

    let mut config = test_config(sled_path.to_string_lossy().to_string());
    configure(&mut config);

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let state = AppState::new(store, SessionEvents::new(64), &config, shutdown_tx);
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        _temp_dir: temp_dir,
    }
}

pub async fn spawn_test_app() -> TestApp {
    spawn_with(|_| {}).await
}

pub async fn spawn_test_server_with_limits(api_limit: u64) -> TestApp {
    spawn_with(|config| config.rate_limit.max_requests = api_limit).await
}
