use anyhow::Context;
use clap::Parser;
use serve_folder::{
    cli::Cli,
    config::LogConfig,
    logging,
    server::build_app,
    session::{load_last_folder, Folder},
    AppConfig, AppState,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// 加载日志配置
///
/// 日志系统要先于完整配置初始化，这里只读取 `[log]` 段，失败时返回默认配置
async fn load_log_config(config_path: &str) -> LogConfig {
    if let Ok(content) = tokio::fs::read_to_string(config_path).await {
        if let Ok(config) = toml::from_str::<toml::Value>(&content) {
            if let Some(log_table) = config.get("log") {
                if let Ok(log_config) = log_table.clone().try_into::<LogConfig>() {
                    return log_config;
                }
            }
        }
    }

    LogConfig::default()
}

/// 根据命令行决定要托管的文件夹
async fn select_folders(cli: &Cli, state: &AppState) -> anyhow::Result<Vec<Folder>> {
    if cli.folders.is_empty() {
        if !cli.use_last {
            return Ok(Vec::new());
        }
        let Some(reference) = load_last_folder(state.session_store.as_ref()).await? else {
            warn!("没有记录上次使用的文件夹");
            return Ok(Vec::new());
        };
        info!("使用上次的文件夹: {} ({:?})", reference.name, reference.path);
        let folder = Folder::from_reference(&reference)
            .await
            .with_context(|| format!("无法打开上次的文件夹: {:?}", reference.path))?;
        return Ok(vec![folder]);
    }

    let mut folders = Vec::with_capacity(cli.folders.len());
    for path in &cli.folders {
        let folder = if cli.snapshot {
            Folder::snapshot(path).await
        } else {
            Folder::native(path).await
        }
        .with_context(|| format!("无法打开文件夹: {:?}", path))?;
        folders.push(folder);
    }
    Ok(folders)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日志系统（必须保持 _log_guard 存活）
    let log_config = load_log_config(&cli.config).await;
    let _log_guard = logging::init_logging(&log_config);

    info!("Serve Folder v{} 启动中...", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load_or_default(&cli.config).await;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    let addr = config.server.bind_addr();
    let scope_url = config.server.scope_url();

    let state = AppState::new(config).await?;
    info!("应用状态初始化完成");

    // 安装：保存离线文件后进入就绪状态
    let router = Arc::clone(&state.router);
    tokio::spawn(async move { router.install().await });

    let folders = select_folders(&cli, &state).await?;
    if folders.is_empty() {
        info!("未指定文件夹，仅提供路由与离线缓存");
    }

    let app = build_app(state.clone());

    info!("服务器启动在: http://{}", addr);
    info!("作用域: {}", scope_url);
    info!("主机列表: http://{}/api/v1/hosts", addr);
    info!("健康检查: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server = axum::serve(listener, app);

    // 监听端口后再登记主机，会话等待路由器就绪
    let serving = state.clone();
    tokio::spawn(async move {
        for folder in folders {
            let name = folder.name().to_string();
            if let Err(e) = serving.serve_folder(folder).await {
                error!("托管文件夹 '{}' 失败: {}", name, e);
            }
        }
    });

    // 使用 select! 监听关闭信号，支持优雅关闭
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("服务器错误: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("收到 Ctrl+C，开始优雅关闭...");
        }
    }

    info!("正在注销主机...");
    state.shutdown().await;
    info!("应用已安全退出");

    Ok(())
}
