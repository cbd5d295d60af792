// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 路由器配置
    #[serde(default)]
    pub router: RouterConfig,
    /// 会话配置
    #[serde(default)]
    pub session: SessionConfig,
    /// 离线缓存配置
    #[serde(default)]
    pub offline: OfflineConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 单个日志文件最大大小（字节，默认 50MB）
    #[serde(default = "default_log_max_file_size")]
    pub max_file_size: u64,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_max_file_size() -> u64 {
    50 * 1024 * 1024 // 50MB
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
            max_file_size: default_log_max_file_size(),
        }
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_server_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// 路由器的作用域路径，所有主机都挂在它下面
    #[serde(default = "default_scope")]
    pub scope: String,
    /// 对外可见的源（反向代理后使用），默认由监听地址推出
    #[serde(default)]
    pub public_origin: Option<String>,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_scope() -> String {
    "/".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            scope: default_scope(),
            public_origin: None,
        }
    }
}

impl ServerConfig {
    /// 路由器自身的源，例如 `http://127.0.0.1:8080`
    pub fn origin(&self) -> String {
        match &self.public_origin {
            Some(origin) => origin.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }

    /// 规范化的作用域路径：以 `/` 开头并以 `/` 结尾
    pub fn scope_path(&self) -> String {
        let trimmed = self.scope.trim_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", trimmed)
        }
    }

    /// 完整的作用域 URL，例如 `http://127.0.0.1:8080/`
    pub fn scope_url(&self) -> String {
        format!("{}{}", self.origin(), self.scope_path())
    }

    /// 监听地址
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 路由器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// 主机注册表数据库文件
    #[serde(default = "default_registry_db")]
    pub registry_db: PathBuf,
    /// 注册表在数据库中的存储名
    #[serde(default = "default_registry_store")]
    pub registry_store: String,
    /// 等待会话回复的时限（秒），0 表示不设时限
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
}

fn default_registry_db() -> PathBuf {
    PathBuf::from("data/router.db")
}

fn default_registry_store() -> String {
    "host-registry".to_string()
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            registry_db: default_registry_db(),
            registry_store: default_registry_store(),
            rpc_timeout_secs: default_rpc_timeout_secs(),
        }
    }
}

impl RouterConfig {
    pub fn rpc_timeout(&self) -> Option<Duration> {
        (self.rpc_timeout_secs > 0).then(|| Duration::from_secs(self.rpc_timeout_secs))
    }
}

/// 路径中 `..` 段的处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParentSegmentPolicy {
    /// 交给目录提供者判断（本地目录会拒绝 `..`）
    #[default]
    Provider,
    /// 在解析前直接拒绝
    Reject,
}

/// 会话配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 会话侧存储数据库文件（记录上次使用的文件夹）
    #[serde(default = "default_session_store_db")]
    pub store_db: PathBuf,
    /// 会话侧存储名
    #[serde(default = "default_session_store_name")]
    pub store_name: String,
    /// `..` 段策略
    #[serde(default)]
    pub parent_segments: ParentSegmentPolicy,
    /// 等待路由器就绪的时限（毫秒）
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
    /// 等待 start-ok 回复的时限（秒）
    #[serde(default = "default_start_timeout_secs")]
    pub start_timeout_secs: u64,
}

fn default_session_store_db() -> PathBuf {
    PathBuf::from("data/session.db")
}

fn default_session_store_name() -> String {
    "host-store".to_string()
}

fn default_ready_timeout_ms() -> u64 {
    4000
}

fn default_start_timeout_secs() -> u64 {
    10
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_db: default_session_store_db(),
            store_name: default_session_store_name(),
            parent_segments: ParentSegmentPolicy::default(),
            ready_timeout_ms: default_ready_timeout_ms(),
            start_timeout_secs: default_start_timeout_secs(),
        }
    }
}

impl SessionConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }
}

/// 离线缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineConfig {
    /// 是否启用离线缓存
    #[serde(default = "default_offline_enabled")]
    pub enabled: bool,
    /// 缓存版本名，不兼容变更时递增
    #[serde(default = "default_cache_name")]
    pub cache_name: String,
    /// 缓存根目录，各版本在其下各占一个子目录
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// 静态资源目录
    #[serde(default = "default_asset_dir")]
    pub asset_dir: PathBuf,
    /// 远程资源源站；设置后从网络获取静态资源
    #[serde(default)]
    pub upstream: Option<String>,
    /// 安装时缓存的资源清单
    #[serde(default = "default_manifest")]
    pub manifest: Vec<String>,
}

fn default_offline_enabled() -> bool {
    true
}

fn default_cache_name() -> String {
    "serve-folder-offline-1".to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/offline")
}

fn default_asset_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_manifest() -> Vec<String> {
    ["/", "index.html", "index.css", "favicon.svg"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            enabled: default_offline_enabled(),
            cache_name: default_cache_name(),
            cache_dir: default_cache_dir(),
            asset_dir: default_asset_dir(),
            upstream: None,
            manifest: default_manifest(),
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);

        Ok(())
    }

    /// 加载或创建默认配置
    ///
    /// 文件不存在时写出默认配置；文件存在但解析失败时只使用默认值，不覆盖原文件
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                let default_config = Self::default();

                if !Path::new(path).exists() {
                    if let Err(e) = default_config.save_to_file(path).await {
                        tracing::error!("保存默认配置失败: {}", e);
                    }
                }

                default_config
            }
        }
    }
}
