// 应用状态

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::offline::{AssetSource, DirAssetSource, HttpAssetSource, OfflineAssets, OfflineCache};
use crate::registry::HostRegistry;
use crate::router::{Classifier, RouterService};
use crate::session::{Folder, HostSession, SessionOptions};
use crate::store::{KvStore, SqliteStore};

/// 应用全局状态
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Arc<AppConfig>,
    /// 路由器
    pub router: Arc<RouterService>,
    /// 会话侧存储（记录上次使用的文件夹）
    pub session_store: Arc<dyn KvStore>,
    /// 本进程内的托管会话
    pub sessions: Arc<RwLock<Vec<Arc<HostSession>>>>,
}

impl AppState {
    /// 按配置打开持久化存储并创建应用状态
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let registry_store = SqliteStore::open(&config.router.registry_db, &config.router.registry_store)
            .context("打开主机注册表失败")?;
        let session_store = SqliteStore::open(&config.session.store_db, &config.session.store_name)
            .context("打开会话存储失败")?;

        Self::with_stores(config, Arc::new(registry_store), Arc::new(session_store)).await
    }

    /// 使用给定的存储创建应用状态
    pub async fn with_stores(
        config: AppConfig,
        registry_store: Arc<dyn KvStore>,
        session_store: Arc<dyn KvStore>,
    ) -> anyhow::Result<Self> {
        let classifier = Classifier::new(&config.server.scope_url())?;

        let offline = if config.offline.enabled {
            let cache = OfflineCache::open(&config.offline.cache_dir, &config.offline.cache_name)
                .await
                .context("打开离线缓存失败")?;
            let source: Arc<dyn AssetSource> = match &config.offline.upstream {
                Some(upstream) => Arc::new(HttpAssetSource::new(upstream)?),
                None => Arc::new(DirAssetSource::new(&config.offline.asset_dir)),
            };
            Some(Arc::new(OfflineAssets::new(
                cache,
                source,
                config.offline.manifest.clone(),
            )))
        } else {
            None
        };

        let router = RouterService::new(
            HostRegistry::new(registry_store),
            classifier,
            offline,
            config.router.rpc_timeout(),
        )?;

        Ok(Self {
            config: Arc::new(config),
            router: Arc::new(router),
            session_store,
            sessions: Arc::new(RwLock::new(Vec::new())),
        })
    }

    /// 托管一个文件夹
    pub async fn serve_folder(&self, folder: Folder) -> anyhow::Result<Arc<HostSession>> {
        let options = SessionOptions::from_config(&self.config.session)
            .with_store(Arc::clone(&self.session_store));
        let session = HostSession::connect(Arc::clone(&self.router), folder, options).await;
        session.start().await?;

        self.sessions.write().await.push(Arc::clone(&session));
        Ok(session)
    }

    /// 关闭：注销所有主机，再关闭路由器
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = self.sessions.write().await.drain(..).collect();
        for session in sessions {
            if let Err(e) = session.stop().await {
                warn!("停止会话失败: {} - {}", session.folder().name(), e);
            }
        }
        self.router.shutdown();
        info!("应用状态已关闭");
    }
}
