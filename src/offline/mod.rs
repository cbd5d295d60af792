//! 离线缓存
//!
//! 安装时把资源清单中的静态文件整体写入一个带版本名的缓存目录，
//! 之后作用域内的非主机请求先查缓存，未命中再回源。
//! 版本名在不兼容变更时递增，安装新版本时删除旧版本目录。

mod source;

pub use source::{AssetSource, DirAssetSource, HttpAssetSource};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

const INDEX_FILE: &str = "index.json";

/// 离线缓存错误
#[derive(Debug, Error)]
pub enum OfflineError {
    #[error("资源不存在: {0}")]
    NotFound(String),
    #[error("资源 {path} 响应异常: HTTP {status}")]
    Status { path: String, status: u16 },
    #[error("URL 无效: {0}")]
    InvalidUrl(String),
    #[error("网络请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
    #[error("缓存索引损坏: {0}")]
    Index(#[from] serde_json::Error),
}

pub type OfflineResult<T> = std::result::Result<T, OfflineError>;

/// 一份缓存的响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAsset {
    pub body: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    file: String,
    content_type: String,
}

/// 缓存键：去掉开头的 `/`，作用域根记为 `/`
pub fn cache_key(path: &str) -> String {
    match path.trim_start_matches('/') {
        "" => "/".to_string(),
        other => other.to_string(),
    }
}

/// 带版本名的磁盘缓存
pub struct OfflineCache {
    name: String,
    dir: PathBuf,
    index: RwLock<HashMap<String, IndexEntry>>,
}

impl OfflineCache {
    /// 打开（或创建）`cache_dir/name` 下的缓存
    pub async fn open(cache_dir: &Path, name: &str) -> OfflineResult<Self> {
        let dir = cache_dir.join(name);
        fs::create_dir_all(&dir).await?;

        let index = match fs::read(dir.join(INDEX_FILE)).await {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            name: name.to_string(),
            dir,
            index: RwLock::new(index),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 查找缓存
    pub async fn match_key(&self, path: &str) -> OfflineResult<Option<CachedAsset>> {
        let entry = self.index.read().get(&cache_key(path)).cloned();
        let Some(entry) = entry else {
            return Ok(None);
        };

        match fs::read(self.dir.join(&entry.file)).await {
            Ok(body) => Ok(Some(CachedAsset {
                body,
                content_type: entry.content_type,
            })),
            // 文件被外部删掉时当作未命中
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 写入缓存
    pub async fn put(&self, path: &str, asset: &CachedAsset) -> OfflineResult<()> {
        let key = cache_key(path);
        let file = format!("{}.bin", urlencoding::encode(&key));
        fs::write(self.dir.join(&file), &asset.body).await?;

        self.index.write().insert(
            key,
            IndexEntry {
                file,
                content_type: asset.content_type.clone(),
            },
        );
        self.save_index().await
    }

    async fn save_index(&self) -> OfflineResult<()> {
        let data = serde_json::to_vec_pretty(&*self.index.read())?;
        fs::write(self.dir.join(INDEX_FILE), data).await?;
        Ok(())
    }

    /// 删除同一缓存根目录下其他版本的缓存
    pub async fn prune_other_versions(&self) -> OfflineResult<usize> {
        let Some(root) = self.dir.parent() else {
            return Ok(0);
        };

        let mut removed = 0;
        let mut entries = fs::read_dir(root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy() == self.name.as_str() {
                continue;
            }
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            match fs::remove_dir_all(entry.path()).await {
                Ok(()) => {
                    removed += 1;
                    debug!("已删除旧版本离线缓存: {:?}", entry.path());
                }
                Err(e) => warn!("删除旧版本离线缓存失败: {:?}, 错误: {}", entry.path(), e),
            }
        }
        Ok(removed)
    }
}

/// 离线缓存与回源的组合
pub struct OfflineAssets {
    cache: OfflineCache,
    source: Arc<dyn AssetSource>,
    manifest: Vec<String>,
}

impl OfflineAssets {
    pub fn new(cache: OfflineCache, source: Arc<dyn AssetSource>, manifest: Vec<String>) -> Self {
        Self {
            cache,
            source,
            manifest,
        }
    }

    pub fn cache(&self) -> &OfflineCache {
        &self.cache
    }

    /// 保存清单中的全部文件
    ///
    /// 全部获取成功才写入缓存，任何一个失败都不写入
    pub async fn install(&self) -> OfflineResult<usize> {
        info!("正在保存 {} 个离线文件...", self.manifest.len());

        let assets = futures::future::try_join_all(
            self.manifest.iter().map(|path| self.source.fetch(path)),
        )
        .await?;

        for (path, asset) in self.manifest.iter().zip(&assets) {
            self.cache.put(path, asset).await?;
        }

        let pruned = self.cache.prune_other_versions().await?;
        if pruned > 0 {
            info!("已清理 {} 个旧版本离线缓存", pruned);
        }

        Ok(assets.len())
    }

    /// 优先使用缓存，未命中或读取出错时回源
    pub async fn fetch(&self, path: &str) -> OfflineResult<CachedAsset> {
        match self.cache.match_key(path).await {
            Ok(Some(asset)) => return Ok(asset),
            Ok(None) => {}
            Err(e) => warn!("读取离线缓存失败: {} - {}", path, e),
        }
        self.source.fetch(path).await
    }
}
