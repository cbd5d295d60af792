// 静态资源来源：本地目录或远程源站

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Url};
use tokio::fs;

use super::{CachedAsset, OfflineError, OfflineResult};
use crate::provider::mime::content_type_for;

/// 静态资源来源
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// 获取一个资源，绕过任何中间缓存
    ///
    /// `path` 相对作用域，可带查询串；`/` 或空串表示首页
    async fn fetch(&self, path: &str) -> OfflineResult<CachedAsset>;
}

/// 去掉查询串与开头的 `/`
fn asset_path(path: &str) -> &str {
    let path = path.split('?').next().unwrap_or_default();
    path.trim_start_matches('/')
}

/// 本地静态资源目录
#[derive(Debug, Clone)]
pub struct DirAssetSource {
    root: PathBuf,
}

impl DirAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl AssetSource for DirAssetSource {
    async fn fetch(&self, path: &str) -> OfflineResult<CachedAsset> {
        let relative = match asset_path(path) {
            "" => "index.html",
            other => other,
        };

        let decoded = urlencoding::decode(relative)
            .map_err(|_| OfflineError::NotFound(path.to_string()))?;
        if decoded
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(OfflineError::NotFound(path.to_string()));
        }

        let file = self.root.join(decoded.as_ref());
        let body = match fs::read(&file).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OfflineError::NotFound(path.to_string()))
            }
            // 目录等无法读取的情况按不存在处理
            Err(e) if file.is_dir() => {
                tracing::debug!("资源是目录: {:?} ({})", file, e);
                return Err(OfflineError::NotFound(path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(CachedAsset {
            body,
            content_type: content_type_for(&decoded).to_string(),
        })
    }
}

/// 远程源站
#[derive(Debug, Clone)]
pub struct HttpAssetSource {
    client: Client,
    base: Url,
}

impl HttpAssetSource {
    /// `base` 为源站上对应作用域的 URL
    pub fn new(base: &str) -> OfflineResult<Self> {
        let mut base = Url::parse(base).map_err(|e| OfflineError::InvalidUrl(e.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client, base })
    }
}

#[async_trait]
impl AssetSource for HttpAssetSource {
    async fn fetch(&self, path: &str) -> OfflineResult<CachedAsset> {
        let url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|e| OfflineError::InvalidUrl(e.to_string()))?;

        let response = self
            .client
            .get(url)
            .header(header::CACHE_CONTROL, "no-store")
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(OfflineError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            return Err(OfflineError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| content_type_for(asset_path(path)).to_string());
        let body = response.bytes().await?.to_vec();

        Ok(CachedAsset { body, content_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn asset_dir() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("index.html"), b"<h1>app</h1>").unwrap();
        std::fs::write(temp_dir.path().join("index.css"), b"body{}").unwrap();
        std::fs::create_dir(temp_dir.path().join("img")).unwrap();
        temp_dir
    }

    #[tokio::test]
    async fn test_root_aliases_index() {
        let dir = asset_dir();
        let source = DirAssetSource::new(dir.path());

        let root = source.fetch("/").await.unwrap();
        assert_eq!(root.body, b"<h1>app</h1>");
        assert_eq!(root.content_type, "text/html; charset=utf-8");
        assert_eq!(source.fetch("").await.unwrap(), root);
    }

    #[tokio::test]
    async fn test_query_is_ignored() {
        let dir = asset_dir();
        let source = DirAssetSource::new(dir.path());

        let css = source.fetch("index.css?v=3").await.unwrap();
        assert_eq!(css.body, b"body{}");
        assert_eq!(css.content_type, "text/css; charset=utf-8");
    }

    #[tokio::test]
    async fn test_missing_and_escaping_paths() {
        let dir = asset_dir();
        let source = DirAssetSource::new(dir.path().join("img"));

        assert!(matches!(
            source.fetch("nope.js").await,
            Err(OfflineError::NotFound(_))
        ));
        assert!(matches!(
            source.fetch("../index.html").await,
            Err(OfflineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_directory_is_not_an_asset() {
        let dir = asset_dir();
        let source = DirAssetSource::new(dir.path());

        assert!(matches!(
            source.fetch("img").await,
            Err(OfflineError::NotFound(_))
        ));
    }

    #[test]
    fn test_http_source_base_gets_trailing_slash() {
        let source = HttpAssetSource::new("https://example.com/app").unwrap();
        assert_eq!(source.base.as_str(), "https://example.com/app/");
    }
}
