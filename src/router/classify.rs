//! 拦截请求分类

use anyhow::{Context, Result};
use regex::Regex;
use reqwest::Url;

use crate::types::HostName;

/// 请求去向
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestRoute {
    /// 其他源的请求，原样转发
    PassThrough,
    /// 同源但不在作用域内，路由器不处理
    OutOfScope,
    /// 作用域内的普通请求，交给离线缓存
    Offline { path: String },
    /// 主机请求
    Host { host_name: HostName, path: String },
}

/// 请求分类器
///
/// 以作用域 URL 为基准，去掉作用域前缀后匹配 `^host\d*/`
#[derive(Debug, Clone)]
pub struct Classifier {
    scope: Url,
    host_pattern: Regex,
}

impl Classifier {
    /// `scope_url` 必须以 `/` 结尾，例如 `http://127.0.0.1:8080/`
    pub fn new(scope_url: &str) -> Result<Self> {
        let scope = Url::parse(scope_url).context("作用域 URL 无效")?;
        if !scope.path().ends_with('/') {
            anyhow::bail!("作用域 URL 必须以 / 结尾: {}", scope_url);
        }

        Ok(Self {
            scope,
            host_pattern: Regex::new(r"^host\d*/")?,
        })
    }

    /// 作用域 URL
    pub fn scope(&self) -> &str {
        self.scope.as_str()
    }

    /// 作用域路径部分，例如 `/` 或 `/serve/`
    pub fn scope_path(&self) -> &str {
        self.scope.path()
    }

    /// 把请求目标（`/path?query` 或完整 URL）还原为完整 URL
    pub fn request_url(&self, target: &str) -> Result<Url> {
        self.scope
            .join(target)
            .with_context(|| format!("无法解析请求 URL: {}", target))
    }

    /// 分类一个完整请求 URL
    pub fn classify(&self, url: &Url) -> RequestRoute {
        if url.origin() != self.scope.origin() {
            return RequestRoute::PassThrough;
        }

        let Some(relative) = url.as_str().strip_prefix(self.scope.as_str()) else {
            return RequestRoute::OutOfScope;
        };

        match self.host_pattern.find(relative) {
            Some(m) => {
                let host_segment = m.as_str();
                RequestRoute::Host {
                    host_name: HostName::new(&host_segment[..host_segment.len() - 1]),
                    path: relative[m.end()..].to_string(),
                }
            }
            None => RequestRoute::Offline {
                path: relative.to_string(),
            },
        }
    }
}
