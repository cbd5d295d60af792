//! 主机请求的响应
//!
//! 主机路由边界上只有两种结果：200 加正文，或 404 加说明页。
//! 所有错误都在本地记录日志，不以 5xx 暴露给调用方。

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use super::channel::ChannelError;
use crate::listing::escape_html;
use crate::provider::mime::{HTML_UTF8, OCTET_STREAM};
use crate::types::HostName;

/// 成功响应的缓存策略：每次都要从文件夹重新读取
pub const NO_STORE: &str = "no-store";

/// 主机路由错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteError {
    /// 注册表中没有该主机
    #[error("主机不存在: {host_name}")]
    HostNotFound { host_name: HostName },
    /// 注册的上下文已不可达
    #[error("主机 {host_name} 的上下文已消失")]
    ClientGone { host_name: HostName },
    /// 会话无法解析路径
    #[error("主机 {host_name} 无法提供路径 '{path}'")]
    PathNotFound { host_name: HostName, path: String },
    /// 没有收到回复
    #[error("主机 {host_name} 未回复路径 '{path}': {source}")]
    ChannelFailure {
        host_name: HostName,
        path: String,
        source: ChannelError,
    },
}

impl RouteError {
    /// 说明页正文
    pub fn body(&self) -> String {
        match self {
            Self::HostNotFound { host_name } => format!(
                "<h1>Host not found</h1><p>The host '<em>{}</em>' does not appear to be running. \
                 Make sure you have chosen a folder to serve. \
                 Alternatively you might have closed the host's browser tab.</p>",
                escape_html(host_name.as_str())
            ),
            Self::ClientGone { host_name } => format!(
                "<h1>Client not found</h1><p>A client for the host '<em>{}</em>' does not appear \
                 to be running. You might have closed its browser tab.</p>",
                escape_html(host_name.as_str())
            ),
            Self::PathNotFound { host_name, path } => format!(
                "<h1>File not found</h1><p>The host '<em>{}</em>' was not able to return a file \
                 for the path '<em>{}</em>'. Check the file exists in the folder you chose to serve.</p>",
                escape_html(host_name.as_str()),
                escape_html(path)
            ),
            Self::ChannelFailure { host_name, path, .. } => format!(
                "<h1>No reply from host</h1><p>The host '<em>{}</em>' did not answer the request \
                 for the path '<em>{}</em>'. Its browser tab may be busy or closing.</p>",
                escape_html(host_name.as_str()),
                escape_html(path)
            ),
        }
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, HTML_UTF8)],
            self.body(),
        )
            .into_response()
    }
}

/// 主机请求的成功响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostResponse {
    pub body: Vec<u8>,
    pub content_type: String,
}

impl IntoResponse for HostResponse {
    fn into_response(self) -> Response {
        let content_type = HeaderValue::from_str(&self.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(OCTET_STREAM));

        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type),
                (header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE)),
            ],
            self.body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_responses_are_404() {
        let errors = vec![
            RouteError::HostNotFound {
                host_name: HostName::new("host2"),
            },
            RouteError::ClientGone {
                host_name: HostName::new("host"),
            },
            RouteError::PathNotFound {
                host_name: HostName::new("host"),
                path: "missing".to_string(),
            },
            RouteError::ChannelFailure {
                host_name: HostName::new("host"),
                path: "slow".to_string(),
                source: ChannelError::Closed,
            },
        ];

        for error in errors {
            let response = error.into_response();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(response.headers()[header::CONTENT_TYPE], HTML_UTF8);
        }
    }

    #[test]
    fn test_bodies_are_distinct_and_escaped() {
        let path_error = RouteError::PathNotFound {
            host_name: HostName::new("host"),
            path: "<script>".to_string(),
        };
        assert!(path_error.body().contains("File not found"));
        assert!(path_error.body().contains("&lt;script&gt;"));

        let host_error = RouteError::HostNotFound {
            host_name: HostName::new("host2"),
        };
        assert!(host_error.body().contains("Host not found"));
        assert!(host_error.body().contains("host2"));
    }

    #[test]
    fn test_success_disables_caching() {
        let response = HostResponse {
            body: b"<h1>hi</h1>".to_vec(),
            content_type: HTML_UTF8.to_string(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], NO_STORE);
    }
}
