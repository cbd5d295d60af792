//! 路由器服务
//!
//! 拦截作用域内的所有请求：主机请求经回复通道转给持有文件夹的会话，
//! 其余同源请求走离线缓存，其他源的请求原样转发。

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderName, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::channel::open_channel;
use super::classify::{Classifier, RequestRoute};
use super::clients::ClientManager;
use super::messages::{ControlMessage, HostStarted, RouterMessage};
use super::response::{HostResponse, RouteError};
use crate::offline::{OfflineAssets, OfflineError};
use crate::registry::HostRegistry;
use crate::store::StoreResult;
use crate::types::{ClientId, FetchReply, HostName};

/// 转发请求体的大小上限
const MAX_FORWARD_BODY: usize = 64 * 1024 * 1024;

/// 不随转发传递的逐跳头
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
    "content-length",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.contains(&name)
}

/// 主机概要（用于主机列表接口）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSummary {
    pub host_name: HostName,
    pub client_id: ClientId,
    pub connected: bool,
    pub url: String,
}

/// 路由器服务
pub struct RouterService {
    registry: HostRegistry,
    clients: ClientManager,
    classifier: Classifier,
    offline: Option<Arc<OfflineAssets>>,
    http: reqwest::Client,
    rpc_timeout: Option<Duration>,
    ready: watch::Sender<bool>,
    shutdown: CancellationToken,
}

impl RouterService {
    /// 创建路由器
    ///
    /// - `rpc_timeout`: 等待会话回复的时限，None 表示只等通道关闭
    pub fn new(
        registry: HostRegistry,
        classifier: Classifier,
        offline: Option<Arc<OfflineAssets>>,
        rpc_timeout: Option<Duration>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        let (ready, _) = watch::channel(false);

        Ok(Self {
            registry,
            clients: ClientManager::new(),
            classifier,
            offline,
            http,
            rpc_timeout,
            ready,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn registry(&self) -> &HostRegistry {
        &self.registry
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    /// 作用域 URL
    pub fn scope(&self) -> &str {
        self.classifier.scope()
    }

    /// 作用域路径，例如 `/`
    pub fn scope_path(&self) -> &str {
        self.classifier.scope_path()
    }

    // ==================== 生命周期 ====================

    /// 安装：保存离线文件，随后进入就绪状态
    ///
    /// 保存失败只记录日志，不影响就绪
    pub async fn install(&self) {
        if let Some(offline) = &self.offline {
            match offline.install().await {
                Ok(count) => info!(
                    "离线文件已保存: {} 个 (缓存版本 {})",
                    count,
                    offline.cache().name()
                ),
                Err(e) => error!("保存离线文件失败: {}", e),
            }
        }
        self.mark_ready();
    }

    pub fn mark_ready(&self) {
        self.ready.send_replace(true);
        info!("路由器已就绪");
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// 等待路由器就绪，超时返回 false
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        let mut ready = self.ready.subscribe();
        tokio::time::timeout(timeout, async move { ready.wait_for(|r| *r).await.is_ok() })
            .await
            .unwrap_or(false)
    }

    /// 关闭路由器，所有等待中的请求立即结束
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        info!("路由器已关闭");
    }

    // ==================== 会话控制 ====================

    /// 会话连接，返回其收件箱
    pub fn connect(&self, client_id: ClientId) -> mpsc::UnboundedReceiver<RouterMessage> {
        self.clients.register(client_id)
    }

    /// 会话主动断开
    pub fn disconnect(&self, client_id: &ClientId) {
        self.clients.unregister(client_id);
    }

    /// 投递控制消息，异步处理
    pub fn post(self: &Arc<Self>, from: ClientId, message: ControlMessage) -> JoinHandle<()> {
        let router = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = router.handle_control(&from, message).await {
                error!("处理控制消息失败: {} - {}", from, e);
            }
        })
    }

    /// 处理控制消息
    pub async fn handle_control(&self, from: &ClientId, message: ControlMessage) -> StoreResult<()> {
        match message {
            ControlMessage::HostStart => {
                self.start_host(from).await?;
            }
            ControlMessage::HostStop { host_name } => {
                self.stop_host(&host_name).await?;
            }
        }
        Ok(())
    }

    /// 为会话分配主机名并回复 `start-ok`
    pub async fn start_host(&self, client_id: &ClientId) -> StoreResult<HostStarted> {
        let connected = self.clients.connection_count();
        let host_name = self.registry.allocate(client_id, connected).await?;

        let started = HostStarted {
            host_name,
            scope: self.scope().to_string(),
        };
        info!("主机已启动: {} -> {}", started.host_name, client_id);

        if !self
            .clients
            .send_to(client_id, RouterMessage::StartOk(started.clone()))
        {
            warn!("无法通知会话主机已启动: {}", client_id);
        }
        Ok(started)
    }

    /// 注销主机
    pub async fn stop_host(&self, host_name: &HostName) -> StoreResult<()> {
        self.registry.delete(host_name).await?;
        info!("主机已停止: {}", host_name);
        Ok(())
    }

    /// 列出注册表中的主机
    pub async fn hosts(&self) -> StoreResult<Vec<HostSummary>> {
        let entries = self.registry.entries().await?;
        Ok(entries
            .into_iter()
            .map(|(host_name, client_id)| HostSummary {
                connected: self.clients.get(&client_id).is_some(),
                url: format!("{}{}/", self.scope(), host_name),
                host_name,
                client_id,
            })
            .collect())
    }

    // ==================== 请求分发 ====================

    /// 向持有主机的会话请求一个路径
    pub async fn host_fetch(&self, host_name: &HostName, path: &str) -> Result<HostResponse, RouteError> {
        let client_id = match self.registry.get(host_name).await {
            Ok(Some(client_id)) => client_id,
            Ok(None) => {
                return Err(RouteError::HostNotFound {
                    host_name: host_name.clone(),
                })
            }
            Err(e) => {
                error!("读取主机注册表失败: {} - {}", host_name, e);
                return Err(RouteError::HostNotFound {
                    host_name: host_name.clone(),
                });
            }
        };

        let client_gone = || RouteError::ClientGone {
            host_name: host_name.clone(),
        };
        let client = self.clients.get(&client_id).ok_or_else(client_gone)?;

        let (reply, pending) = open_channel();
        let sent = client.post(RouterMessage::Fetch {
            path: path.to_string(),
            reply,
        });
        if !sent {
            return Err(client_gone());
        }

        match pending.wait(self.rpc_timeout, &self.shutdown).await {
            Ok(FetchReply::Ok { body, content_type }) => Ok(HostResponse { body, content_type }),
            Ok(FetchReply::NotFound) => Err(RouteError::PathNotFound {
                host_name: host_name.clone(),
                path: path.to_string(),
            }),
            Err(source) => Err(RouteError::ChannelFailure {
                host_name: host_name.clone(),
                path: path.to_string(),
                source,
            }),
        }
    }

    /// 处理一个被拦截的请求
    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let target = request.uri().to_string();
        let url = match self.classifier.request_url(&target) {
            Ok(url) => url,
            Err(e) => {
                debug!("无法解析请求: {} - {:#}", target, e);
                return StatusCode::BAD_REQUEST.into_response();
            }
        };

        match self.classifier.classify(&url) {
            RequestRoute::Host { host_name, path } => {
                match self.host_fetch(&host_name, &path).await {
                    Ok(response) => response.into_response(),
                    Err(e) => {
                        warn!("{}", e);
                        e.into_response()
                    }
                }
            }
            RequestRoute::Offline { path } => self.offline_fetch(&path).await,
            RequestRoute::PassThrough => self.pass_through(url, request).await,
            RequestRoute::OutOfScope => {
                debug!("请求不在作用域内: {}", url);
                StatusCode::NOT_FOUND.into_response()
            }
        }
    }

    async fn offline_fetch(&self, path: &str) -> Response {
        let Some(offline) = &self.offline else {
            return StatusCode::NOT_FOUND.into_response();
        };

        match offline.fetch(path).await {
            Ok(asset) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, asset.content_type)],
                asset.body,
            )
                .into_response(),
            Err(OfflineError::NotFound(_)) => StatusCode::NOT_FOUND.into_response(),
            Err(e) => {
                warn!("获取静态资源失败: {} - {}", path, e);
                StatusCode::BAD_GATEWAY.into_response()
            }
        }
    }

    /// 其他源的请求原样转发
    async fn pass_through(&self, url: reqwest::Url, request: Request<Body>) -> Response {
        match self.forward(url.clone(), request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("转发请求失败: {} - {:#}", url, e);
                StatusCode::BAD_GATEWAY.into_response()
            }
        }
    }

    async fn forward(&self, url: reqwest::Url, request: Request<Body>) -> anyhow::Result<Response> {
        let (parts, body) = request.into_parts();
        let body = to_bytes(body, MAX_FORWARD_BODY).await?;

        let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())?;
        let mut outgoing = self.http.request(method, url).body(body.to_vec());
        for (name, value) in parts.headers.iter() {
            if name == header::HOST || is_hop_by_hop(name.as_str()) {
                continue;
            }
            outgoing = outgoing.header(name.as_str(), value.as_bytes());
        }

        let upstream = outgoing.send().await?;
        let mut response = Response::builder().status(upstream.status().as_u16());
        for (name, value) in upstream.headers().iter() {
            if is_hop_by_hop(name.as_str()) {
                continue;
            }
            let name = HeaderName::from_bytes(name.as_str().as_bytes())?;
            let value = HeaderValue::from_bytes(value.as_bytes())?;
            response = response.header(name, value);
        }
        let bytes = upstream.bytes().await?;

        Ok(response.body(Body::from(bytes))?)
    }
}
