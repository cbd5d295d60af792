//! 托管会话
//!
//! 一个会话持有一个文件夹，向路由器登记为主机，并回答路由器转来的 fetch。
//! 会话被丢弃时收件箱随之关闭，路由器据此判定上下文已消失。

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::folder::{save_last_folder, Folder};
use super::path::{encode_segments, has_parent_segment, normalize_request_path};
use crate::config::{ParentSegmentPolicy, SessionConfig};
use crate::listing::render_directory_listing;
use crate::provider::mime::HTML_UTF8;
use crate::provider::{DirectoryHandle, FileData, ProviderError, ProviderResult};
use crate::router::{ControlMessage, HostStarted, RouterMessage, RouterService};
use crate::store::KvStore;
use crate::types::{ClientId, FetchReply, HostName};

/// 会话错误
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("等待路由器分配主机名超时（{0:?}）")]
    StartTimeout(Duration),
    #[error("会话尚未开始托管")]
    NotStarted,
}

/// 会话选项
#[derive(Clone)]
pub struct SessionOptions {
    pub parent_segments: ParentSegmentPolicy,
    pub ready_timeout: Duration,
    pub start_timeout: Duration,
    /// 会话侧存储，用于记录上次使用的文件夹
    pub store: Option<Arc<dyn KvStore>>,
}

impl SessionOptions {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            parent_segments: config.parent_segments,
            ready_timeout: config.ready_timeout(),
            start_timeout: config.start_timeout(),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

/// 已启动主机的信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub host_name: HostName,
    /// 路由器作用域 URL
    pub scope: String,
    /// 主机根的绝对路径，例如 `/host2/`
    pub mount_path: String,
    /// 给用户打开的地址
    pub url: String,
}

impl HostInfo {
    fn new(started: HostStarted, scope_path: &str, has_index_html: bool) -> Self {
        let url = format!(
            "{}{}",
            started.host_url(),
            if has_index_html { "index.html" } else { "" }
        );
        Self {
            mount_path: format!("{}{}/", scope_path, started.host_name),
            host_name: started.host_name,
            scope: started.scope,
            url,
        }
    }
}

/// 托管会话
pub struct HostSession {
    client_id: ClientId,
    router: Arc<RouterService>,
    folder: Folder,
    has_index_html: bool,
    options: SessionOptions,
    host: watch::Sender<Option<HostInfo>>,
    inbox_task: Mutex<Option<JoinHandle<()>>>,
}

impl HostSession {
    /// 连接路由器并开始接收消息（尚未登记主机）
    pub async fn connect(
        router: Arc<RouterService>,
        folder: Folder,
        options: SessionOptions,
    ) -> Arc<Self> {
        let client_id = ClientId::generate();
        let inbox = router.connect(client_id.clone());
        let has_index_html = folder.has_index_html().await;
        let (host, _) = watch::channel(None);

        let session = Arc::new(Self {
            client_id,
            router,
            folder,
            has_index_html,
            options,
            host,
            inbox_task: Mutex::new(None),
        });

        let task = tokio::spawn(run_inbox(Arc::downgrade(&session), inbox));
        *session.inbox_task.lock() = Some(task);

        session
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn folder(&self) -> &Folder {
        &self.folder
    }

    pub fn has_index_html(&self) -> bool {
        self.has_index_html
    }

    /// 当前主机信息，`start-ok` 之前为 None
    pub fn host_info(&self) -> Option<HostInfo> {
        self.host.borrow().clone()
    }

    /// 给用户打开的地址
    pub fn hosted_url(&self) -> Option<String> {
        self.host.borrow().as_ref().map(|h| h.url.clone())
    }

    /// 开始托管
    ///
    /// 先等待路由器就绪（超时后照常继续），再请求主机名并等待 `start-ok`
    pub async fn start(&self) -> Result<HostInfo, SessionError> {
        if !self.router.wait_ready(self.options.ready_timeout).await {
            warn!(
                "等待路由器就绪超时（{:?}），继续启动",
                self.options.ready_timeout
            );
        }

        let mut host = self.host.subscribe();
        let _ = self
            .router
            .post(self.client_id.clone(), ControlMessage::HostStart);

        let started = tokio::time::timeout(self.options.start_timeout, host.wait_for(Option::is_some))
            .await
            .ok()
            .and_then(|r| r.ok().and_then(|info| (*info).clone()));
        let info = started.ok_or(SessionError::StartTimeout(self.options.start_timeout))?;

        if let (Some(store), Some(reference)) = (&self.options.store, self.folder.reference()) {
            if let Err(e) = save_last_folder(store.as_ref(), reference).await {
                warn!("记录上次使用的文件夹失败: {}", e);
            }
        }

        Ok(info)
    }

    /// 停止托管
    pub async fn stop(&self) -> Result<(), SessionError> {
        let info = self.host.send_replace(None).ok_or(SessionError::NotStarted)?;

        let stopping = self.router.post(
            self.client_id.clone(),
            ControlMessage::HostStop {
                host_name: info.host_name.clone(),
            },
        );
        if let Err(e) = stopping.await {
            warn!("停止主机失败: {} - {}", info.host_name, e);
        }

        self.router.disconnect(&self.client_id);
        info!("已停止托管 '{}'", self.folder.name());
        Ok(())
    }

    fn on_host_started(&self, started: HostStarted) {
        let info = HostInfo::new(started, self.router.scope_path(), self.has_index_html);
        info!("Serving '{}' to '{}'", self.folder.name(), info.host_name);
        info!("访问地址: {}", info.url);
        self.host.send_replace(Some(info));
    }

    /// 回答一次 fetch，任何失败都折叠为 NotFound
    pub async fn resolve(&self, path: &str) -> FetchReply {
        match self.try_resolve(path).await {
            Ok(data) => FetchReply::ok(data.bytes, data.content_type),
            Err(e) => {
                debug!("无法提供路径 '{}': {}", path, e);
                FetchReply::NotFound
            }
        }
    }

    /// 把主机内路径解析为文件内容或目录列表页
    pub async fn try_resolve(&self, path: &str) -> ProviderResult<FileData> {
        let relative =
            normalize_request_path(path).ok_or_else(|| ProviderError::NotFound(path.to_string()))?;

        if self.options.parent_segments == ParentSegmentPolicy::Reject
            && has_parent_segment(&relative)
        {
            return Err(ProviderError::InvalidName("..".to_string()));
        }

        let mut segments: Vec<&str> = relative.split('/').collect();
        let last = segments.pop().unwrap_or_default();

        let mut dir: Arc<dyn DirectoryHandle> = Arc::clone(self.folder.root());
        for segment in segments {
            dir = dir.get_directory_handle(segment).await?;
        }

        if last.is_empty() {
            return self.listing(dir.as_ref(), &relative).await;
        }

        match dir.get_directory_handle(last).await {
            Ok(sub) => self.listing(sub.as_ref(), &relative).await,
            Err(_) => dir.get_file_handle(last).await?.get_file().await,
        }
    }

    async fn listing(&self, dir: &dyn DirectoryHandle, relative: &str) -> ProviderResult<FileData> {
        // 已知挂载路径时使用绝对链接，与请求是否带结尾斜杠无关
        let dir_path = relative.strip_suffix('/').unwrap_or(relative);
        let link_base = self.host.borrow().as_ref().map(|info| {
            if dir_path.is_empty() {
                info.mount_path.clone()
            } else {
                format!("{}{}/", info.mount_path, encode_segments(dir_path))
            }
        });

        let html = render_directory_listing(dir, relative, link_base.as_deref()).await?;
        Ok(FileData {
            bytes: html.into_bytes(),
            content_type: HTML_UTF8.to_string(),
        })
    }
}

impl Drop for HostSession {
    fn drop(&mut self) {
        if let Some(task) = self.inbox_task.lock().take() {
            task.abort();
        }
    }
}

async fn run_inbox(session: Weak<HostSession>, mut inbox: mpsc::UnboundedReceiver<RouterMessage>) {
    while let Some(message) = inbox.recv().await {
        let Some(session) = session.upgrade() else {
            break;
        };

        match message {
            RouterMessage::StartOk(started) => session.on_host_started(started),
            RouterMessage::Fetch { path, reply } => {
                tokio::spawn(async move {
                    let answer = session.resolve(&path).await;
                    if !reply.send(answer) {
                        debug!("请求方已放弃等待: {}", path);
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HostRegistry;
    use crate::router::Classifier;
    use crate::store::MemoryStore;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn router() -> Arc<RouterService> {
        let registry = HostRegistry::new(Arc::new(MemoryStore::new()));
        let classifier = Classifier::new("http://127.0.0.1:8080/").unwrap();
        let router = RouterService::new(registry, classifier, None, Some(Duration::from_secs(5)))
            .unwrap();
        router.mark_ready();
        Arc::new(router)
    }

    fn body(reply: FetchReply) -> String {
        match reply {
            FetchReply::Ok { body, .. } => String::from_utf8(body).unwrap(),
            FetchReply::NotFound => panic!("expected Ok reply"),
        }
    }

    fn links(html: &str) -> HashSet<String> {
        html.split("<li>")
            .skip(1)
            .filter_map(|item| {
                let text = item.split('>').nth(1)?;
                Some(text.split('<').next()?.to_string())
            })
            .collect()
    }

    fn sample_folder() -> Folder {
        Folder::from_relative_files(vec![
            ("site/a.txt", "a".as_bytes().to_vec()),
            ("site/sub/b.txt", "b".as_bytes().to_vec()),
        ])
    }

    #[tokio::test]
    async fn test_start_assigns_host_and_url() {
        let router = router();
        let folder = Folder::from_relative_files(vec![("site/index.html", "<h1>hi</h1>")]);
        let session = HostSession::connect(router, folder, SessionOptions::default()).await;

        assert!(session.host_info().is_none());
        let info = session.start().await.unwrap();
        assert_eq!(info.host_name.as_str(), "host");
        assert_eq!(info.mount_path, "/host/");
        assert_eq!(info.url, "http://127.0.0.1:8080/host/index.html");
        assert_eq!(session.hosted_url().as_deref(), Some(info.url.as_str()));
    }

    #[tokio::test]
    async fn test_root_listing_both_forms() {
        let session = HostSession::connect(router(), sample_folder(), SessionOptions::default()).await;

        let expected: HashSet<String> = ["a.txt", "sub/"].iter().map(|s| s.to_string()).collect();
        for path in ["", "/"] {
            let html = body(session.resolve(path).await);
            assert!(html.contains("Directory listing for /"));
            assert_eq!(links(&html), expected);
        }
    }

    #[tokio::test]
    async fn test_missing_path_is_not_found() {
        let session = HostSession::connect(router(), sample_folder(), SessionOptions::default()).await;

        assert_eq!(session.resolve("missing/path").await, FetchReply::NotFound);
        assert_eq!(session.resolve("a.txt/inner").await, FetchReply::NotFound);
        assert_eq!(session.resolve("%FF").await, FetchReply::NotFound);
        // 查询串前的斜杠让文件名按目录解析
        assert_eq!(session.resolve("a.txt/?v=1").await, FetchReply::NotFound);
        assert_eq!(body(session.resolve("a.txt?v=1").await), "a");
    }

    #[tokio::test]
    async fn test_file_and_subdirectory() {
        let session = HostSession::connect(router(), sample_folder(), SessionOptions::default()).await;

        assert_eq!(body(session.resolve("sub/b.txt?cache=1").await), "b");

        let html = body(session.resolve("sub/").await);
        assert!(html.contains("Directory listing for sub/"));
        assert_eq!(links(&html), HashSet::from(["b.txt".to_string()]));
    }

    #[tokio::test]
    async fn test_listing_links_use_mount_path() {
        let session = HostSession::connect(router(), sample_folder(), SessionOptions::default()).await;

        // start-ok 之前使用相对链接
        assert!(body(session.resolve("sub").await).contains("href=\"sub/b.txt\""));

        session.start().await.unwrap();
        assert!(body(session.resolve("sub").await).contains("href=\"/host/sub/b.txt\""));
        assert!(body(session.resolve("").await).contains("href=\"/host/a.txt\""));

        let html = body(session.resolve("sub/?x=1").await);
        assert!(html.contains("Directory listing for sub/"));
        assert!(html.contains("href=\"/host/sub/b.txt\""));
    }

    #[tokio::test]
    async fn test_parent_segments_policy() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("served")).unwrap();
        std::fs::write(temp_dir.path().join("secret.txt"), b"secret").unwrap();
        let served = temp_dir.path().join("served");

        let folder = Folder::native(&served).await.unwrap();
        let session = HostSession::connect(router(), folder.clone(), SessionOptions::default()).await;
        assert_eq!(session.resolve("../secret.txt").await, FetchReply::NotFound);

        let options = SessionOptions {
            parent_segments: ParentSegmentPolicy::Reject,
            ..SessionOptions::default()
        };
        let session = HostSession::connect(router(), folder, options).await;
        assert!(matches!(
            session.try_resolve("../secret.txt").await,
            Err(ProviderError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_fresh_content_after_change() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.txt"), b"first").unwrap();

        let router = router();
        let folder = Folder::native(temp_dir.path()).await.unwrap();
        let session = HostSession::connect(Arc::clone(&router), folder, SessionOptions::default()).await;
        let host = session.start().await.unwrap().host_name;

        let first = router.host_fetch(&host, "a.txt").await.unwrap();
        assert_eq!(first.body, b"first");

        std::fs::write(temp_dir.path().join("a.txt"), b"second").unwrap();
        let second = router.host_fetch(&host, "a.txt").await.unwrap();
        assert_eq!(second.body, b"second");
    }

    #[tokio::test]
    async fn test_stop_and_drop() {
        let router = router();
        let session = HostSession::connect(Arc::clone(&router), sample_folder(), SessionOptions::default()).await;
        let host = session.start().await.unwrap().host_name;

        session.stop().await.unwrap();
        assert!(router.registry().get(&host).await.unwrap().is_none());
        assert!(matches!(session.stop().await, Err(SessionError::NotStarted)));

        // 未注销就消失的会话：路由器判定为上下文已消失
        let other = HostSession::connect(Arc::clone(&router), sample_folder(), SessionOptions::default()).await;
        let host = other.start().await.unwrap().host_name;
        let id = other.client_id().clone();
        drop(other);
        for _ in 0..100 {
            if router.clients().get(&id).is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(matches!(
            router.host_fetch(&host, "a.txt").await,
            Err(crate::router::RouteError::ClientGone { .. })
        ));
    }

    #[tokio::test]
    async fn test_start_records_native_folder() {
        let temp_dir = TempDir::new().unwrap();
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let folder = Folder::native(temp_dir.path()).await.unwrap();
        let options = SessionOptions::default().with_store(Arc::clone(&store));

        let session = HostSession::connect(router(), folder, options).await;
        session.start().await.unwrap();

        let saved = crate::session::load_last_folder(store.as_ref()).await.unwrap();
        assert_eq!(saved.as_ref(), session.folder().reference());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_proceeds_when_router_not_ready() {
        let registry = HostRegistry::new(Arc::new(MemoryStore::new()));
        let classifier = Classifier::new("http://127.0.0.1:8080/").unwrap();
        let router = Arc::new(RouterService::new(registry, classifier, None, None).unwrap());

        let session = HostSession::connect(router, sample_folder(), SessionOptions::default()).await;
        let info = session.start().await.unwrap();
        assert_eq!(info.host_name.as_str(), "host");
    }
}
