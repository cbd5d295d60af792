//! 连接上下文管理
//!
//! 每个会话连接时登记一个收件箱。会话丢弃收件箱接收端即视为上下文消失，
//! 不需要显式注销；查询时顺带清理这些已关闭的连接。

use dashmap::DashMap;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::messages::RouterMessage;
use crate::types::ClientId;

/// 已连接的上下文
#[derive(Debug)]
struct ClientConnection {
    sender: mpsc::UnboundedSender<RouterMessage>,
    connected_at: Instant,
}

/// 某个上下文的句柄，可向其投递消息
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    sender: mpsc::UnboundedSender<RouterMessage>,
}

impl ClientHandle {
    /// 投递消息；上下文已消失时返回 false
    pub fn post(&self, message: RouterMessage) -> bool {
        match self.sender.send(message) {
            Ok(()) => true,
            Err(e) => {
                warn!("投递消息失败（上下文已关闭）: {} - {}", self.id, e.0.kind());
                false
            }
        }
    }
}

/// 连接上下文管理器
#[derive(Debug, Default)]
pub struct ClientManager {
    connections: DashMap<ClientId, ClientConnection>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记上下文，返回其收件箱
    pub fn register(&self, client_id: ClientId) -> mpsc::UnboundedReceiver<RouterMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.connections.insert(
            client_id.clone(),
            ClientConnection {
                sender,
                connected_at: Instant::now(),
            },
        );
        info!("上下文已连接: {}", client_id);

        receiver
    }

    /// 移除上下文
    pub fn unregister(&self, client_id: &ClientId) {
        if let Some((_, conn)) = self.connections.remove(client_id) {
            info!(
                "上下文已断开: {} (在线 {:?})",
                client_id,
                conn.connected_at.elapsed()
            );
        }
    }

    /// 获取仍然存活的上下文句柄
    pub fn get(&self, client_id: &ClientId) -> Option<ClientHandle> {
        let sender = {
            let conn = self.connections.get(client_id)?;
            conn.sender.clone()
        };

        if sender.is_closed() {
            debug!("上下文已消失: {}", client_id);
            self.connections.remove(client_id);
            return None;
        }

        Some(ClientHandle {
            id: client_id.clone(),
            sender,
        })
    }

    /// 列出所有存活的上下文
    pub fn match_all(&self) -> Vec<ClientId> {
        self.prune_closed();
        self.connections.iter().map(|c| c.key().clone()).collect()
    }

    /// 存活上下文数量
    pub fn connection_count(&self) -> usize {
        self.prune_closed();
        self.connections.len()
    }

    /// 向指定上下文投递消息
    pub fn send_to(&self, client_id: &ClientId, message: RouterMessage) -> bool {
        match self.get(client_id) {
            Some(handle) => handle.post(message),
            None => {
                debug!("上下文不存在: {}", client_id);
                false
            }
        }
    }

    fn prune_closed(&self) {
        self.connections.retain(|id, conn| {
            let alive = !conn.sender.is_closed();
            if !alive {
                debug!("上下文已消失: {}", id);
            }
            alive
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HostName;
    use crate::router::messages::HostStarted;

    fn start_ok() -> RouterMessage {
        RouterMessage::StartOk(HostStarted {
            host_name: HostName::new("host"),
            scope: "/".to_string(),
        })
    }

    #[tokio::test]
    async fn test_register_and_send() {
        let manager = ClientManager::new();
        let id = ClientId::new("a");
        let mut inbox = manager.register(id.clone());

        assert!(manager.send_to(&id, start_ok()));
        assert!(matches!(inbox.recv().await, Some(RouterMessage::StartOk(_))));
        assert_eq!(manager.connection_count(), 1);
    }

    #[test]
    fn test_dropped_inbox_means_gone() {
        let manager = ClientManager::new();
        let a = ClientId::new("a");
        let b = ClientId::new("b");
        let _inbox_a = manager.register(a.clone());
        let inbox_b = manager.register(b.clone());

        drop(inbox_b);

        assert!(manager.get(&b).is_none());
        assert!(!manager.send_to(&b, start_ok()));
        assert_eq!(manager.match_all(), vec![a]);
    }

    #[test]
    fn test_unregister() {
        let manager = ClientManager::new();
        let id = ClientId::new("a");
        let _inbox = manager.register(id.clone());

        manager.unregister(&id);
        assert!(manager.get(&id).is_none());
        assert_eq!(manager.connection_count(), 0);
    }
}
