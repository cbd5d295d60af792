//! 单次使用的双工回复通道
//!
//! 每个被路由的请求新建一对端点：请求端持有 [`PendingReply`] 等待，
//! 会话端拿到 [`ReplyPort`] 回复。`ReplyPort::send` 消费自身，
//! 同一通道上不可能出现第二次回复。

use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::types::FetchReply;

/// 通道错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// 会话端丢弃了回复端点而未回复
    #[error("回复通道已关闭")]
    Closed,
    /// 超过等待时限
    #[error("等待回复超时（{0:?}）")]
    Timeout(Duration),
    /// 路由器正在关闭
    #[error("等待已取消")]
    Cancelled,
}

/// 打开一个新的回复通道
pub fn open_channel() -> (ReplyPort, PendingReply) {
    let (tx, rx) = oneshot::channel();
    (ReplyPort { tx }, PendingReply { rx })
}

/// 回复端点（交给会话）
#[derive(Debug)]
pub struct ReplyPort {
    tx: oneshot::Sender<FetchReply>,
}

impl ReplyPort {
    /// 发送唯一的一次回复
    ///
    /// 请求端已放弃等待时返回 false
    pub fn send(self, reply: FetchReply) -> bool {
        self.tx.send(reply).is_ok()
    }

    /// 请求端是否已放弃等待
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// 等待端点（路由器保留）
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<FetchReply>,
}

impl PendingReply {
    /// 等待回复
    ///
    /// - `timeout`: 为 None 时不设时限，只依赖通道关闭或取消
    /// - `cancel`: 路由器关闭时触发
    pub async fn wait(
        self,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<FetchReply, ChannelError> {
        let rx = self.rx;
        let receive = async move {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, rx).await {
                    Ok(Ok(reply)) => Ok(reply),
                    Ok(Err(_)) => Err(ChannelError::Closed),
                    Err(_) => Err(ChannelError::Timeout(limit)),
                },
                None => rx.await.map_err(|_| ChannelError::Closed),
            }
        };

        tokio::select! {
            result = receive => result,
            _ = cancel.cancelled() => Err(ChannelError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reply_delivered() {
        let (port, pending) = open_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(async move {
            port.send(FetchReply::ok(b"hello".to_vec(), "text/plain"));
        });

        let reply = pending.wait(None, &cancel).await.unwrap();
        assert_eq!(reply, FetchReply::ok(b"hello".to_vec(), "text/plain"));
    }

    #[tokio::test]
    async fn test_dropped_port_is_closed() {
        let (port, pending) = open_channel();
        let cancel = CancellationToken::new();

        drop(port);
        assert_eq!(pending.wait(None, &cancel).await, Err(ChannelError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let (_port, pending) = open_channel();
        let cancel = CancellationToken::new();

        let limit = Duration::from_secs(5);
        assert_eq!(
            pending.wait(Some(limit), &cancel).await,
            Err(ChannelError::Timeout(limit))
        );
    }

    #[tokio::test]
    async fn test_cancelled() {
        let (_port, pending) = open_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(pending.wait(None, &cancel).await, Err(ChannelError::Cancelled));
    }

    #[tokio::test]
    async fn test_send_after_requester_gone() {
        let (port, pending) = open_channel();
        drop(pending);

        assert!(port.is_closed());
        assert!(!port.send(FetchReply::NotFound));
    }
}
