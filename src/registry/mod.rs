//! 主机注册表
//!
//! 持久化映射 `HostName → ClientId`，每个活跃主机一条。
//!
//! ## 已知限制
//!
//! 分配流程（清理 → 读键数 → 写入）不是原子的。两个同时到达的
//! "开始托管"请求可能读到相同的键数，从而得到同一个主机名，后写入者
//! 覆盖前者。单用户低并发场景下接受该行为，这里不加锁，也不引入事务。

use std::sync::Arc;

use tracing::debug;

use crate::store::{KvStore, StoreResult};
use crate::types::{ClientId, HostName};

/// 主机注册表
#[derive(Clone)]
pub struct HostRegistry {
    store: Arc<dyn KvStore>,
}

impl HostRegistry {
    /// 基于任意键值存储创建注册表
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// 写入映射
    pub async fn set(&self, host_name: &HostName, client_id: &ClientId) -> StoreResult<()> {
        self.store.set(host_name.as_str(), client_id.as_str()).await
    }

    /// 查找主机对应的客户端
    pub async fn get(&self, host_name: &HostName) -> StoreResult<Option<ClientId>> {
        Ok(self
            .store
            .get(host_name.as_str())
            .await?
            .map(ClientId::new))
    }

    /// 删除映射
    pub async fn delete(&self, host_name: &HostName) -> StoreResult<()> {
        self.store.delete(host_name.as_str()).await
    }

    /// 列出全部主机名
    pub async fn list_keys(&self) -> StoreResult<Vec<HostName>> {
        Ok(self
            .store
            .keys()
            .await?
            .into_iter()
            .map(HostName::new)
            .collect())
    }

    /// 清空注册表
    pub async fn clear_all(&self) -> StoreResult<()> {
        self.store.clear().await
    }

    /// 列出全部映射
    pub async fn entries(&self) -> StoreResult<Vec<(HostName, ClientId)>> {
        let mut entries = Vec::new();
        for host_name in self.list_keys().await? {
            // 列键与读值之间条目可能已被删除
            if let Some(client_id) = self.get(&host_name).await? {
                entries.push((host_name, client_id));
            }
        }
        Ok(entries)
    }

    /// 为客户端分配主机名并写入注册表
    ///
    /// `connected_clients` 是平台报告的当前连接上下文数量。
    /// 不超过 1 个时认为此前的注册都已失效，先整体清空注册表
    /// （上下文异常终止时注销通知可能丢失）。
    pub async fn allocate(
        &self,
        client_id: &ClientId,
        connected_clients: usize,
    ) -> StoreResult<HostName> {
        if connected_clients <= 1 {
            debug!("仅剩 {} 个连接上下文，清空主机注册表", connected_clients);
            self.clear_all().await?;
        }

        let existing = self.store.keys().await?.len();
        let host_name = HostName::for_existing_count(existing);

        self.set(&host_name, client_id).await?;
        Ok(host_name)
    }
}
