//! 持久化键值存储
//!
//! 每个执行上下文（路由器、每个会话）各自持有独立的存储实例，
//! 以 `(数据库, 存储名)` 二元组区分，互不共享。
//!
//! ## 一致性
//!
//! 单个操作相对同一实例是原子的；跨调用的"先读后写"不提供事务保证，
//! 调用方需要自行容忍竞争。

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use thiserror::Error;

/// 存储操作结果
pub type StoreResult<T> = Result<T, StoreError>;

/// 存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("数据库错误: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
    #[error("值序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 持久化键值存储接口
#[async_trait]
pub trait KvStore: Send + Sync {
    /// 写入（覆盖）一个键
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// 读取一个键，不存在返回 None
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// 删除一个键，键不存在不视为错误
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// 列出全部键
    async fn keys(&self) -> StoreResult<Vec<String>>;

    /// 清空整个存储
    async fn clear(&self) -> StoreResult<()>;
}

/// 内存存储
///
/// 进程退出即丢失，用于测试或不需要跨重启保留状态的场景
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.entries.lock().keys().cloned().collect())
    }

    async fn clear(&self) -> StoreResult<()> {
        self.entries.lock().clear();
        Ok(())
    }
}
