//! SQLite 键值存储
//!
//! 一个数据库文件可以容纳多个命名存储，所有存储共用 `kv_entries` 表，
//! 以 `store` 列区分

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{KvStore, StoreResult};

/// SQLite 键值存储
pub struct SqliteStore {
    /// SQLite 连接
    conn: Mutex<Connection>,
    /// 存储名
    store_name: String,
}

impl SqliteStore {
    /// 打开（必要时创建）数据库中的命名存储
    pub fn open(db_path: &Path, store_name: impl Into<String>) -> StoreResult<Self> {
        // 确保父目录存在
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        let store = Self::with_connection(conn, store_name)?;
        info!("键值存储已打开: {:?} / {}", db_path, store.store_name);
        Ok(store)
    }

    /// 打开一个仅存在于内存中的 SQLite 存储
    pub fn open_in_memory(store_name: impl Into<String>) -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, store_name)
    }

    fn with_connection(conn: Connection, store_name: impl Into<String>) -> StoreResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            store_name: store_name.into(),
        };
        store.init_tables()?;
        Ok(store)
    }

    /// 初始化数据库表
    fn init_tables(&self) -> StoreResult<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                store TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (store, key)
            )
            "#,
            [],
        )?;

        Ok(())
    }

    /// 存储名
    pub fn store_name(&self) -> &str {
        &self.store_name
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO kv_entries (store, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![self.store_name, key, value, Utc::now().timestamp()],
        )?;
        debug!("[{}] 写入键: {}", self.store_name, key);
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM kv_entries WHERE store = ?1 AND key = ?2",
                params![self.store_name, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM kv_entries WHERE store = ?1 AND key = ?2",
            params![self.store_name, key],
        )?;
        debug!("[{}] 删除键: {}", self.store_name, key);
        Ok(())
    }

    async fn keys(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT key FROM kv_entries WHERE store = ?1 ORDER BY key")?;
        let keys = stmt
            .query_map(params![self.store_name], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    async fn clear(&self) -> StoreResult<()> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM kv_entries WHERE store = ?1",
            params![self.store_name],
        )?;
        debug!("[{}] 已清空，删除 {} 条", self.store_name, removed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = SqliteStore::open_in_memory("test-store").unwrap();

        store.set("host", "client-a").await.unwrap();
        assert_eq!(store.get("host").await.unwrap().as_deref(), Some("client-a"));

        // 覆盖写入
        store.set("host", "client-b").await.unwrap();
        assert_eq!(store.get("host").await.unwrap().as_deref(), Some("client-b"));

        store.delete("host").await.unwrap();
        assert!(store.get("host").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("data").join("router.db");

        {
            let store = SqliteStore::open(&db_path, "host-registry").unwrap();
            store.set("host", "client-a").await.unwrap();
            store.set("host2", "client-b").await.unwrap();
        }

        let store = SqliteStore::open(&db_path, "host-registry").unwrap();
        assert_eq!(store.keys().await.unwrap(), vec!["host", "host2"]);
    }

    #[tokio::test]
    async fn test_stores_are_isolated() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("shared.db");

        let router_store = SqliteStore::open(&db_path, "host-registry").unwrap();
        let session_store = SqliteStore::open(&db_path, "host-store").unwrap();

        router_store.set("host", "client-a").await.unwrap();
        session_store.set("folder", "{}").await.unwrap();

        // clear 只影响自己的存储
        router_store.clear().await.unwrap();
        assert!(router_store.keys().await.unwrap().is_empty());
        assert_eq!(session_store.keys().await.unwrap(), vec!["folder"]);
    }
}
