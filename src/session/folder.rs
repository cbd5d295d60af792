//! 被托管的文件夹
//!
//! 一个文件夹由根目录句柄和显示名组成。本地目录可以记录为
//! [`FolderReference`] 写入会话存储，下次启动直接复用。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::provider::{
    DirectoryHandle, MemoryDirectory, NativeDirectory, ProviderError, ProviderResult,
};
use crate::store::{KvStore, StoreResult};

/// 会话存储中记录上次文件夹的键
pub const FOLDER_KEY: &str = "folder";

/// 文件夹种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderKind {
    Native,
}

/// 可持久化的文件夹引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderReference {
    pub kind: FolderKind,
    pub path: PathBuf,
    pub name: String,
}

/// 读取上次使用的文件夹
pub async fn load_last_folder(store: &dyn KvStore) -> StoreResult<Option<FolderReference>> {
    match store.get(FOLDER_KEY).await? {
        Some(value) => Ok(Some(serde_json::from_str(&value)?)),
        None => Ok(None),
    }
}

/// 记录本次使用的文件夹
pub async fn save_last_folder(store: &dyn KvStore, reference: &FolderReference) -> StoreResult<()> {
    let value = serde_json::to_string(reference)?;
    store.set(FOLDER_KEY, &value).await
}

/// 被托管的文件夹
#[derive(Clone)]
pub struct Folder {
    name: String,
    root: Arc<dyn DirectoryHandle>,
    reference: Option<FolderReference>,
}

impl Folder {
    /// 直接读取磁盘，每次请求都看到最新内容
    pub async fn native(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = dunce::canonicalize(path.as_ref())?;
        let root = NativeDirectory::open(&path).await?;
        let name = root.name().to_string();

        Ok(Self {
            reference: Some(FolderReference {
                kind: FolderKind::Native,
                path,
                name: name.clone(),
            }),
            name,
            root: Arc::new(root),
        })
    }

    /// 打开上次记录的文件夹
    pub async fn from_reference(reference: &FolderReference) -> ProviderResult<Self> {
        match reference.kind {
            FolderKind::Native => Self::native(&reference.path).await,
        }
    }

    /// 把磁盘目录一次性读入内存，之后的修改不可见
    pub async fn snapshot(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref().to_path_buf();
        let (name, root) =
            tokio::task::spawn_blocking(move || MemoryDirectory::snapshot_dir(&path))
                .await
                .map_err(|e| ProviderError::Io(e.to_string()))??;

        Ok(Self {
            name,
            root: Arc::new(root),
            reference: None,
        })
    }

    /// 由带相对路径的扁平文件列表构建（路径以文件夹名开头）
    pub fn from_relative_files<I, P, D>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, D)>,
        P: AsRef<str>,
        D: Into<Vec<u8>>,
    {
        let (name, root) = MemoryDirectory::from_relative_files(files);
        Self {
            name,
            root: Arc::new(root),
            reference: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Arc<dyn DirectoryHandle> {
        &self.root
    }

    /// 可持久化的引用，仅本地目录有
    pub fn reference(&self) -> Option<&FolderReference> {
        self.reference.as_ref()
    }

    /// 根目录是否有 index.html
    pub async fn has_index_html(&self) -> bool {
        self.root.get_file_handle("index.html").await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_last_folder_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(load_last_folder(&store).await.unwrap(), None);

        let temp_dir = TempDir::new().unwrap();
        let folder = Folder::native(temp_dir.path()).await.unwrap();
        let reference = folder.reference().unwrap().clone();
        save_last_folder(&store, &reference).await.unwrap();

        let raw = store.get(FOLDER_KEY).await.unwrap().unwrap();
        assert!(raw.contains("\"kind\":\"native\""));

        let loaded = load_last_folder(&store).await.unwrap().unwrap();
        assert_eq!(loaded, reference);

        let reopened = Folder::from_reference(&loaded).await.unwrap();
        assert_eq!(reopened.name(), folder.name());
    }

    #[tokio::test]
    async fn test_has_index_html() {
        let with_index = Folder::from_relative_files(vec![("site/index.html", "<h1>hi</h1>")]);
        assert_eq!(with_index.name(), "site");
        assert!(with_index.has_index_html().await);
        assert!(with_index.reference().is_none());

        let without = Folder::from_relative_files(vec![("site/a.txt", "a")]);
        assert!(!without.has_index_html().await);
    }

    #[tokio::test]
    async fn test_snapshot_is_frozen() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("a.txt"), b"v1").unwrap();

        let folder = Folder::snapshot(temp_dir.path()).await.unwrap();
        std::fs::write(temp_dir.path().join("a.txt"), b"v2").unwrap();

        let file = folder.root().get_file_handle("a.txt").await.unwrap();
        assert_eq!(file.get_file().await.unwrap().bytes, b"v1");
    }
}
