//! 虚拟文件系统提供者
//!
//! 会话只通过这里的能力接口解析路径，不关心背后是真实目录还是内存树：
//!
//! ```text
//! HostSession::resolve
//!     ↓
//! Arc<dyn DirectoryHandle>
//!     ↓
//! ┌──────────────────────────┬──────────────────────────────┐
//! │  NativeDirectory         │  MemoryDirectory             │
//! │  - 直接读本地磁盘         │  - 由扁平文件列表构建的内存树  │
//! └──────────────────────────┴──────────────────────────────┘
//! ```

mod memory;
pub mod mime;
mod native;

pub use memory::{MemoryDirectory, MemoryFile};
pub use native::{NativeDirectory, NativeFile};

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// 提供者操作结果
pub type ProviderResult<T> = Result<T, ProviderError>;

/// 提供者错误
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("未找到: {0}")]
    NotFound(String),
    #[error("名称无效: {0}")]
    InvalidName(String),
    #[error("权限不足: {0}")]
    PermissionDenied(String),
    #[error("IO 错误: {0}")]
    Io(String),
}

impl From<io::Error> for ProviderError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ProviderError::NotFound(err.to_string()),
            io::ErrorKind::PermissionDenied => ProviderError::PermissionDenied(err.to_string()),
            _ => ProviderError::Io(err.to_string()),
        }
    }
}

/// 条目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    File,
    Directory,
}

/// 目录枚举得到的句柄
#[derive(Clone)]
pub enum Handle {
    File(Arc<dyn FileHandle>),
    Directory(Arc<dyn DirectoryHandle>),
}

impl Handle {
    pub fn kind(&self) -> HandleKind {
        match self {
            Handle::File(_) => HandleKind::File,
            Handle::Directory(_) => HandleKind::Directory,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind() == HandleKind::Directory
    }
}

/// 目录条目的惰性序列
///
/// 有限、不可重启，顺序不作保证
pub type EntryStream = BoxStream<'static, ProviderResult<(String, Handle)>>;

/// 文件内容及推断出的内容类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileData {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// 目录句柄
#[async_trait]
pub trait DirectoryHandle: Send + Sync {
    /// 目录名（根目录可以为空）
    fn name(&self) -> &str;

    /// 获取子目录，不存在时返回 NotFound
    async fn get_directory_handle(&self, name: &str) -> ProviderResult<Arc<dyn DirectoryHandle>>;

    /// 获取子文件，不存在时返回 NotFound
    async fn get_file_handle(&self, name: &str) -> ProviderResult<Arc<dyn FileHandle>>;

    /// 枚举直接子条目
    fn entries(&self) -> EntryStream;
}

/// 文件句柄
#[async_trait]
pub trait FileHandle: Send + Sync {
    fn name(&self) -> &str;

    /// 按需读取文件内容
    async fn get_file(&self) -> ProviderResult<FileData>;
}

/// 校验单个路径段
///
/// 与浏览器的文件系统访问接口一致：空名、`.`、`..` 以及包含分隔符的名字都不合法
pub(crate) fn validate_name(name: &str) -> ProviderResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(|c: char| c == '/' || c == '\\') {
        return Err(ProviderError::InvalidName(name.to_string()));
    }
    Ok(())
}
