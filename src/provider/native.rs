// 本地磁盘目录提供者
//
// 每次调用都直接访问磁盘，不做缓存，保证请求总能看到文件夹的最新状态

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use tokio::fs;

use super::mime::content_type_for;
use super::{
    validate_name, DirectoryHandle, EntryStream, FileData, FileHandle, Handle, ProviderError,
    ProviderResult,
};

/// 本地目录句柄
#[derive(Debug, Clone)]
pub struct NativeDirectory {
    path: PathBuf,
    name: String,
}

impl NativeDirectory {
    /// 打开一个已存在的目录作为根
    pub async fn open(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref();
        let metadata = fs::metadata(path).await?;
        if !metadata.is_dir() {
            return Err(ProviderError::NotFound(format!(
                "不是目录: {}",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            path: path.to_path_buf(),
            name,
        })
    }

    /// 目录在磁盘上的路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn child_path(&self, name: &str) -> ProviderResult<PathBuf> {
        validate_name(name)?;
        Ok(self.path.join(name))
    }
}

#[async_trait]
impl DirectoryHandle for NativeDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_directory_handle(&self, name: &str) -> ProviderResult<Arc<dyn DirectoryHandle>> {
        let path = self.child_path(name)?;
        let metadata = fs::metadata(&path).await?;
        if !metadata.is_dir() {
            return Err(ProviderError::NotFound(name.to_string()));
        }
        Ok(Arc::new(NativeDirectory {
            path,
            name: name.to_string(),
        }))
    }

    async fn get_file_handle(&self, name: &str) -> ProviderResult<Arc<dyn FileHandle>> {
        let path = self.child_path(name)?;
        let metadata = fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(ProviderError::NotFound(name.to_string()));
        }
        Ok(Arc::new(NativeFile {
            path,
            name: name.to_string(),
        }))
    }

    fn entries(&self) -> EntryStream {
        enum State {
            Pending(PathBuf),
            Reading(fs::ReadDir),
            Done,
        }

        stream::unfold(State::Pending(self.path.clone()), |state| async move {
            let mut read_dir = match state {
                State::Pending(path) => match fs::read_dir(&path).await {
                    Ok(read_dir) => read_dir,
                    Err(e) => return Some((Err(e.into()), State::Done)),
                },
                State::Reading(read_dir) => read_dir,
                State::Done => return None,
            };

            loop {
                let entry = match read_dir.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => return None,
                    Err(e) => return Some((Err(e.into()), State::Done)),
                };

                let name = entry.file_name().to_string_lossy().into_owned();
                let path = entry.path();

                // 跟随符号链接；悬空链接直接跳过
                let metadata = match fs::metadata(&path).await {
                    Ok(m) => m,
                    Err(_) => continue,
                };

                let handle = if metadata.is_dir() {
                    Handle::Directory(Arc::new(NativeDirectory {
                        path,
                        name: name.clone(),
                    }))
                } else if metadata.is_file() {
                    Handle::File(Arc::new(NativeFile {
                        path,
                        name: name.clone(),
                    }))
                } else {
                    continue;
                };

                return Some((Ok((name, handle)), State::Reading(read_dir)));
            }
        })
        .boxed()
    }
}

/// 本地文件句柄
#[derive(Debug, Clone)]
pub struct NativeFile {
    path: PathBuf,
    name: String,
}

#[async_trait]
impl FileHandle for NativeFile {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_file(&self) -> ProviderResult<FileData> {
        let bytes = fs::read(&self.path).await?;
        Ok(FileData {
            bytes,
            content_type: content_type_for(&self.name).to_string(),
        })
    }
}
