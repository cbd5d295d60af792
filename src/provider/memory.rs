// 内存目录树
//
// 浏览器不支持目录句柄时，只能拿到一份带相对路径的扁平文件列表。
// 这里把它还原成同样接口的目录树

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use parking_lot::RwLock;
use walkdir::WalkDir;

use super::mime::content_type_for;
use super::{
    DirectoryHandle, EntryStream, FileData, FileHandle, Handle, ProviderError, ProviderResult,
};

#[derive(Default)]
struct MemoryDirectoryInner {
    folders: BTreeMap<String, Arc<MemoryDirectory>>,
    files: BTreeMap<String, Arc<MemoryFile>>,
}

/// 内存目录
pub struct MemoryDirectory {
    name: String,
    inner: RwLock<MemoryDirectoryInner>,
}

impl MemoryDirectory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(MemoryDirectoryInner::default()),
        }
    }

    /// 获取子目录，不存在则创建
    pub fn add_or_get_folder(&self, name: &str) -> Arc<MemoryDirectory> {
        let mut inner = self.inner.write();
        Arc::clone(
            inner
                .folders
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryDirectory::new(name))),
        )
    }

    /// 按相对路径添加文件，中间目录按需创建；同名文件会被替换
    pub fn add_file(&self, path: &str, data: impl Into<Vec<u8>>) {
        let mut parts: Vec<&str> = path.split('/').collect();
        let file_name = parts.pop().unwrap_or_default();

        let mut folder: Option<Arc<MemoryDirectory>> = None;
        for part in parts {
            let next = match &folder {
                Some(f) => f.add_or_get_folder(part),
                None => self.add_or_get_folder(part),
            };
            folder = Some(next);
        }

        let file = Arc::new(MemoryFile {
            name: file_name.to_string(),
            data: data.into(),
        });
        let target = match &folder {
            Some(f) => f.as_ref(),
            None => self,
        };
        target
            .inner
            .write()
            .files
            .insert(file_name.to_string(), file);
    }

    /// 是否直接包含某个文件
    pub fn has_file(&self, name: &str) -> bool {
        self.inner.read().files.contains_key(name)
    }

    /// 由扁平文件列表构建目录树
    ///
    /// 每条路径都以所选文件夹名开头（如 `site/css/a.css`），
    /// 返回值中的文件夹名取自第一条带 `/` 的路径，且所有路径都去掉首段
    pub fn from_relative_files<I, P, D>(files: I) -> (String, MemoryDirectory)
    where
        I: IntoIterator<Item = (P, D)>,
        P: AsRef<str>,
        D: Into<Vec<u8>>,
    {
        let root = MemoryDirectory::new("");
        let mut folder_name = String::new();

        for (path, data) in files {
            let mut path = path.as_ref();
            if let Some(i) = path.find('/') {
                if folder_name.is_empty() {
                    folder_name = path[..i].to_string();
                }
                path = &path[i + 1..];
            }
            root.add_file(path, data);
        }

        (folder_name, root)
    }

    /// 把磁盘目录整体读入内存
    ///
    /// 同步遍历，调用方应放在阻塞线程池中执行
    pub fn snapshot_dir(dir: &Path) -> ProviderResult<(String, MemoryDirectory)> {
        let folder_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut files = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry.map_err(|e| ProviderError::Io(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(dir)
                .map_err(|e| ProviderError::Io(e.to_string()))?;
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let data = std::fs::read(entry.path())?;
            files.push((format!("{}/{}", folder_name, relative), data));
        }

        Ok(Self::from_relative_files(files))
    }
}

#[async_trait]
impl DirectoryHandle for MemoryDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_directory_handle(&self, name: &str) -> ProviderResult<Arc<dyn DirectoryHandle>> {
        match self.inner.read().folders.get(name) {
            Some(folder) => Ok(Arc::clone(folder) as Arc<dyn DirectoryHandle>),
            None => Err(ProviderError::NotFound(name.to_string())),
        }
    }

    async fn get_file_handle(&self, name: &str) -> ProviderResult<Arc<dyn FileHandle>> {
        match self.inner.read().files.get(name) {
            Some(file) => Ok(Arc::clone(file) as Arc<dyn FileHandle>),
            None => Err(ProviderError::NotFound(name.to_string())),
        }
    }

    fn entries(&self) -> EntryStream {
        // 先目录后文件
        let inner = self.inner.read();
        let mut entries: Vec<ProviderResult<(String, Handle)>> =
            Vec::with_capacity(inner.folders.len() + inner.files.len());
        for (name, folder) in &inner.folders {
            entries.push(Ok((
                name.clone(),
                Handle::Directory(Arc::clone(folder) as Arc<dyn DirectoryHandle>),
            )));
        }
        for (name, file) in &inner.files {
            entries.push(Ok((
                name.clone(),
                Handle::File(Arc::clone(file) as Arc<dyn FileHandle>),
            )));
        }
        stream::iter(entries).boxed()
    }
}

/// 内存文件
pub struct MemoryFile {
    name: String,
    data: Vec<u8>,
}

#[async_trait]
impl FileHandle for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_file(&self) -> ProviderResult<FileData> {
        Ok(FileData {
            bytes: self.data.clone(),
            content_type: content_type_for(&self.name).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_from_relative_files() {
        let (folder_name, root) = MemoryDirectory::from_relative_files(vec![
            ("site/index.html", b"<h1>hi</h1>".to_vec()),
            ("site/css/main.css", b"body{}".to_vec()),
            ("site/css/deep/x.txt", b"x".to_vec()),
        ]);

        assert_eq!(folder_name, "site");
        assert!(root.has_file("index.html"));

        let css = root.get_directory_handle("css").await.unwrap();
        let deep = css.get_directory_handle("deep").await.unwrap();
        let x = deep.get_file_handle("x.txt").await.unwrap();
        assert_eq!(x.get_file().await.unwrap().bytes, b"x");
    }

    #[tokio::test]
    async fn test_missing_entries() {
        let root = MemoryDirectory::new("");
        root.add_file("a.txt", "a");

        assert!(root.get_directory_handle("a.txt").await.is_err());
        assert!(root.get_file_handle("b.txt").await.is_err());
        assert!(root.get_directory_handle("..").await.is_err());
    }

    #[tokio::test]
    async fn test_replace_file_content() {
        let root = MemoryDirectory::new("");
        root.add_file("a.txt", "v1");
        root.add_file("a.txt", "v2");

        let file = root.get_file_handle("a.txt").await.unwrap();
        assert_eq!(file.get_file().await.unwrap().bytes, b"v2");
    }

    #[tokio::test]
    async fn test_entries_kinds() {
        let root = MemoryDirectory::new("");
        root.add_file("a.txt", "a");
        root.add_file("sub/b.txt", "b");

        let mut entries: Vec<(String, bool)> = root
            .entries()
            .map_ok(|(name, handle)| (name, handle.is_directory()))
            .try_collect()
            .await
            .unwrap();
        entries.sort();

        assert_eq!(
            entries,
            vec![("a.txt".to_string(), false), ("sub".to_string(), true)]
        );
    }

    #[tokio::test]
    async fn test_snapshot_dir() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("site");
        std::fs::create_dir_all(dir.join("img")).unwrap();
        std::fs::write(dir.join("index.html"), b"<p>x</p>").unwrap();
        std::fs::write(dir.join("img").join("logo.svg"), b"<svg/>").unwrap();

        let (folder_name, root) = MemoryDirectory::snapshot_dir(&dir).unwrap();
        assert_eq!(folder_name, "site");
        assert!(root.has_file("index.html"));

        let img = root.get_directory_handle("img").await.unwrap();
        let logo = img.get_file_handle("logo.svg").await.unwrap();
        let data = logo.get_file().await.unwrap();
        assert_eq!(data.content_type, "image/svg+xml");
    }
}
