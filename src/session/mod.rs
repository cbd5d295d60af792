//! 托管会话：持有一个文件夹并回答路由器转来的请求

mod folder;
mod manager;
mod path;

pub use folder::{load_last_folder, save_last_folder, Folder, FolderKind, FolderReference, FOLDER_KEY};
pub use manager::{HostInfo, HostSession, SessionError, SessionOptions};
pub use path::normalize_request_path;
