// Serve Folder
// 把本地文件夹以临时 HTTP 主机的方式提供访问，路由器按主机名把请求转给持有文件夹的会话

// 命令行参数
pub mod cli;

// 配置管理模块
pub mod config;

// 日志系统
pub mod logging;

// 共用领域类型
pub mod types;

// 键值存储
pub mod store;

// 主机注册表
pub mod registry;

// 目录提供者（本地目录与内存目录）
pub mod provider;

// 目录列表页
pub mod listing;

// 路由器
pub mod router;

// 托管会话
pub mod session;

// 离线缓存
pub mod offline;

// Web服务器模块
pub mod server;

// 导出常用类型
pub use config::AppConfig;
pub use registry::HostRegistry;
pub use router::{RouteError, RouterService};
pub use server::AppState;
pub use session::{Folder, HostSession};
pub use types::{ClientId, FetchReply, HostName};
