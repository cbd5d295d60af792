//! 路由器
//!
//! 维护主机注册表，拦截请求并按主机名分发给持有文件夹的会话

mod channel;
mod classify;
mod clients;
mod messages;
mod response;
mod service;

pub use channel::{open_channel, ChannelError, PendingReply, ReplyPort};
pub use classify::{Classifier, RequestRoute};
pub use clients::{ClientHandle, ClientManager};
pub use messages::{ControlMessage, HostStarted, RouterMessage};
pub use response::{HostResponse, RouteError, NO_STORE};
pub use service::{HostSummary, RouterService};
