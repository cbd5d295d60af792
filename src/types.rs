// 路由器与会话共用的领域类型

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 主机名前缀
pub const HOST_PREFIX: &str = "host";

/// 主机名
///
/// 只由路由器生成，形如 `host`、`host2`、`host3`……
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostName(String);

impl HostName {
    /// 根据当前注册表中的键数量生成主机名
    ///
    /// - 0 个 → `host`
    /// - k 个 → `host{k+1}`
    pub fn for_existing_count(count: usize) -> Self {
        if count == 0 {
            Self(HOST_PREFIX.to_string())
        } else {
            Self(format!("{}{}", HOST_PREFIX, count + 1))
        }
    }

    /// 从字符串构造（用于解析请求路径或存储中的键）
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 客户端（会话上下文）标识
///
/// 不透明、可比较的令牌
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// 生成新的客户端 ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 会话对一次 fetch 的回复
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchReply {
    /// 文件内容（或生成的目录列表页）
    Ok {
        body: Vec<u8>,
        content_type: String,
    },
    /// 路径解析失败
    NotFound,
}

impl FetchReply {
    pub fn ok(body: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self::Ok {
            body: body.into(),
            content_type: content_type.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_name_allocation_sequence() {
        assert_eq!(HostName::for_existing_count(0).as_str(), "host");
        assert_eq!(HostName::for_existing_count(1).as_str(), "host2");
        assert_eq!(HostName::for_existing_count(2).as_str(), "host3");
    }

    #[test]
    fn test_client_id_unique() {
        assert_ne!(ClientId::generate(), ClientId::generate());
    }
}
