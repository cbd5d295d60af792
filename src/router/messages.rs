//! 会话与路由器之间的消息类型

use serde::{Deserialize, Serialize};

use super::channel::ReplyPort;
use crate::types::HostName;

/// 会话发送给路由器的控制消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    /// 请求开始托管，路由器以 `start-ok` 回复
    HostStart,
    /// 停止托管，不需要回复
    #[serde(rename_all = "camelCase")]
    HostStop { host_name: HostName },
}

/// `start-ok` 回复内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostStarted {
    /// 分配到的主机名
    pub host_name: HostName,
    /// 路由器作用域 URL（以 `/` 结尾）
    pub scope: String,
}

impl HostStarted {
    /// 主机根 URL，例如 `http://127.0.0.1:8080/host/`
    pub fn host_url(&self) -> String {
        format!("{}{}/", self.scope, self.host_name)
    }
}

/// 路由器发送给会话的消息
#[derive(Debug)]
pub enum RouterMessage {
    /// 开始托管成功
    StartOk(HostStarted),
    /// 请求一个主机内路径，通过 `reply` 回复恰好一次
    Fetch { path: String, reply: ReplyPort },
}

impl RouterMessage {
    /// 消息类型名，用于日志
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StartOk(_) => "start-ok",
            Self::Fetch { .. } => "fetch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_message_wire_format() {
        assert_eq!(
            serde_json::to_value(ControlMessage::HostStart).unwrap(),
            serde_json::json!({"type": "host-start"})
        );
        assert_eq!(
            serde_json::to_value(ControlMessage::HostStop {
                host_name: HostName::new("host2")
            })
            .unwrap(),
            serde_json::json!({"type": "host-stop", "hostName": "host2"})
        );

        let parsed: ControlMessage =
            serde_json::from_str(r#"{"type":"host-stop","hostName":"host"}"#).unwrap();
        assert_eq!(
            parsed,
            ControlMessage::HostStop {
                host_name: HostName::new("host")
            }
        );
    }

    #[test]
    fn test_host_url() {
        let started = HostStarted {
            host_name: HostName::new("host3"),
            scope: "http://127.0.0.1:8080/".to_string(),
        };
        assert_eq!(started.host_url(), "http://127.0.0.1:8080/host3/");
    }
}
