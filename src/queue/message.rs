//! 会话消息协议
//!
//! 消息由有序 parts 组成（文本、工具调用、工具结果、推理、错误、附件），
//! 队列负责消息顺序，持久层负责历史留存。

use serde::{Deserialize, Serialize};

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// 消息分段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    /// 普通文本
    Text { text: String },
    /// 工具调用
    ToolCall {
        call_id: String,
        tool: String,
        args: serde_json::Value,
    },
    /// 工具执行结果
    ToolResult {
        call_id: String,
        tool: String,
        output: String,
        is_error: bool,
    },
    /// 推理/思考内容
    Reasoning { text: String },
    /// 错误
    Error { text: String },
    /// 附件引用
    Attachment { name: String, mime: String },
}

/// 会话中的一条消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
    /// 毫秒时间戳
    pub created_at: i64,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: format!("msg_{}", uuid::Uuid::new_v4()),
            role,
            parts: vec![MessagePart::Text {
                text: content.clone(),
            }],
            content,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn with_part(mut self, part: MessagePart) -> Self {
        self.parts.push(part);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_serde_tagged() {
        let part = MessagePart::ToolResult {
            call_id: "c1".into(),
            tool: "echo".into(),
            output: "hi".into(),
            is_error: false,
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "tool_result");
        let back: MessagePart = serde_json::from_value(json).unwrap();
        assert_eq!(back, part);
    }

    #[test]
    fn test_message_roundtrip() {
        let msg = Message::assistant("done").with_part(MessagePart::Reasoning {
            text: "thought".into(),
        });
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content, "done");
        assert_eq!(back.parts.len(), 2);
    }
}
