//! LLM 客户端抽象
//!
//! 引擎将语言模型视为外部协作者：generate 一次性返回内容与可选工具调用，
//! 引擎自身不做重试（重试属于具体实现的职责）。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// LLM 调用错误
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Empty response from model")]
    EmptyResponse,
}

/// 对话角色（与 LLM API 一致）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// 发往模型的单条消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// 模型请求执行的一次工具调用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// 调用标识（回传工具结果时对应）
    pub id: String,
    pub tool: String,
    pub args: serde_json::Value,
}

impl ToolInvocation {
    pub fn new(tool: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4()),
            tool: tool.into(),
            args,
        }
    }
}

/// 生成结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Other,
}

/// 一次生成的完整结果
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub content: String,
    pub tool_calls: Vec<ToolInvocation>,
    pub finish_reason: FinishReason,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
        }
    }
}

/// LLM 客户端 trait：阻塞式（可等待）单次生成
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 生成回复；tools 为可选的工具 schema JSON（拼入请求或提示词由实现决定）
    async fn generate(
        &self,
        messages: &[ChatMessage],
        system: &str,
        tools: Option<&str>,
    ) -> Result<ModelReply, LlmError>;

    /// 累计 token 使用统计：(prompt, completion, total)；默认 (0, 0, 0)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
