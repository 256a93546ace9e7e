//! Mock LLM 客户端（测试用，无需 API）
//!
//! 按脚本顺序吐出预置回复；脚本耗尽后回显最后一条 user 消息，
//! 便于在无网络环境下跑通计划生成、调度与 hand-off 全流程。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::traits::{ChatMessage, ChatRole, LanguageModel, LlmError, ModelReply};

/// Mock 客户端：预置回复队列 + 回显兜底
#[derive(Debug, Default)]
pub struct MockModel {
    replies: Mutex<VecDeque<String>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一组按序返回的回复
    pub fn with_replies(replies: Vec<impl Into<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
        }
    }

    /// 追加一条脚本回复
    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(reply.into());
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        _system: &str,
        _tools: Option<&str>,
    ) -> Result<ModelReply, LlmError> {
        if let Some(scripted) = self.replies.lock().unwrap().pop_front() {
            return Ok(ModelReply::text(scripted));
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(ModelReply::text(format!("Echo from Mock: {last_user}")))
    }
}
