//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）

use std::sync::Arc;

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::MockModel;
pub use openai::{OpenAiModel, TokenUsage};
pub use traits::{
    ChatMessage, ChatRole, FinishReason, LanguageModel, LlmError, ModelReply, ToolInvocation,
};

use crate::config::AppConfig;

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / Mock）
pub fn create_model_from_config(cfg: &AppConfig) -> Arc<dyn LanguageModel> {
    if std::env::var("OPENAI_API_KEY").is_ok() {
        let model = cfg.llm.model.clone();
        tracing::info!("Using OpenAI-compatible LLM ({})", model);
        Arc::new(OpenAiModel::new(
            cfg.llm.base_url.as_deref(),
            &model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set, using Mock LLM");
        Arc::new(MockModel::new())
    }
}
