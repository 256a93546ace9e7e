//! Agent 层：角色档案与按名调用
//!
//! 每个 Agent 是一份档案（名称 + 人设提示词）；AgentTeam 持有共享的 LLM
//! 客户端，按任务的 assigned_agent 解析档案并发起调用。未注册的名字
//! 落到默认人设，保证改派/合成任务总能执行。

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::llm::{ChatMessage, LanguageModel, LlmError, ModelReply};

pub mod router;

pub use router::{KeywordRouter, ModelRouter, Router, RouterChain};

/// Agent 档案（可从配置反序列化）
#[derive(Debug, Clone, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    /// 人设/职责描述，拼入 system prompt
    pub persona: String,
}

impl AgentProfile {
    pub fn new(name: impl Into<String>, persona: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            persona: persona.into(),
        }
    }
}

/// Agent 团队：档案注册表 + 共享 LLM
pub struct AgentTeam {
    model: Arc<dyn LanguageModel>,
    agents: HashMap<String, AgentProfile>,
    /// 注册顺序（路由候选列表保持稳定）
    order: Vec<String>,
    default_persona: String,
}

impl AgentTeam {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            agents: HashMap::new(),
            order: Vec::new(),
            default_persona: "You are a capable generalist agent. Complete the task and report the result concisely.".to_string(),
        }
    }

    pub fn register(&mut self, profile: AgentProfile) {
        if !self.agents.contains_key(&profile.name) {
            self.order.push(profile.name.clone());
        }
        self.agents.insert(profile.name.clone(), profile);
    }

    pub fn with_agent(mut self, profile: AgentProfile) -> Self {
        self.register(profile);
        self
    }

    pub fn get(&self, name: &str) -> Option<&AgentProfile> {
        self.agents.get(name)
    }

    /// 注册顺序的名字列表
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    /// 该 Agent 的人设（未注册时用默认人设）
    pub fn persona(&self, agent: &str) -> &str {
        self.agents
            .get(agent)
            .map(|p| p.persona.as_str())
            .unwrap_or(&self.default_persona)
    }

    /// 以指定 Agent 的身份调用模型
    pub async fn invoke(
        &self,
        agent: &str,
        system: &str,
        messages: &[ChatMessage],
        tools: Option<&str>,
    ) -> Result<ModelReply, LlmError> {
        let system = format!("{}\n\n{}", self.persona(agent), system);
        self.model.generate(messages, &system, tools).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockModel;

    #[tokio::test]
    async fn test_team_invoke_with_persona() {
        let team = AgentTeam::new(Arc::new(MockModel::new()))
            .with_agent(AgentProfile::new("writer", "You write drafts."));

        let reply = team
            .invoke("writer", "context", &[ChatMessage::user("hi")], None)
            .await
            .unwrap();
        assert!(reply.content.contains("hi"));
        assert_eq!(team.names(), vec!["writer"]);
    }

    #[test]
    fn test_unknown_agent_gets_default_persona() {
        let team = AgentTeam::new(Arc::new(MockModel::new()));
        assert!(team.persona("ghost").contains("generalist"));
    }
}
