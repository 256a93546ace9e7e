//! Agent 路由
//!
//! 计划生成或动态追加的任务可能没有指定负责 Agent，由路由器补齐：
//! KeywordRouter（静态规则表）先试，ModelRouter（询问 LLM）兜底，
//! 依链中顺序逐个尝试，第一个给出答案的生效。

use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::{ChatMessage, LanguageModel};
use crate::plan::Task;

/// 路由器：为任务挑选负责 Agent；None 表示放弃（交给链中的下一个）
#[async_trait]
pub trait Router: Send + Sync {
    async fn route(&self, task: &Task, roster: &[String]) -> Option<String>;
}

/// 关键词路由：按规则表顺序匹配任务名称与目标文本
pub struct KeywordRouter {
    /// (关键词小写, Agent 名)
    rules: Vec<(String, String)>,
}

impl KeywordRouter {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, keyword: impl Into<String>, agent: impl Into<String>) -> Self {
        self.rules.push((keyword.into().to_lowercase(), agent.into()));
        self
    }
}

impl Default for KeywordRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Router for KeywordRouter {
    async fn route(&self, task: &Task, roster: &[String]) -> Option<String> {
        let haystack = format!("{} {}", task.name, task.goal).to_lowercase();
        self.rules
            .iter()
            .find(|(kw, agent)| haystack.contains(kw.as_str()) && roster.contains(agent))
            .map(|(_, agent)| agent.clone())
    }
}

/// 模型路由：把候选名单和任务目标交给 LLM，让它报一个名字
pub struct ModelRouter {
    model: Arc<dyn LanguageModel>,
}

impl ModelRouter {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Router for ModelRouter {
    async fn route(&self, task: &Task, roster: &[String]) -> Option<String> {
        if roster.is_empty() {
            return None;
        }
        let prompt = format!(
            "Task: {}\nGoal: {}\n\nWhich of these agents should handle it? \
             Answer with exactly one name from: {}",
            task.name,
            task.goal,
            roster.join(", ")
        );
        let reply = self
            .model
            .generate(&[ChatMessage::user(prompt)], "You assign tasks to agents.", None)
            .await
            .ok()?;
        let answer = reply.content.trim().to_lowercase();
        // 模型可能多话，取回答中出现的第一个合法名字
        roster
            .iter()
            .find(|name| answer.contains(&name.to_lowercase()))
            .cloned()
    }
}

/// 路由链：按顺序尝试，第一个命中的生效
pub struct RouterChain {
    routers: Vec<Box<dyn Router>>,
}

impl RouterChain {
    pub fn new() -> Self {
        Self {
            routers: Vec::new(),
        }
    }

    pub fn with(mut self, router: impl Router + 'static) -> Self {
        self.routers.push(Box::new(router));
        self
    }

    pub async fn route(&self, task: &Task, roster: &[String]) -> Option<String> {
        for router in &self.routers {
            if let Some(agent) = router.route(task, roster).await {
                return Some(agent);
            }
        }
        None
    }
}

impl Default for RouterChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockModel;

    fn roster() -> Vec<String> {
        vec!["writer".to_string(), "reviewer".to_string()]
    }

    #[tokio::test]
    async fn test_keyword_router_matches() {
        let router = KeywordRouter::new()
            .with_rule("review", "reviewer")
            .with_rule("draft", "writer");

        let task = Task::new("Review the draft", "check quality");
        // 规则表顺序优先："review" 先命中
        assert_eq!(router.route(&task, &roster()).await.as_deref(), Some("reviewer"));

        let task = Task::new("Write draft", "first pass");
        assert_eq!(router.route(&task, &roster()).await.as_deref(), Some("writer"));
    }

    #[tokio::test]
    async fn test_keyword_router_ignores_unknown_agent() {
        let router = KeywordRouter::new().with_rule("draft", "ghost");
        let task = Task::new("Write draft", "x");
        assert!(router.route(&task, &roster()).await.is_none());
    }

    #[tokio::test]
    async fn test_model_router_validates_answer() {
        let model = Arc::new(MockModel::with_replies(vec![
            "I think reviewer is best suited.",
        ]));
        let router = ModelRouter::new(model);
        let task = Task::new("Check", "verify output");
        assert_eq!(router.route(&task, &roster()).await.as_deref(), Some("reviewer"));
    }

    #[tokio::test]
    async fn test_chain_falls_back_to_model() {
        let model = Arc::new(MockModel::with_replies(vec!["writer"]));
        let chain = RouterChain::new()
            .with(KeywordRouter::new().with_rule("nomatch", "reviewer"))
            .with(ModelRouter::new(model));

        let task = Task::new("Untyped work", "do things");
        assert_eq!(chain.route(&task, &roster()).await.as_deref(), Some("writer"));
    }
}
