//! Hand-off 规则评估
//!
//! 任务完成后检查规则集：若某条 (fromAgent -> toAgent, condition) 命中刚完成
//! Agent 的输出，则合成一个依赖源任务的新任务追加进计划 —— 静态计划借此
//! 响应式生长，无需整体重排。优先级高者胜，平级按规则声明顺序取先者。
//!
//! 条件判定可插拔：KeywordJudge（词面重叠，确定性）先行，
//! ModelJudge（LLM 判是/否）在其弃权时兜底，与路由链同样的回退次序。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::llm::{ChatMessage, LanguageModel};
use crate::plan::Task;

/// 一条 hand-off 规则（可从配置反序列化）
#[derive(Debug, Clone, Deserialize)]
pub struct HandoffRule {
    pub from_agent: String,
    pub to_agent: String,
    /// 自然语言条件，如 "draft complete"
    pub condition: String,
    #[serde(default)]
    pub priority: i32,
}

/// 条件判定器；None 表示弃权（交给下一个判定器）
#[async_trait]
pub trait ConditionJudge: Send + Sync {
    async fn matches(&self, condition: &str, output: &str) -> Option<bool>;
}

/// 词面判定：条件中的实义词（长度 > 3）出现在输出中即命中；
/// 没有任何实义词可比对时弃权
pub struct KeywordJudge;

#[async_trait]
impl ConditionJudge for KeywordJudge {
    async fn matches(&self, condition: &str, output: &str) -> Option<bool> {
        let output = output.to_lowercase();
        let words: Vec<&str> = condition
            .split_whitespace()
            .filter(|w| w.len() > 3)
            .collect();
        if words.is_empty() {
            return None;
        }
        Some(words.iter().any(|w| output.contains(&w.to_lowercase())))
    }
}

/// 模型判定：让 LLM 回答 yes/no；无法解析时弃权
pub struct ModelJudge {
    model: Arc<dyn LanguageModel>,
}

impl ModelJudge {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl ConditionJudge for ModelJudge {
    async fn matches(&self, condition: &str, output: &str) -> Option<bool> {
        let prompt = format!(
            "Condition: {condition}\n\nAgent output:\n{output}\n\n\
             Does the output satisfy the condition? Answer only \"yes\" or \"no\"."
        );
        let reply = self
            .model
            .generate(&[ChatMessage::user(prompt)], "You evaluate conditions.", None)
            .await
            .ok()?;
        let answer = reply.content.trim().to_lowercase();
        if answer.starts_with("yes") {
            Some(true)
        } else if answer.starts_with("no") {
            Some(false)
        } else {
            None
        }
    }
}

/// 规则集评估器
pub struct HandoffEvaluator {
    rules: Vec<HandoffRule>,
    judges: Vec<Box<dyn ConditionJudge>>,
}

impl HandoffEvaluator {
    pub fn new(rules: Vec<HandoffRule>) -> Self {
        Self {
            rules,
            judges: vec![Box::new(KeywordJudge)],
        }
    }

    /// 追加兜底判定器（如 ModelJudge）
    pub fn with_judge(mut self, judge: impl ConditionJudge + 'static) -> Self {
        self.judges.push(Box::new(judge));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    async fn condition_holds(&self, condition: &str, output: &str) -> bool {
        for judge in &self.judges {
            if let Some(verdict) = judge.matches(condition, output).await {
                return verdict;
            }
        }
        false
    }

    /// 评估刚完成任务的输出；返回唯一胜出规则（优先级最高，平级取声明序先者）
    pub async fn evaluate(&self, from_agent: &str, output: &str) -> Option<&HandoffRule> {
        let mut winner: Option<&HandoffRule> = None;
        for rule in self.rules.iter().filter(|r| r.from_agent == from_agent) {
            if self.condition_holds(&rule.condition, output).await {
                match winner {
                    Some(w) if w.priority >= rule.priority => {}
                    _ => winner = Some(rule),
                }
            }
        }
        winner
    }

    /// 按规则合成新任务：依赖源任务、改派目标 Agent
    pub fn synthesize(rule: &HandoffRule, source: &Task) -> Task {
        Task::new(
            format!("Hand-off to {}", rule.to_agent),
            format!(
                "Follow up on '{}' ({}). Trigger condition: {}",
                source.name, source.goal, rule.condition
            ),
        )
        .with_id(format!("handoff_{}_{}", source.id, rule.to_agent))
        .with_agent(rule.to_agent.clone())
        .with_dependencies(vec![source.id.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockModel;

    fn rules() -> Vec<HandoffRule> {
        vec![
            HandoffRule {
                from_agent: "writer".into(),
                to_agent: "reviewer".into(),
                condition: "draft complete".into(),
                priority: 1,
            },
            HandoffRule {
                from_agent: "writer".into(),
                to_agent: "editor".into(),
                condition: "draft complete".into(),
                priority: 5,
            },
            HandoffRule {
                from_agent: "reviewer".into(),
                to_agent: "publisher".into(),
                condition: "approved".into(),
                priority: 1,
            },
        ]
    }

    #[tokio::test]
    async fn test_keyword_overlap_triggers() {
        let evaluator = HandoffEvaluator::new(vec![rules()[0].clone()]);
        let rule = evaluator.evaluate("writer", "The draft was saved to disk.").await;
        assert_eq!(rule.unwrap().to_agent, "reviewer");
    }

    #[tokio::test]
    async fn test_no_match_for_other_agent() {
        let evaluator = HandoffEvaluator::new(rules());
        assert!(evaluator.evaluate("publisher", "draft saved").await.is_none());
    }

    #[tokio::test]
    async fn test_highest_priority_wins() {
        let evaluator = HandoffEvaluator::new(rules());
        let rule = evaluator.evaluate("writer", "draft saved").await.unwrap();
        assert_eq!(rule.to_agent, "editor");
        assert_eq!(rule.priority, 5);
    }

    #[tokio::test]
    async fn test_priority_tie_takes_first_declared() {
        let mut tied = rules();
        tied[1].priority = 1;
        let evaluator = HandoffEvaluator::new(tied);
        let rule = evaluator.evaluate("writer", "draft saved").await.unwrap();
        assert_eq!(rule.to_agent, "reviewer");
    }

    #[tokio::test]
    async fn test_model_judge_fallback() {
        // 条件无实义词（全部 <= 3 字符），词面判定弃权，落到模型判定
        let rule = HandoffRule {
            from_agent: "writer".into(),
            to_agent: "reviewer".into(),
            condition: "ok?".into(),
            priority: 0,
        };
        let model = Arc::new(MockModel::with_replies(vec!["yes"]));
        let evaluator = HandoffEvaluator::new(vec![rule]).with_judge(ModelJudge::new(model));
        assert!(evaluator.evaluate("writer", "whatever").await.is_some());
    }

    #[tokio::test]
    async fn test_synthesized_task_shape() {
        let source = Task::new("Write draft", "first pass").with_id("t42").with_agent("writer");
        let rule = &rules()[0];
        let task = HandoffEvaluator::synthesize(rule, &source);

        assert_eq!(task.id, "handoff_t42_reviewer");
        assert_eq!(task.assigned_agent, "reviewer");
        assert_eq!(task.dependencies, vec!["t42".to_string()]);
    }
}
