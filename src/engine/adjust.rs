//! 动态计划调整
//!
//! 用户在执行途中发来的非空输入先过一次影响分析（LLM 调用）：
//! 判定输入是否改变计划，给出受影响/保留的任务集与需新增的任务。
//! 引擎只把 affected 减去 preserved 的差集重置回 pending，已完成的
//! 保留任务绝不触碰 —— 重定向永远不会悄悄丢弃已完成的工作。

use std::sync::Arc;

use serde::Deserialize;

use crate::core::EngineError;
use crate::engine::parse::extract_json;
use crate::llm::{ChatMessage, LanguageModel};
use crate::plan::{Plan, Task, TaskId};

/// 影响类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactKind {
    /// 不改变计划（闲聊、提问）
    None,
    /// 追加新工作，已有任务不动
    Extend,
    /// 部分已有任务需返工
    Rework,
}

/// 新增任务的描述（LLM 返回）
#[derive(Debug, Clone, Deserialize)]
pub struct NewTaskSpec {
    pub name: String,
    pub goal: String,
    #[serde(default)]
    pub agent: Option<String>,
    /// 依赖的已有任务 ID
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
}

/// 影响分析结果
#[derive(Debug, Clone, Deserialize)]
pub struct PlanAdjustment {
    pub impact: ImpactKind,
    #[serde(default)]
    pub affected_tasks: Vec<TaskId>,
    #[serde(default)]
    pub preserved_tasks: Vec<TaskId>,
    #[serde(default)]
    pub new_tasks: Vec<NewTaskSpec>,
    /// 给用户的一句话答复
    #[serde(default)]
    pub reply: String,
}

impl PlanAdjustment {
    pub fn none(reply: impl Into<String>) -> Self {
        Self {
            impact: ImpactKind::None,
            affected_tasks: Vec::new(),
            preserved_tasks: Vec::new(),
            new_tasks: Vec::new(),
            reply: reply.into(),
        }
    }
}

fn plan_summary(plan: &Plan) -> String {
    plan.tasks()
        .iter()
        .map(|t| {
            format!(
                "- id={} name={} agent={} status={:?} deps=[{}]",
                t.id,
                t.name,
                t.assigned_agent,
                t.status,
                t.dependencies.join(",")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 影响分析：把当前计划与新输入交给 LLM 分类。
/// 输出无法解析时按「不改变计划」处理并原样转述模型回复。
pub async fn analyze(
    model: &Arc<dyn LanguageModel>,
    plan: &Plan,
    input: &str,
) -> Result<PlanAdjustment, EngineError> {
    let prompt = format!(
        "Current goal: {}\nCurrent tasks:\n{}\n\nNew user input:\n{}\n\n\
         Classify the impact of this input on the plan. Respond with JSON:\n\
         {{\"impact\": \"none\" | \"extend\" | \"rework\",\n\
         \"affected_tasks\": [task ids to redo],\n\
         \"preserved_tasks\": [task ids that must keep their results],\n\
         \"new_tasks\": [{{\"name\": ..., \"goal\": ..., \"agent\": optional, \"dependencies\": [existing ids]}}],\n\
         \"reply\": \"one-sentence acknowledgement for the user\"}}",
        plan.goal(),
        plan_summary(plan),
        input
    );
    let reply = model
        .generate(
            &[ChatMessage::user(prompt)],
            "You analyze how new requirements impact an execution plan.",
            None,
        )
        .await?;

    match extract_json(&reply.content).and_then(|j| serde_json::from_str(j).ok()) {
        Some(adjustment) => Ok(adjustment),
        None => Ok(PlanAdjustment::none(reply.content)),
    }
}

/// 应用调整：重置 affected 差集、追加新任务。返回变更描述（日志/答复用）。
pub fn apply(plan: &mut Plan, adjustment: &PlanAdjustment) -> Result<Vec<String>, EngineError> {
    let mut changes = Vec::new();

    if adjustment.impact == ImpactKind::None {
        return Ok(changes);
    }

    // 只重置 affected 里未被 preserved 点名的任务
    let to_reset: Vec<TaskId> = adjustment
        .affected_tasks
        .iter()
        .filter(|id| !adjustment.preserved_tasks.contains(*id))
        .cloned()
        .collect();
    if !to_reset.is_empty() {
        let count = plan.reset_tasks(&to_reset);
        if count > 0 {
            changes.push(format!("reset {count} task(s) for rework: {}", to_reset.join(", ")));
        }
    }

    for spec in &adjustment.new_tasks {
        let mut task = Task::new(spec.name.clone(), spec.goal.clone())
            .with_dependencies(spec.dependencies.clone());
        if let Some(agent) = &spec.agent {
            task = task.with_agent(agent.clone());
        }
        let id = task.id.clone();
        plan.add_task(task)?;
        changes.push(format!("added task '{}' ({id})", spec.name));
    }

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockModel;
    use crate::plan::TaskStatus;

    fn plan_with_done_tasks() -> Plan {
        let mut plan = Plan::new("Ship");
        plan.add_task(Task::new("A", "a").with_id("a").with_agent("w")).unwrap();
        plan.add_task(Task::new("B", "b").with_id("b").with_agent("w")).unwrap();
        plan.complete_task("a", "a done");
        plan.complete_task("b", "b done");
        plan
    }

    #[tokio::test]
    async fn test_analyze_parses_adjustment() {
        let model: Arc<dyn LanguageModel> = Arc::new(MockModel::with_replies(vec![
            r#"```json
            {"impact": "rework", "affected_tasks": ["b"], "preserved_tasks": ["a"],
             "new_tasks": [], "reply": "Will redo B."}
            ```"#,
        ]));
        let plan = plan_with_done_tasks();
        let adj = analyze(&model, &plan, "B is wrong, fix it").await.unwrap();
        assert_eq!(adj.impact, ImpactKind::Rework);
        assert_eq!(adj.affected_tasks, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_analyze_unparseable_falls_back_to_none() {
        let model: Arc<dyn LanguageModel> =
            Arc::new(MockModel::with_replies(vec!["Sure, happy to help!"]));
        let plan = plan_with_done_tasks();
        let adj = analyze(&model, &plan, "thanks").await.unwrap();
        assert_eq!(adj.impact, ImpactKind::None);
        assert_eq!(adj.reply, "Sure, happy to help!");
    }

    #[test]
    fn test_apply_resets_only_affected_minus_preserved() {
        let mut plan = plan_with_done_tasks();
        let adj = PlanAdjustment {
            impact: ImpactKind::Rework,
            affected_tasks: vec!["a".into(), "b".into()],
            preserved_tasks: vec!["a".into()],
            new_tasks: vec![],
            reply: String::new(),
        };
        apply(&mut plan, &adj).unwrap();

        assert_eq!(plan.get("a").unwrap().status, TaskStatus::Completed);
        assert_eq!(plan.get("a").unwrap().notes.as_deref(), Some("a done"));
        assert_eq!(plan.get("b").unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn test_apply_appends_new_tasks() {
        let mut plan = plan_with_done_tasks();
        let adj = PlanAdjustment {
            impact: ImpactKind::Extend,
            affected_tasks: vec![],
            preserved_tasks: vec![],
            new_tasks: vec![NewTaskSpec {
                name: "C".into(),
                goal: "extra".into(),
                agent: Some("w".into()),
                dependencies: vec!["a".into()],
            }],
            reply: String::new(),
        };
        let changes = apply(&mut plan, &adj).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(changes.len(), 1);
        // 已完成任务原样保留
        assert_eq!(plan.get("a").unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn test_apply_rejects_bad_dependency() {
        let mut plan = plan_with_done_tasks();
        let adj = PlanAdjustment {
            impact: ImpactKind::Extend,
            affected_tasks: vec![],
            preserved_tasks: vec![],
            new_tasks: vec![NewTaskSpec {
                name: "C".into(),
                goal: "extra".into(),
                agent: None,
                dependencies: vec!["missing".into()],
            }],
            reply: String::new(),
        };
        assert!(apply(&mut plan, &adj).is_err());
    }

    #[test]
    fn test_none_impact_is_noop() {
        let mut plan = plan_with_done_tasks();
        let before = serde_json::to_value(&plan).unwrap();
        apply(&mut plan, &PlanAdjustment::none("hi")).unwrap();
        assert_eq!(before, serde_json::to_value(&plan).unwrap());
    }
}
