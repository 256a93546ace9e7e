//! 计划引导：创建或恢复
//!
//! 进程启动时若会话已有计划文档则直接加载继续调度（「加载代替创建」，
//! 没有独立的恢复路径）；否则用一次 LLM 调用把自然语言目标分解为
//! JSON 任务数组，逐个校验插入。

use std::sync::Arc;

use serde::Deserialize;

use crate::agents::RouterChain;
use crate::core::EngineError;
use crate::engine::parse::extract_json;
use crate::llm::{ChatMessage, LanguageModel};
use crate::plan::{Plan, Task, TaskId};
use crate::store::PlanStore;

/// LLM 返回的任务描述
#[derive(Debug, Deserialize)]
struct PlannedTask {
    id: TaskId,
    name: String,
    goal: String,
    #[serde(default)]
    agent: Option<String>,
    #[serde(default)]
    dependencies: Vec<TaskId>,
}

/// 用 LLM 把目标分解为任务 DAG；缺失 Agent 的任务经路由链补齐
pub async fn generate_plan(
    model: &Arc<dyn LanguageModel>,
    router: &RouterChain,
    goal: &str,
    roster: &[String],
) -> Result<Plan, EngineError> {
    let prompt = format!(
        "Goal: {goal}\n\nAvailable agents: {}\n\n\
         Decompose the goal into tasks. Respond with a JSON array:\n\
         [{{\"id\": \"t1\", \"name\": ..., \"goal\": ..., \"agent\": one of the agents,\n\
         \"dependencies\": [ids of prerequisite tasks]}}]\n\
         List prerequisites before the tasks that depend on them.",
        roster.join(", ")
    );
    let reply = model
        .generate(
            &[ChatMessage::user(prompt)],
            "You decompose goals into dependency-ordered task lists.",
            None,
        )
        .await?;

    let json = extract_json(&reply.content)
        .ok_or_else(|| EngineError::PlanParse("no JSON task array in model reply".into()))?;
    let specs: Vec<PlannedTask> = serde_json::from_str(json)
        .map_err(|e| EngineError::PlanParse(format!("{e}: {json}")))?;
    if specs.is_empty() {
        return Err(EngineError::PlanParse("model produced an empty task list".into()));
    }

    let mut plan = Plan::new(goal);
    for spec in specs {
        let mut task = Task::new(spec.name, spec.goal)
            .with_id(spec.id)
            .with_dependencies(spec.dependencies);
        match spec.agent {
            Some(agent) if roster.contains(&agent) => task = task.with_agent(agent),
            _ => {
                if let Some(agent) = router.route(&task, roster).await {
                    task = task.with_agent(agent);
                } else if let Some(first) = roster.first() {
                    task = task.with_agent(first.clone());
                }
            }
        }
        plan.add_task(task)?;
    }
    Ok(plan)
}

/// 会话已有计划则加载（校验后继续调度），否则生成新计划
pub async fn create_or_resume(
    store: &Arc<dyn PlanStore>,
    model: &Arc<dyn LanguageModel>,
    router: &RouterChain,
    session: &str,
    goal: &str,
    roster: &[String],
) -> Result<Plan, EngineError> {
    if store.plan_exists(session).await {
        let plan = store
            .load_plan(session)
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()))?
            .ok_or_else(|| EngineError::Persistence("plan disappeared during load".into()))?;
        plan.validate()?;
        tracing::info!(session, tasks = plan.len(), "Resumed existing plan");
        return Ok(plan);
    }
    let plan = generate_plan(model, router, goal, roster).await?;
    tracing::info!(session, tasks = plan.len(), "Created new plan");
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockModel;
    use crate::store::MemoryStore;

    const PLAN_JSON: &str = r#"```json
    [
      {"id": "t1", "name": "Research", "goal": "gather data", "agent": "writer", "dependencies": []},
      {"id": "t2", "name": "Draft", "goal": "write it", "agent": "writer", "dependencies": ["t1"]}
    ]
    ```"#;

    fn roster() -> Vec<String> {
        vec!["writer".to_string(), "reviewer".to_string()]
    }

    #[tokio::test]
    async fn test_generate_plan_from_model_json() {
        let model: Arc<dyn LanguageModel> = Arc::new(MockModel::with_replies(vec![PLAN_JSON]));
        let plan = generate_plan(&model, &RouterChain::new(), "Ship", &roster())
            .await
            .unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.get("t2").unwrap().dependencies, vec!["t1".to_string()]);
    }

    #[tokio::test]
    async fn test_generate_plan_routes_missing_agent() {
        let json = r#"[{"id": "t1", "name": "Review output", "goal": "check", "dependencies": []}]"#;
        let model: Arc<dyn LanguageModel> = Arc::new(MockModel::with_replies(vec![json]));
        let router = RouterChain::new()
            .with(crate::agents::KeywordRouter::new().with_rule("review", "reviewer"));

        let plan = generate_plan(&model, &router, "Ship", &roster()).await.unwrap();
        assert_eq!(plan.get("t1").unwrap().assigned_agent, "reviewer");
    }

    #[tokio::test]
    async fn test_generate_plan_rejects_garbage() {
        let model: Arc<dyn LanguageModel> =
            Arc::new(MockModel::with_replies(vec!["no json here"]));
        let err = generate_plan(&model, &RouterChain::new(), "Ship", &roster())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PlanParse(_)));
    }

    #[tokio::test]
    async fn test_resume_loads_instead_of_creating() {
        let store: Arc<dyn PlanStore> = Arc::new(MemoryStore::new());
        let mut existing = Plan::new("old goal");
        existing
            .add_task(Task::new("A", "a").with_id("a").with_agent("writer"))
            .unwrap();
        existing.complete_task("a", "already done");
        store.store_plan("s1", &existing).await.unwrap();

        // 模型无脚本：若走生成路径会失败，证明确实是加载
        let model: Arc<dyn LanguageModel> = Arc::new(MockModel::new());
        let plan = create_or_resume(&store, &model, &RouterChain::new(), "s1", "new goal", &roster())
            .await
            .unwrap();
        assert_eq!(plan.goal(), "old goal");
        assert_eq!(plan.get("a").unwrap().notes.as_deref(), Some("already done"));
    }
}
