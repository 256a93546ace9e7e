//! 提示词构造
//!
//! 任务提示 = 总目标 + 本任务目标 + 已完成依赖的结果上下文；
//! system = 工作区约定 + 工具调用格式说明（schemars 生成的 schema）。

use crate::plan::{Plan, Task};

/// 任务执行的 system 段：约定 + 工具使用说明
pub fn task_system_prompt(conventions: &str, tool_schema: Option<&str>) -> String {
    let mut out = String::new();
    if !conventions.is_empty() {
        out.push_str(conventions);
        out.push_str("\n\n");
    }
    match tool_schema {
        Some(schema) => {
            out.push_str(
                "To use a tool, reply with exactly one JSON object of the form \
                 {\"tool\": \"<name>\", \"args\": {...}}. Tool call format schema:\n",
            );
            out.push_str(&crate::tools::tool_call_schema_json());
            out.push_str("\nAvailable tools:\n");
            out.push_str(schema);
            out.push_str("\n\nWhen the task is done, reply with the final result as plain text.");
        }
        None => {
            out.push_str("Reply with the final result of the task as plain text.");
        }
    }
    out
}

/// 任务执行的 user 段：总目标、任务目标与依赖上下文
pub fn task_user_prompt(plan: &Plan, task: &Task) -> String {
    let mut out = format!(
        "Overall goal: {}\n\nYour task: {}\n{}",
        plan.goal(),
        task.name,
        task.goal
    );
    let context = plan.completed_context(&task.dependencies);
    if !context.is_empty() {
        out.push_str("\n\nResults from completed prerequisite tasks:");
        for (name, notes) in context {
            out.push_str(&format!("\n- {name}: {notes}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Task;

    #[test]
    fn test_user_prompt_includes_dependency_notes() {
        let mut plan = Plan::new("Ship the report");
        plan.add_task(Task::new("Research", "gather data").with_id("r")).unwrap();
        plan.add_task(
            Task::new("Write", "draft it")
                .with_id("w")
                .with_dependencies(vec!["r".into()]),
        )
        .unwrap();
        plan.complete_task("r", "sources collected");

        let prompt = task_user_prompt(&plan, plan.get("w").unwrap());
        assert!(prompt.contains("Ship the report"));
        assert!(prompt.contains("draft it"));
        assert!(prompt.contains("sources collected"));
    }

    #[test]
    fn test_system_prompt_with_and_without_tools() {
        let with = task_system_prompt("Be brief.", Some("[{\"name\": \"echo\"}]"));
        assert!(with.contains("Available tools"));
        assert!(with.contains("Be brief."));

        let without = task_system_prompt("", None);
        assert!(without.contains("plain text"));
        assert!(!without.contains("Available tools"));
    }
}
