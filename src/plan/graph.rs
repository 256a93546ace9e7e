//! 计划：任务 DAG 与调度查询
//!
//! 任务存放在插入有序的扁平 Vec 中（展示顺序），依赖以 ID 引用、经 id -> index
//! 查找表解析，不持有对象指针，序列化即整份 JSON 文档。
//! 就绪判定：status == pending 且所有依赖 completed。
//! 插入时校验重复 ID、缺失依赖与环，失败时计划保持不变。

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::EngineError;
use crate::plan::task::{Task, TaskId, TaskStatus};

/// 一次执行会话的持久化单元：目标 + 任务 DAG
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "PlanDocument", into = "PlanDocument")]
pub struct Plan {
    goal: String,
    tasks: Vec<Task>,
    /// id -> tasks 下标，反序列化后重建
    index: HashMap<TaskId, usize>,
}

/// 序列化形态（查找表不落盘）
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PlanDocument {
    goal: String,
    tasks: Vec<Task>,
}

impl From<PlanDocument> for Plan {
    fn from(doc: PlanDocument) -> Self {
        let index = doc
            .tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();
        Self {
            goal: doc.goal,
            tasks: doc.tasks,
            index,
        }
    }
}

impl From<Plan> for PlanDocument {
    fn from(plan: Plan) -> Self {
        Self {
            goal: plan.goal,
            tasks: plan.tasks,
        }
    }
}

impl Plan {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            tasks: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    /// 追加任务；重复 ID、缺失依赖或会构成环时拒绝且计划不变
    pub fn add_task(&mut self, task: Task) -> Result<(), EngineError> {
        if self.index.contains_key(&task.id) {
            return Err(EngineError::DuplicateTask(task.id));
        }
        for dep in &task.dependencies {
            if dep == &task.id {
                return Err(EngineError::InvalidDependency(format!(
                    "task '{}' depends on itself",
                    task.id
                )));
            }
            if !self.index.contains_key(dep) {
                return Err(EngineError::InvalidDependency(format!(
                    "task '{}' references unknown dependency '{}'",
                    task.id, dep
                )));
            }
        }
        self.index.insert(task.id.clone(), self.tasks.len());
        self.tasks.push(task);
        // 插入只引用已存在的任务，边总指向更早的节点；校验兜底从磁盘加载后的追加
        if let Some(cycle_at) = self.find_cycle() {
            let task = self.tasks.pop().expect("just pushed");
            self.index.remove(&task.id);
            return Err(EngineError::InvalidDependency(format!(
                "adding task '{}' would create a cycle through '{}'",
                task.id, cycle_at
            )));
        }
        Ok(())
    }

    /// 深度优先找环；返回环上任一任务 ID
    fn find_cycle(&self) -> Option<TaskId> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Gray,
            Black,
        }
        let mut marks = vec![Mark::White; self.tasks.len()];

        fn visit(
            plan: &Plan,
            i: usize,
            marks: &mut Vec<Mark>,
        ) -> Option<TaskId> {
            marks[i] = Mark::Gray;
            for dep in &plan.tasks[i].dependencies {
                if let Some(&j) = plan.index.get(dep) {
                    match marks[j] {
                        Mark::Gray => return Some(plan.tasks[j].id.clone()),
                        Mark::White => {
                            if let Some(id) = visit(plan, j, marks) {
                                return Some(id);
                            }
                        }
                        Mark::Black => {}
                    }
                }
            }
            marks[i] = Mark::Black;
            None
        }

        for i in 0..self.tasks.len() {
            if marks[i] == Mark::White {
                if let Some(id) = visit(self, i, &mut marks) {
                    return Some(id);
                }
            }
        }
        None
    }

    /// 校验整份计划（从磁盘加载后调用）：依赖存在且无环
    pub fn validate(&self) -> Result<(), EngineError> {
        for task in &self.tasks {
            for dep in &task.dependencies {
                if !self.index.contains_key(dep) {
                    return Err(EngineError::InvalidDependency(format!(
                        "task '{}' references unknown dependency '{}'",
                        task.id, dep
                    )));
                }
            }
        }
        if let Some(id) = self.find_cycle() {
            return Err(EngineError::InvalidDependency(format!(
                "plan contains a dependency cycle through '{}'",
                id
            )));
        }
        Ok(())
    }

    fn is_actionable(&self, task: &Task) -> bool {
        task.status == TaskStatus::Pending
            && task.dependencies.iter().all(|dep| {
                self.get(dep)
                    .map(|d| d.status == TaskStatus::Completed)
                    .unwrap_or(false)
            })
    }

    /// 取一个就绪任务：计划顺序中第一个（稳定、可复现）
    pub fn next_actionable_task(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| self.is_actionable(t))
    }

    /// 取至多 max_tasks 个就绪任务（同序）。依赖判定本身保证返回集中不存在依赖关系。
    pub fn actionable_tasks(&self, max_tasks: usize) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| self.is_actionable(t))
            .take(max_tasks)
            .collect()
    }

    /// 状态变更的唯一入口；未知 ID 返回 false。
    /// 进入终态时记录时间，回到 pending 时清除。
    pub fn update_task_status(&mut self, id: &str, status: TaskStatus) -> bool {
        let Some(&i) = self.index.get(id) else {
            return false;
        };
        let task = &mut self.tasks[i];
        if task.status == status {
            // 幂等：同状态重复设置不产生文档差异
            return true;
        }
        task.status = status;
        if status.is_terminal() {
            task.completed_at = Some(chrono::Utc::now().timestamp_millis());
        } else if status == TaskStatus::Pending {
            task.completed_at = None;
        }
        true
    }

    /// 标记完成并附加结果说明
    pub fn complete_task(&mut self, id: &str, notes: impl Into<String>) -> bool {
        if !self.update_task_status(id, TaskStatus::Completed) {
            return false;
        }
        let i = self.index[id];
        self.tasks[i].notes = Some(notes.into());
        true
    }

    /// 标记失败并记录错误说明
    pub fn fail_task(&mut self, id: &str, error: impl Into<String>) -> bool {
        if !self.update_task_status(id, TaskStatus::Failed) {
            return false;
        }
        let i = self.index[id];
        self.tasks[i].notes = Some(error.into());
        true
    }

    /// 改派任务负责人（hand-off / 路由补齐）；未知 ID 返回 false
    pub fn set_task_agent(&mut self, id: &str, agent: impl Into<String>) -> bool {
        let Some(&i) = self.index.get(id) else {
            return false;
        };
        self.tasks[i].assigned_agent = agent.into();
        true
    }

    /// 将指定任务集重置回 pending（用户 retry / 动态调整），清空原结果。
    /// 只动列出的任务，返回实际重置数量。
    pub fn reset_tasks(&mut self, ids: &[TaskId]) -> usize {
        let wanted: HashSet<&TaskId> = ids.iter().collect();
        let mut count = 0;
        for task in &mut self.tasks {
            if wanted.contains(&task.id) {
                task.status = TaskStatus::Pending;
                task.notes = None;
                task.completed_at = None;
                count += 1;
            }
        }
        count
    }

    pub fn is_complete(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|t| t.status == TaskStatus::Completed)
    }

    pub fn has_failed_tasks(&self) -> bool {
        self.tasks.iter().any(|t| t.status == TaskStatus::Failed)
    }

    /// 是否存在失败且策略为 halt 的任务（整个计划应停止）
    pub fn halt_required(&self) -> bool {
        self.tasks.iter().any(|t| {
            t.status == TaskStatus::Failed
                && t.on_failure == crate::plan::task::FailurePolicy::Halt
        })
    }

    /// 收集指定依赖中已完成任务的 (name, notes)，供下游任务提示词使用
    pub fn completed_context(&self, deps: &[TaskId]) -> Vec<(String, String)> {
        deps.iter()
            .filter_map(|id| self.get(id))
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| {
                (
                    t.name.clone(),
                    t.notes.clone().unwrap_or_else(|| "(no notes)".to_string()),
                )
            })
            .collect()
    }
}
