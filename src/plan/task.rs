//! 任务节点
//!
//! 计划中的最小可调度单元：目标、负责 Agent、依赖集合与状态。
//! 状态单调推进（pending -> in_progress -> completed/failed），
//! 仅显式重置（retry / 用户返工）允许 failed/completed 回到 pending。

use serde::{Deserialize, Serialize};

/// 任务 ID（创建时分配，此后不变）
pub type TaskId = String;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 等待调度
    Pending,
    /// 已分派给 Agent，执行中
    InProgress,
    /// 已完成
    Completed,
    /// 执行失败
    Failed,
}

impl TaskStatus {
    /// 是否为终态（completed / failed）
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// 任务失败时的计划级策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// 继续调度与之无依赖关系的任务
    #[default]
    Proceed,
    /// 停止整个计划
    Halt,
}

/// 计划中的一个任务节点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// 稳定唯一标识
    pub id: TaskId,
    /// 简短名称（用户可读）
    pub name: String,
    /// 该任务要达成的目标描述
    pub goal: String,
    /// 负责的 Agent 名称（可被 hand-off 改派）
    pub assigned_agent: String,
    /// 前置任务 ID 集合，全部 completed 后本任务才可调度
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    pub status: TaskStatus,
    #[serde(default)]
    pub on_failure: FailurePolicy,
    /// 完成/失败时附加的结果说明，供用户展示与下游任务上下文使用
    #[serde(default)]
    pub notes: Option<String>,
    /// 创建时间（毫秒时间戳）
    pub created_at: i64,
    /// 进入终态的时间
    #[serde(default)]
    pub completed_at: Option<i64>,
}

impl Task {
    pub fn new(name: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            id: format!("task_{}", uuid::Uuid::new_v4()),
            name: name.into(),
            goal: goal.into(),
            assigned_agent: String::new(),
            dependencies: Vec::new(),
            status: TaskStatus::Pending,
            on_failure: FailurePolicy::default(),
            notes: None,
            created_at: chrono::Utc::now().timestamp_millis(),
            completed_at: None,
        }
    }

    /// 使用指定 ID（hand-off 合成任务、测试用）
    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.assigned_agent = agent.into();
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<TaskId>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}
