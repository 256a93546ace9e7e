//! 引擎错误类型
//!
//! 校验错误在变更边界同步拒绝（计划保持不变）；Agent 错误按任务捕获并转为 failed 状态；
//! 持久化错误降级为警告（内存状态仍然权威）；超时为独立类型，调用方可区分「仍在执行」与「失败」。

use thiserror::Error;

use crate::llm::LlmError;

/// 执行引擎可能出现的错误（校验、Agent、持久化、超时）
#[derive(Error, Debug)]
pub enum EngineError {
    /// 任务 ID 已存在，插入被拒绝
    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    /// 依赖引用了不存在的任务，或会构成环
    #[error("Invalid dependency: {0}")]
    InvalidDependency(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Agent 调用失败（按任务捕获，通常转为任务 failed 而非向上传播）
    #[error("Agent '{agent}' failed: {reason}")]
    AgentFailed { agent: String, reason: String },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// LLM 输出无法解析为计划/调整/路由结果
    #[error("Plan parse error: {0}")]
    PlanParse(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    /// 消息处理超时（底层步骤不会被强杀，结果被丢弃）
    #[error("Message processing timed out after {0}s")]
    MessageTimeout(u64),

    /// 队列消费端已退出
    #[error("Message queue closed")]
    QueueClosed,
}
