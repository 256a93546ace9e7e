//! 工具网关
//!
//! 所有副作用动作的统一执行层：按 Agent 的安全策略检查 -> 并发许可
//! （到上限立即拒绝，不无限排队）-> 统一超时 -> 审计记录。
//! 工具错误一律折叠为 is_error 的结构化结果返回给调用方 Agent，
//! 不作为进程级错误向上抛。批量调用超过上限整批拒绝，否则逐个独立成败。

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::llm::ToolInvocation;
use crate::tools::audit::{AuditLog, AuditStats, ToolCallRecord};
use crate::tools::policy::SecurityPolicy;
use crate::tools::registry::ToolRegistry;

/// 工具层错误（全部折叠进 ToolOutcome，不向上传播）
#[derive(Error, Debug, Clone)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool '{tool}' not permitted for agent '{agent}'")]
    PermissionDenied { tool: String, agent: String },

    /// 全局拒绝列表命中
    #[error("Tool '{0}' is denied for all agents")]
    Denied(String),

    #[error("Tool concurrency limit reached ({0} running)")]
    ConcurrencyExceeded(usize),

    #[error("Batch of {got} tool calls exceeds cap of {cap}")]
    BatchTooLarge { got: usize, cap: usize },

    #[error("Tool '{0}' timed out")]
    Timeout(String),

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),
}

/// 单次调用的结构化结果；is_error 时 output 为错误说明
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub call_id: String,
    pub tool: String,
    pub output: String,
    pub is_error: bool,
    pub duration_ms: u64,
}

/// 工具网关：注册表 + 策略 + 并发限额 + 超时 + 审计
pub struct ToolGateway {
    registry: ToolRegistry,
    policy: SecurityPolicy,
    limiter: Arc<Semaphore>,
    max_concurrent: usize,
    timeout: Duration,
    batch_cap: usize,
    audit: Mutex<AuditLog>,
}

impl ToolGateway {
    pub fn new(registry: ToolRegistry, policy: SecurityPolicy) -> Self {
        Self {
            registry,
            policy,
            limiter: Arc::new(Semaphore::new(3)),
            max_concurrent: 3,
            timeout: Duration::from_secs(60),
            batch_cap: 10,
            audit: Mutex::new(AuditLog::default()),
        }
    }

    /// 进程级同时执行上限（到上限立即拒绝）
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        let max = max.max(1);
        self.limiter = Arc::new(Semaphore::new(max));
        self.max_concurrent = max;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs.max(1));
        self
    }

    pub fn with_batch_cap(mut self, cap: usize) -> Self {
        self.batch_cap = cap.max(1);
        self
    }

    pub fn with_audit_capacity(mut self, capacity: usize) -> Self {
        self.audit = Mutex::new(AuditLog::new(capacity));
        self
    }

    pub fn tool_schema_json(&self) -> String {
        self.registry.to_schema_json()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 执行单次调用；任何失败（权限/限流/超时/执行）都变为 is_error 的结果
    pub async fn invoke(&self, agent: &str, call: &ToolInvocation) -> ToolOutcome {
        let start = Instant::now();
        let result = self.try_invoke(agent, call).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (output, is_error) = match result {
            Ok(output) => (output, false),
            Err(e) => (e.to_string(), true),
        };

        let record = ToolCallRecord::new(
            call.tool.clone(),
            agent,
            &call.args,
            !is_error,
            &output,
            duration_ms,
        );
        let audit_line = serde_json::json!({
            "event": "tool_audit",
            "tool": call.tool,
            "agent": agent,
            "ok": !is_error,
            "duration_ms": duration_ms,
            "args_preview": record.args,
        });
        tracing::info!(audit = %audit_line.to_string(), "tool");
        self.audit.lock().unwrap().push(record);

        ToolOutcome {
            call_id: call.id.clone(),
            tool: call.tool.clone(),
            output,
            is_error,
            duration_ms,
        }
    }

    async fn try_invoke(&self, agent: &str, call: &ToolInvocation) -> Result<String, ToolError> {
        self.policy.check(agent, &call.tool)?;

        let tool = self
            .registry
            .get(&call.tool)
            .ok_or_else(|| ToolError::UnknownTool(call.tool.clone()))?;

        // 到上限立即拒绝而非排队，调用方能感知背压
        let _permit = self
            .limiter
            .clone()
            .try_acquire_owned()
            .map_err(|_| ToolError::ConcurrencyExceeded(self.max_concurrent))?;

        match timeout(self.timeout, tool.execute(call.args.clone())).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ToolError::ExecutionFailed(e)),
            Err(_) => Err(ToolError::Timeout(call.tool.clone())),
        }
    }

    /// 批量调用：超过上限整批拒绝；否则每个调用独立成败，一个失败不影响其余
    pub async fn invoke_batch(
        &self,
        agent: &str,
        calls: &[ToolInvocation],
    ) -> Result<Vec<ToolOutcome>, ToolError> {
        if calls.len() > self.batch_cap {
            return Err(ToolError::BatchTooLarge {
                got: calls.len(),
                cap: self.batch_cap,
            });
        }
        let mut outcomes = Vec::with_capacity(calls.len());
        for call in calls {
            outcomes.push(self.invoke(agent, call).await);
        }
        Ok(outcomes)
    }

    pub fn audit_recent(&self, n: usize) -> Vec<ToolCallRecord> {
        self.audit.lock().unwrap().recent(n)
    }

    pub fn audit_stats(&self) -> AuditStats {
        self.audit.lock().unwrap().stats()
    }
}
