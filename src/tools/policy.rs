//! 工具安全策略
//!
//! 每个 Agent 一份允许列表（默认列表 + 按名覆盖），外加全局拒绝列表。
//! 每次调用前检查：全局拒绝优先；未列入该 Agent 允许列表的工具直接拒绝，
//! 不做任何部分执行。列表中的 "*" 表示放行全部。

use std::collections::HashMap;

use serde::Deserialize;

use crate::tools::gateway::ToolError;

/// 工具访问策略（可从配置反序列化）
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityPolicy {
    /// 未配置覆盖的 Agent 使用的允许列表
    #[serde(default)]
    pub default_allow: Vec<String>,
    /// 按 Agent 名覆盖默认允许列表
    #[serde(default)]
    pub agent_allow: HashMap<String, Vec<String>>,
    /// 全局拒绝列表，对所有 Agent 生效
    #[serde(default)]
    pub global_deny: Vec<String>,
}

impl SecurityPolicy {
    /// 放行全部工具（演示/测试）
    pub fn allow_all() -> Self {
        Self {
            default_allow: vec!["*".to_string()],
            agent_allow: HashMap::new(),
            global_deny: Vec::new(),
        }
    }

    pub fn new(default_allow: Vec<String>) -> Self {
        Self {
            default_allow,
            agent_allow: HashMap::new(),
            global_deny: Vec::new(),
        }
    }

    pub fn with_agent_allow(mut self, agent: impl Into<String>, tools: Vec<String>) -> Self {
        self.agent_allow.insert(agent.into(), tools);
        self
    }

    pub fn with_denied(mut self, tool: impl Into<String>) -> Self {
        self.global_deny.push(tool.into());
        self
    }

    /// 检查 agent 是否可调用 tool；不通过时返回具体拒绝原因
    pub fn check(&self, agent: &str, tool: &str) -> Result<(), ToolError> {
        if self.global_deny.iter().any(|t| t == tool) {
            return Err(ToolError::Denied(tool.to_string()));
        }
        let allow = self
            .agent_allow
            .get(agent)
            .unwrap_or(&self.default_allow);
        let permitted = allow.iter().any(|t| t == "*" || t == tool);
        if !permitted {
            return Err(ToolError::PermissionDenied {
                tool: tool.to_string(),
                agent: agent.to_string(),
            });
        }
        Ok(())
    }
}
