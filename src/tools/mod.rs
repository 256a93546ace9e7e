//! 工具层：注册表、安全策略、受控网关与审计
//!
//! 注册表在启动时显式构造、注入网关；网关对每次调用做
//! 权限检查 -> 并发限额 -> 超时 -> 审计 的统一包装。

use schemars::{schema_for, JsonSchema};

pub mod audit;
pub mod echo;
pub mod gateway;
pub mod policy;
pub mod registry;

pub use audit::{AuditLog, AuditStats, ToolCallRecord};
pub use echo::EchoTool;
pub use gateway::{ToolError, ToolGateway, ToolOutcome};
pub use policy::SecurityPolicy;
pub use registry::{FnTool, Tool, ToolRegistry};

/// 工具调用请求格式：引擎从 Agent 回复中解析的 `{"tool": "...", "args": {...}}`
/// （仅用于 Schema 生成，注入提示词减少格式错误）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，须来自 Available tools 列表
    pub tool: String,
    /// 工具参数对象，结构依工具而定
    pub args: serde_json::Value,
}

/// 返回工具调用请求的 JSON Schema 字符串，可拼入 system prompt
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}
