//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），
//! 由 ToolRegistry 按名注册与查找。注册表在启动时显式构造并传引用给 ToolGateway
//! （依赖注入，无进程级可变全局状态）。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value;

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（用于工具调用 JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema（供 LLM 生成正确的参数格式）
    /// 默认返回空对象，表示无参数或参数格式不限
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 闭包工具适配器：把任意 `(args) -> Result<String, String>` 的异步可调用
/// 包装成 Tool，供外部协作者在启动时注册自己的实现
pub struct FnTool {
    name: String,
    description: String,
    schema: Value,
    f: Arc<dyn Fn(Value) -> BoxFuture<'static, Result<String, String>> + Send + Sync>,
}

impl FnTool {
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<String, String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
            f: Arc::new(move |args| Box::pin(f(args))),
        }
    }

    /// 包装同步（可能阻塞的）实现：丢到阻塞线程池执行，
    /// 网关的超时对同步/异步工具一视同仁
    pub fn blocking<F>(name: impl Into<String>, description: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Result<String, String> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::new(name, description, move |args| {
            let f = Arc::clone(&f);
            async move {
                tokio::task::spawn_blocking(move || f(args))
                    .await
                    .map_err(|e| format!("blocking tool panicked: {e}"))?
            }
        })
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        (self.f)(args).await
    }
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 返回 (name, description) 列表，用于生成提示词中的 Available tools 段落
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .tools
            .iter()
            .map(|(name, tool)| (name.clone(), tool.description().to_string()))
            .collect();
        out.sort();
        out
    }

    /// 导出全部工具的 schema JSON（名称排序，保证提示词稳定）
    pub fn to_schema_json(&self) -> String {
        let mut entries: Vec<(&String, &Arc<dyn Tool>)> = self.tools.iter().collect();
        entries.sort_by_key(|(name, _)| name.as_str());
        let tools: Vec<Value> = entries
            .into_iter()
            .map(|(name, tool)| {
                serde_json::json!({
                    "name": name,
                    "description": tool.description(),
                    "parameters": tool.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_tool_roundtrip() {
        let mut registry = ToolRegistry::new();
        registry.register(FnTool::new("upper", "Uppercase text", |args: Value| async move {
            let text = args.get("text").and_then(|v| v.as_str()).unwrap_or("");
            Ok(text.to_uppercase())
        }));

        let tool = registry.get("upper").unwrap();
        let out = tool
            .execute(serde_json::json!({"text": "abc"}))
            .await
            .unwrap();
        assert_eq!(out, "ABC");
        assert_eq!(registry.tool_names(), vec!["upper"]);
    }

    #[tokio::test]
    async fn test_blocking_tool_runs_off_executor() {
        let tool = FnTool::blocking("sum", "Add numbers", |args: Value| {
            let a = args.get("a").and_then(|v| v.as_i64()).unwrap_or(0);
            let b = args.get("b").and_then(|v| v.as_i64()).unwrap_or(0);
            Ok((a + b).to_string())
        });
        let out = tool.execute(serde_json::json!({"a": 2, "b": 3})).await.unwrap();
        assert_eq!(out, "5");
    }

    #[test]
    fn test_schema_export_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(FnTool::new("zeta", "z", |_| async { Ok(String::new()) }));
        registry.register(FnTool::new("alpha", "a", |_| async { Ok(String::new()) }));

        let schema = registry.to_schema_json();
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&schema).unwrap();
        assert_eq!(parsed[0]["name"], "alpha");
        assert_eq!(parsed[1]["name"], "zeta");
    }
}
