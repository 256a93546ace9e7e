//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，
//! 如 `HIVE__EXECUTION__MAX_PARALLEL_TASKS=1`）。

use serde::Deserialize;

use crate::agents::AgentProfile;
use crate::engine::HandoffRule;
use crate::tools::SecurityPolicy;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub execution: ExecutionSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub handoff: HandoffSection,
    /// Agent 档案列表；为空时用内置默认团队
    #[serde(default)]
    pub agents: Vec<AgentProfile>,
}

/// [app] 段：会话标识与存储位置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 会话 ID，未设置时用 "default"
    pub session_id: Option<String>,
    /// 持久化根目录，未设置时用 ./.hive
    pub data_dir: Option<std::path::PathBuf>,
    /// 存储后端：file / sqlite / memory
    #[serde(default = "default_store_backend")]
    pub store_backend: String,
}

fn default_store_backend() -> String {
    "file".to_string()
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            session_id: None,
            data_dir: None,
            store_backend: default_store_backend(),
        }
    }
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

/// [execution] 段：并行度、回退阈值与消息超时
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionSection {
    /// 并行批次上限；1 为纯顺序
    #[serde(default = "default_max_parallel_tasks")]
    pub max_parallel_tasks: usize,
    /// 就绪任务少于该值时退化为顺序执行
    #[serde(default = "default_parallel_fallback_threshold")]
    pub parallel_fallback_threshold: usize,
    /// 每条消息等待结果的上限（秒）
    #[serde(default = "default_message_timeout_secs")]
    pub message_timeout_secs: u64,
    /// 拼入 system 的工作区约定
    #[serde(default)]
    pub conventions: String,
}

fn default_max_parallel_tasks() -> usize {
    3
}

fn default_parallel_fallback_threshold() -> usize {
    2
}

fn default_message_timeout_secs() -> u64 {
    300
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            max_parallel_tasks: default_max_parallel_tasks(),
            parallel_fallback_threshold: default_parallel_fallback_threshold(),
            message_timeout_secs: default_message_timeout_secs(),
            conventions: String::new(),
        }
    }
}

/// [tools] 段：网关限额、超时与安全策略
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 进程级同时执行上限
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// 单个 Agent 回合内的批量调用上限
    #[serde(default = "default_batch_cap")]
    pub batch_cap: usize,
    /// 审计环形缓冲容量
    #[serde(default = "default_audit_capacity")]
    pub audit_capacity: usize,
    #[serde(default = "default_policy")]
    pub policy: SecurityPolicy,
}

fn default_max_concurrent() -> usize {
    3
}

fn default_tool_timeout_secs() -> u64 {
    60
}

fn default_batch_cap() -> usize {
    10
}

fn default_audit_capacity() -> usize {
    1000
}

fn default_policy() -> SecurityPolicy {
    SecurityPolicy::allow_all()
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            tool_timeout_secs: default_tool_timeout_secs(),
            batch_cap: default_batch_cap(),
            audit_capacity: default_audit_capacity(),
            policy: default_policy(),
        }
    }
}

/// [handoff] 段：规则表
#[derive(Debug, Clone, Deserialize, Default)]
pub struct HandoffSection {
    #[serde(default)]
    pub rules: Vec<HandoffRule>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            execution: ExecutionSection::default(),
            tools: ToolsSection::default(),
            handoff: HandoffSection::default(),
            agents: Vec::new(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(
    config_path: Option<std::path::PathBuf>,
) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
