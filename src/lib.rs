//! Hive - 计划驱动的多智能体执行引擎
//!
//! 把用户目标分解为任务依赖图，按就绪顺序（顺序或有界并行批次）调度到
//! 各 LLM Agent，所有状态变迁即时持久化，执行过程可随时被用户对话打断、
//! 重定向或扩展。
//!
//! 模块划分：
//! - **agents**: Agent 档案、团队与路由（关键词 / 模型兜底）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 引擎错误分类
//! - **engine**: 执行引擎（Step / StepParallel / run、hand-off、动态调整、引导）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **plan**: 任务 DAG 与调度查询
//! - **queue**: 消息队列与中断控制
//! - **session**: 会话装配（配置 -> 引擎 + 队列消费循环）
//! - **store**: 计划存储（内存 / 文件 / SQLite）与持久化适配器
//! - **tools**: 工具注册表、安全策略、受控网关与审计

pub mod agents;
pub mod config;
pub mod core;
pub mod engine;
pub mod llm;
pub mod observability;
pub mod plan;
pub mod queue;
pub mod session;
pub mod store;
pub mod tools;

pub use session::create_session;
