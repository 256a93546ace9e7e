//! 会话装配：从配置构建整套运行时
//!
//! 负责：选择 LLM 与存储后端、注册工具与 Agent 团队、装配路由/hand-off/
//! 引擎，建立消息队列并在后台任务中启动单消费循环。
//! 返回生产者句柄与消费任务柄；队列关闭后消费任务返回引擎终态。

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::agents::{AgentProfile, AgentTeam, KeywordRouter, ModelRouter, RouterChain};
use crate::config::AppConfig;
use crate::core::EngineError;
use crate::engine::{
    bootstrap, run_consumer, Engine, ExecutionConfig, HandoffEvaluator, ModelJudge,
};
use crate::llm::create_model_from_config;
use crate::queue::{self, MessageQueue};
use crate::store::{FileStore, MemoryStore, PersistenceAdapter, PlanStore, SqliteStore};
use crate::tools::{EchoTool, ToolGateway, ToolRegistry};

/// 内置默认团队（配置未提供 agents 时）
fn default_team_profiles() -> Vec<AgentProfile> {
    vec![
        AgentProfile::new(
            "worker",
            "You are a diligent generalist agent. Complete the assigned task and report the result concisely.",
        ),
        AgentProfile::new(
            "reviewer",
            "You are a critical reviewer. Check the work described in the task and report issues or approval.",
        ),
    ]
}

fn build_store(cfg: &AppConfig) -> Result<Arc<dyn PlanStore>, EngineError> {
    let data_dir = cfg
        .app
        .data_dir
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from(".hive"));
    match cfg.app.store_backend.as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        "sqlite" => {
            std::fs::create_dir_all(&data_dir)
                .map_err(|e| EngineError::Persistence(e.to_string()))?;
            let store = SqliteStore::open(data_dir.join("hive.db"))
                .map_err(|e| EngineError::Persistence(e.to_string()))?;
            Ok(Arc::new(store))
        }
        _ => Ok(Arc::new(FileStore::new(data_dir))),
    }
}

/// 创建会话：装配引擎、启动消费循环。
/// 会话已有持久化计划时直接恢复，否则用 LLM 把 goal 分解为新计划。
pub async fn create_session(
    cfg: &AppConfig,
    goal: &str,
) -> Result<(MessageQueue, JoinHandle<Engine>), EngineError> {
    let session = cfg
        .app
        .session_id
        .clone()
        .unwrap_or_else(|| "default".to_string());

    let model = create_model_from_config(cfg);
    let store = build_store(cfg)?;

    let profiles = if cfg.agents.is_empty() {
        default_team_profiles()
    } else {
        cfg.agents.clone()
    };
    let mut team = AgentTeam::new(model.clone());
    // Agent 名本身作为关键词规则，任务提到谁就派给谁；模型路由兜底
    let mut keyword_router = KeywordRouter::new();
    for profile in profiles {
        keyword_router = keyword_router.with_rule(profile.name.clone(), profile.name.clone());
        team.register(profile);
    }
    let router = RouterChain::new()
        .with(keyword_router)
        .with(ModelRouter::new(model.clone()));

    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    let gateway = Arc::new(
        ToolGateway::new(registry, cfg.tools.policy.clone())
            .with_max_concurrent(cfg.tools.max_concurrent)
            .with_timeout_secs(cfg.tools.tool_timeout_secs)
            .with_batch_cap(cfg.tools.batch_cap)
            .with_audit_capacity(cfg.tools.audit_capacity),
    );

    let roster = team.names();
    let plan = bootstrap::create_or_resume(&store, &model, &router, &session, goal, &roster).await?;

    let adapter = PersistenceAdapter::new(store, session);
    adapter.persist(&plan).await;

    let handoffs = HandoffEvaluator::new(cfg.handoff.rules.clone())
        .with_judge(ModelJudge::new(model.clone()));

    let (queue, rx) = queue::channel(cfg.execution.message_timeout_secs);
    let engine = Engine::new(plan, team, gateway, adapter)
        .with_handoffs(handoffs)
        .with_router(router)
        .with_config(ExecutionConfig {
            max_parallel_tasks: cfg.execution.max_parallel_tasks,
            parallel_fallback_threshold: cfg.execution.parallel_fallback_threshold,
            conventions: cfg.execution.conventions.clone(),
        })
        .with_interrupt(queue.interrupt_signal());

    let consumer = tokio::spawn(run_consumer(rx, engine));
    Ok((queue, consumer))
}
