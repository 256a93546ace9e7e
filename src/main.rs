//! Hive - 计划驱动的多智能体执行引擎
//!
//! 入口：初始化日志、加载配置、创建/恢复会话并驱动执行到完成或阻塞。

use anyhow::Context;
use hive::config::{load_config, AppConfig};
use hive::engine::RunStatus;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let goal: String = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if goal.trim().is_empty() {
        eprintln!("Usage: hive <goal>");
        eprintln!("  e.g. hive \"Research competitors and draft a summary report\"");
        std::process::exit(2);
    }

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let (queue, consumer) = hive::create_session(&cfg, &goal)
        .await
        .context("Failed to create session")?;

    // 空消息 = 继续执行；run 循环自行推进到完成或阻塞
    let reply = queue.send("").await.context("Execution failed")?;
    println!("{reply}");

    drop(queue);
    let engine = consumer.await.context("Consumer task panicked")?;
    let status = if engine.plan().is_complete() {
        RunStatus::Complete
    } else {
        RunStatus::Blocked
    };
    tracing::info!(?status, "Session finished");
    Ok(())
}
