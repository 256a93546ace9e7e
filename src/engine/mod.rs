//! 执行引擎
//!
//! 驱动调度器、按任务调用 Agent、应用 hand-off 规则、持久化每一次状态
//! 变迁。两种执行模式共用同一任务完成协议：Step 取一个就绪任务顺序执行；
//! StepParallel 并发执行一批互不依赖的任务（不足阈值时退化为 Step）。
//! run 循环在任务边界检查中断信号 —— 协作式取消，绝不打断执行中的任务。
//!
//! 失败语义：Agent 错误按任务捕获记为 failed；引擎级错误（持久化、坏计划）
//! 向调用方传播，内存状态先于且独立于持久化尝试完成变更。

use std::sync::Arc;

use futures_util::future::join_all;

use crate::agents::{AgentTeam, RouterChain};
use crate::core::EngineError;
use crate::llm::ChatMessage;
use crate::plan::{FailurePolicy, Plan, Task, TaskStatus};
use crate::queue::{InterruptSignal, Message, MessageReceiver};
use crate::store::PersistenceAdapter;
use crate::tools::ToolGateway;

pub mod adjust;
pub mod bootstrap;
pub mod handoff;
pub mod parse;
pub mod prompt;

pub use handoff::{ConditionJudge, HandoffEvaluator, HandoffRule, KeywordJudge, ModelJudge};

/// 单任务内的最大工具轮数，防止死循环
const MAX_TOOL_ROUNDS: usize = 8;
/// 任务结果在摘要里的预览长度
const SUMMARY_PREVIEW_CHARS: usize = 120;

/// 执行参数（见配置 [execution] 段）
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// 并行批次上限；1 表示纯顺序执行
    pub max_parallel_tasks: usize,
    /// 就绪任务少于该值时退化为顺序 Step
    pub parallel_fallback_threshold: usize,
    /// 拼入 system 的工作区约定
    pub conventions: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 3,
            parallel_fallback_threshold: 2,
            conventions: String::new(),
        }
    }
}

/// 一次 Step 的结果
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// 顺序步骤完成一个任务
    Completed { task_id: String, notes: String },
    /// 顺序步骤中任务失败；halted 表示其策略要求停止整个计划
    Failed {
        task_id: String,
        error: String,
        halted: bool,
    },
    /// 并行批次：逐任务 ✅/⚠️ 汇总
    Batch {
        summary: String,
        completed: usize,
        failed: usize,
    },
    /// 当前没有就绪任务
    NoActionableTask,
}

/// run 循环的终止状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// 所有任务完成
    Complete,
    /// 有失败且无法继续（halt 或无就绪任务）
    Blocked,
    /// 新输入到达，在任务边界让出
    Paused,
}

/// run 循环的结果
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    pub summary: String,
}

/// 执行引擎：计划的唯一属主
pub struct Engine {
    plan: Plan,
    team: AgentTeam,
    gateway: Arc<ToolGateway>,
    handoffs: HandoffEvaluator,
    router: RouterChain,
    adapter: PersistenceAdapter,
    config: ExecutionConfig,
    interrupt: InterruptSignal,
}

impl Engine {
    pub fn new(
        plan: Plan,
        team: AgentTeam,
        gateway: Arc<ToolGateway>,
        adapter: PersistenceAdapter,
    ) -> Self {
        Self {
            plan,
            team,
            gateway,
            handoffs: HandoffEvaluator::new(Vec::new()),
            router: RouterChain::new(),
            adapter,
            config: ExecutionConfig::default(),
            interrupt: InterruptSignal::none(),
        }
    }

    pub fn with_handoffs(mut self, handoffs: HandoffEvaluator) -> Self {
        self.handoffs = handoffs;
        self
    }

    pub fn with_router(mut self, router: RouterChain) -> Self {
        self.router = router;
        self
    }

    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    /// 接入队列的中断信号；执行循环只在任务边界观察它
    pub fn with_interrupt(mut self, interrupt: InterruptSignal) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// 只读访问当前计划（状态查询；所有写入都经消费循环串行化）
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// 顺序步骤：取一个就绪任务执行到终态并持久化
    pub async fn step(&mut self) -> Result<StepOutcome, EngineError> {
        let Some(task) = self.plan.next_actionable_task().cloned() else {
            return Ok(StepOutcome::NoActionableTask);
        };

        self.plan.update_task_status(&task.id, TaskStatus::InProgress);
        self.adapter.persist(&self.plan).await;

        let user_prompt = prompt::task_user_prompt(&self.plan, &task);
        tracing::info!(task = %task.id, agent = %task.assigned_agent, "Task started");

        match self.execute_task(&task, user_prompt).await {
            Ok(notes) => {
                self.plan.complete_task(&task.id, notes.clone());
                self.adapter.persist(&self.plan).await;
                self.apply_handoff(&task, &notes).await;
                tracing::info!(task = %task.id, "Task completed");
                Ok(StepOutcome::Completed {
                    task_id: task.id,
                    notes,
                })
            }
            Err(error) => {
                self.plan.fail_task(&task.id, error.clone());
                self.adapter.persist(&self.plan).await;
                let halted = task.on_failure == FailurePolicy::Halt;
                tracing::warn!(task = %task.id, error = %error, halted, "Task failed");
                Ok(StepOutcome::Failed {
                    task_id: task.id,
                    error,
                    halted,
                })
            }
        }
    }

    /// 并行步骤：取至多 max_concurrent 个就绪任务并发执行。
    /// 各分支持有互不相交的任务，一个失败不取消其余（并发批次按 proceed 处理）。
    pub async fn step_parallel(&mut self, max_concurrent: usize) -> Result<StepOutcome, EngineError> {
        let batch: Vec<Task> = self
            .plan
            .actionable_tasks(max_concurrent)
            .into_iter()
            .cloned()
            .collect();

        // 单任务的并行开销不值得，退化为顺序执行
        if batch.len() < self.config.parallel_fallback_threshold.max(1) {
            return self.step().await;
        }

        for task in &batch {
            self.plan.update_task_status(&task.id, TaskStatus::InProgress);
            self.adapter.persist(&self.plan).await;
        }

        let prompts: Vec<String> = batch
            .iter()
            .map(|t| prompt::task_user_prompt(&self.plan, t))
            .collect();
        tracing::info!(count = batch.len(), "Parallel batch started");

        let results = join_all(
            batch
                .iter()
                .zip(prompts)
                .map(|(task, prompt)| self.execute_task(task, prompt)),
        )
        .await;

        let mut lines = Vec::with_capacity(batch.len());
        let mut completed = 0;
        let mut failed = 0;
        for (task, result) in batch.iter().zip(results) {
            match result {
                Ok(notes) => {
                    self.plan.complete_task(&task.id, notes.clone());
                    self.adapter.persist(&self.plan).await;
                    self.apply_handoff(task, &notes).await;
                    lines.push(format!("✅ {}: {}", task.name, preview(&notes)));
                    completed += 1;
                }
                Err(error) => {
                    self.plan.fail_task(&task.id, error.clone());
                    self.adapter.persist(&self.plan).await;
                    lines.push(format!("⚠️ {}: {}", task.name, preview(&error)));
                    failed += 1;
                }
            }
        }

        Ok(StepOutcome::Batch {
            summary: lines.join("\n"),
            completed,
            failed,
        })
    }

    /// 执行单个任务：构造上下文提示，调用负责 Agent，按需经网关执行工具。
    /// 只借用不可变状态，供并行分支共享。
    async fn execute_task(&self, task: &Task, user_prompt: String) -> Result<String, String> {
        let schema = self.gateway.tool_schema_json();
        let tools = if self.gateway.tool_names().is_empty() {
            None
        } else {
            Some(schema.as_str())
        };
        let system = prompt::task_system_prompt(&self.config.conventions, tools);
        let mut messages = vec![ChatMessage::user(user_prompt)];

        for _ in 0..MAX_TOOL_ROUNDS {
            let reply = self
                .team
                .invoke(&task.assigned_agent, &system, &messages, tools)
                .await
                .map_err(|e| e.to_string())?;

            let mut calls = reply.tool_calls.clone();
            if calls.is_empty() {
                if let Some(call) = parse::parse_tool_request(&reply.content) {
                    calls.push(call);
                }
            }
            if calls.is_empty() {
                return Ok(reply.content);
            }

            messages.push(ChatMessage::assistant(reply.content.clone()));
            match self.gateway.invoke_batch(&task.assigned_agent, &calls).await {
                Ok(outcomes) => {
                    for o in outcomes {
                        let tag = if o.is_error { " (error)" } else { "" };
                        messages.push(ChatMessage::user(format!(
                            "Tool '{}' result{tag}:\n{}",
                            o.tool, o.output
                        )));
                    }
                }
                Err(e) => {
                    // 整批被拒（超过上限）：告知 Agent 直接收尾
                    messages.push(ChatMessage::user(format!(
                        "Tool batch rejected: {e}. Reply with the final result instead."
                    )));
                }
            }
        }
        Err(format!(
            "task '{}' exceeded {MAX_TOOL_ROUNDS} tool rounds without a final answer",
            task.name
        ))
    }

    /// 任务完成后的 hand-off 评估；命中则合成新任务追加并持久化
    async fn apply_handoff(&mut self, source: &Task, output: &str) {
        if self.handoffs.is_empty() {
            return;
        }
        let Some(rule) = self.handoffs.evaluate(&source.assigned_agent, output).await else {
            return;
        };
        let follow_up = HandoffEvaluator::synthesize(rule, source);
        let follow_up_id = follow_up.id.clone();
        match self.plan.add_task(follow_up) {
            Ok(()) => {
                tracing::info!(source = %source.id, task = %follow_up_id, "Hand-off task appended");
                self.adapter.persist(&self.plan).await;
            }
            // 同一任务重试后重复命中：合成 ID 已存在，静默跳过
            Err(EngineError::DuplicateTask(_)) => {}
            Err(e) => {
                tracing::warn!(source = %source.id, error = %e, "Hand-off task rejected");
            }
        }
    }

    /// 主循环：顺序/并行交替推进，直到完成、阻塞或被新输入打断。
    /// 中断只在任务边界生效，最多「浪费」当前正在执行的一个任务。
    pub async fn run(&mut self) -> Result<RunReport, EngineError> {
        loop {
            if self.interrupt.interrupted() {
                tracing::info!("Run paused: new input pending");
                return Ok(RunReport {
                    status: RunStatus::Paused,
                    summary: format!("Execution paused for new input.\n{}", self.describe()),
                });
            }
            if self.plan.is_complete() {
                self.adapter.persist(&self.plan).await;
                return Ok(RunReport {
                    status: RunStatus::Complete,
                    summary: format!("All tasks completed.\n{}", self.describe()),
                });
            }
            if self.plan.halt_required() {
                self.adapter.persist(&self.plan).await;
                return Ok(RunReport {
                    status: RunStatus::Blocked,
                    summary: format!("Plan halted on task failure.\n{}", self.describe()),
                });
            }

            let outcome = if self.config.max_parallel_tasks > 1 {
                self.step_parallel(self.config.max_parallel_tasks).await?
            } else {
                self.step().await?
            };

            if let StepOutcome::NoActionableTask = outcome {
                // 未完成却无事可做：失败阻塞了剩余任务
                return Ok(RunReport {
                    status: RunStatus::Blocked,
                    summary: format!("No actionable tasks remain.\n{}", self.describe()),
                });
            }
        }
    }

    /// 处理一条队列消息：空输入推进执行；非空输入先做影响分析并应答。
    /// 计划编辑在暂存副本上完成，校验失败时原计划不变。
    pub async fn handle_input(&mut self, content: &str) -> Result<String, EngineError> {
        if content.trim().is_empty() {
            let report = self.run().await?;
            self.adapter
                .record_message(&Message::assistant(&report.summary))
                .await;
            return Ok(report.summary);
        }

        self.adapter.record_message(&Message::user(content)).await;

        let adjustment = adjust::analyze(self.team.model(), &self.plan, content).await?;
        let mut staged = self.plan.clone();
        let changes = adjust::apply(&mut staged, &adjustment)?;

        // 路由补齐缺失负责人的新任务
        let roster = self.team.names();
        let unassigned: Vec<String> = staged
            .tasks()
            .iter()
            .filter(|t| t.assigned_agent.is_empty())
            .map(|t| t.id.clone())
            .collect();
        for id in unassigned {
            let task = staged.get(&id).cloned().expect("listed above");
            if let Some(agent) = self.router.route(&task, &roster).await {
                staged.set_task_agent(&id, agent);
            } else if let Some(first) = roster.first() {
                staged.set_task_agent(&id, first.clone());
            }
        }

        self.plan = staged;
        self.adapter.persist(&self.plan).await;

        let mut ack = if adjustment.reply.is_empty() {
            "Understood.".to_string()
        } else {
            adjustment.reply.clone()
        };
        if !changes.is_empty() {
            ack.push_str(&format!(" [{}]", changes.join("; ")));
        }
        self.adapter.record_message(&Message::assistant(&ack)).await;
        Ok(ack)
    }

    /// 用户可读的计划状态（完全可由持久化文档推导）
    pub fn describe(&self) -> String {
        let done = self
            .plan
            .tasks()
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        let mut out = format!(
            "Plan '{}': {done}/{} completed",
            self.plan.goal(),
            self.plan.len()
        );
        for task in self.plan.tasks() {
            let line = match task.status {
                TaskStatus::Completed => format!(
                    "✅ {} — {}",
                    task.name,
                    preview(task.notes.as_deref().unwrap_or(""))
                ),
                TaskStatus::Failed => format!(
                    "⚠️ {} — {}",
                    task.name,
                    preview(task.notes.as_deref().unwrap_or("failed"))
                ),
                TaskStatus::InProgress => format!("… {} (in progress)", task.name),
                TaskStatus::Pending => format!("· {} (pending)", task.name),
            };
            out.push('\n');
            out.push_str(&line);
        }
        out
    }
}

fn preview(s: &str) -> String {
    let s = s.trim().replace('\n', " ");
    if s.chars().count() > SUMMARY_PREVIEW_CHARS {
        format!("{}...", s.chars().take(SUMMARY_PREVIEW_CHARS).collect::<String>())
    } else {
        s
    }
}

/// 队列消费循环：严格 FIFO 的单消费者，是计划状态的唯一写者。
/// 非空消息在应答后立即恢复执行（run 循环自己会在新输入到达时再次让出），
/// 队列关闭后返回引擎，便于调用方读取最终状态。
pub async fn run_consumer(mut rx: MessageReceiver, mut engine: Engine) -> Engine {
    while let Some(msg) = rx.next().await {
        let continuation = msg.is_continuation();
        let result = engine.handle_input(&msg.content).await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Message processing failed");
        }
        let resume = !continuation && result.is_ok();
        msg.respond(result);

        if resume && !engine.plan().is_complete() && !engine.plan().halt_required() {
            match engine.handle_input("").await {
                Ok(summary) => {
                    tracing::info!(summary = %summary, "Execution resumed after plan edit")
                }
                Err(e) => tracing::warn!(error = %e, "Resumed execution failed"),
            }
        }
    }
    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentProfile, AgentTeam};
    use crate::llm::MockModel;
    use crate::store::{MemoryStore, PersistenceAdapter, PlanStore};
    use crate::tools::{SecurityPolicy, ToolGateway, ToolRegistry};

    fn test_engine(plan: Plan, model: MockModel) -> Engine {
        let team = AgentTeam::new(Arc::new(model))
            .with_agent(AgentProfile::new("writer", "You write."))
            .with_agent(AgentProfile::new("reviewer", "You review."));
        let gateway = Arc::new(ToolGateway::new(
            ToolRegistry::new(),
            SecurityPolicy::allow_all(),
        ));
        let adapter = PersistenceAdapter::new(Arc::new(MemoryStore::new()), "test");
        Engine::new(plan, team, gateway, adapter)
    }

    fn plan_abc() -> Plan {
        let mut plan = Plan::new("Ship");
        plan.add_task(Task::new("A", "a").with_id("a").with_agent("writer")).unwrap();
        plan.add_task(Task::new("B", "b").with_id("b").with_agent("writer")).unwrap();
        plan.add_task(
            Task::new("C", "c")
                .with_id("c")
                .with_agent("writer")
                .with_dependencies(vec!["a".into(), "b".into()]),
        )
        .unwrap();
        plan
    }

    #[tokio::test]
    async fn test_step_completes_first_actionable() {
        let mut engine = test_engine(plan_abc(), MockModel::with_replies(vec!["did A"]));
        let outcome = engine.step().await.unwrap();
        match outcome {
            StepOutcome::Completed { task_id, notes } => {
                assert_eq!(task_id, "a");
                assert_eq!(notes, "did A");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(engine.plan().get("a").unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_step_marks_failed_on_agent_error() {
        let mut plan = Plan::new("g");
        plan.add_task(
            Task::new("X", "x")
                .with_id("x")
                .with_agent("writer")
                .with_failure_policy(FailurePolicy::Halt),
        )
        .unwrap();
        // Mock 无限返回工具调用 JSON，但注册表为空 -> 工具 unknown，轮数耗尽 -> 失败
        let replies: Vec<String> = (0..MAX_TOOL_ROUNDS)
            .map(|_| r#"{"tool": "ghost", "args": {}}"#.to_string())
            .collect();
        let mut engine = test_engine(plan, MockModel::with_replies(replies));

        let outcome = engine.step().await.unwrap();
        match outcome {
            StepOutcome::Failed { task_id, halted, .. } => {
                assert_eq!(task_id, "x");
                assert!(halted);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(engine.plan().has_failed_tasks());
        assert!(engine.plan().halt_required());
    }

    #[tokio::test]
    async fn test_step_parallel_falls_back_when_single_task() {
        let mut plan = Plan::new("g");
        plan.add_task(Task::new("Solo", "s").with_id("s").with_agent("writer")).unwrap();
        let mut engine = test_engine(plan, MockModel::with_replies(vec!["solo done"]));

        let outcome = engine.step_parallel(3).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn test_step_parallel_batch_isolates_failures() {
        let mut plan = Plan::new("g");
        plan.add_task(Task::new("A", "a").with_id("a").with_agent("writer")).unwrap();
        plan.add_task(Task::new("B", "b").with_id("b").with_agent("writer")).unwrap();
        // A 正常完成；B 工具轮数耗尽失败
        let mut replies = vec!["A finished".to_string()];
        replies.extend((0..MAX_TOOL_ROUNDS).map(|_| r#"{"tool": "ghost", "args": {}}"#.to_string()));
        let mut engine = test_engine(plan, MockModel::with_replies(replies));

        let outcome = engine.step_parallel(3).await.unwrap();
        match outcome {
            StepOutcome::Batch {
                summary,
                completed,
                failed,
            } => {
                assert_eq!(completed, 1);
                assert_eq!(failed, 1);
                assert!(summary.contains("✅"));
                assert!(summary.contains("⚠️"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_completes_dependency_chain() {
        let mut engine = test_engine(
            plan_abc(),
            MockModel::with_replies(vec!["did A", "did B", "did C"]),
        );
        let report = engine.run().await.unwrap();
        assert_eq!(report.status, RunStatus::Complete);
        assert!(engine.plan().is_complete());
        // C 的提示词能看到 A、B 的结果（notes 已写入）
        assert_eq!(engine.plan().get("c").unwrap().notes.as_deref(), Some("did C"));
    }

    #[tokio::test]
    async fn test_handoff_appends_follow_up_task() {
        let mut plan = Plan::new("g");
        plan.add_task(Task::new("Draft", "write").with_id("t1").with_agent("writer")).unwrap();
        let rules = vec![HandoffRule {
            from_agent: "writer".into(),
            to_agent: "reviewer".into(),
            condition: "draft complete".into(),
            priority: 1,
        }];
        let mut engine = test_engine(plan, MockModel::with_replies(vec!["draft saved"]))
            .with_handoffs(HandoffEvaluator::new(rules));

        engine.step().await.unwrap();

        let follow_up = engine.plan().get("handoff_t1_reviewer").expect("hand-off task");
        assert_eq!(follow_up.assigned_agent, "reviewer");
        assert_eq!(follow_up.dependencies, vec!["t1".to_string()]);
        assert_eq!(follow_up.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_handle_input_continuation_runs_plan() {
        let mut engine = test_engine(
            plan_abc(),
            MockModel::with_replies(vec!["did A", "did B", "did C"]),
        );
        let reply = engine.handle_input("").await.unwrap();
        assert!(reply.contains("All tasks completed"));
    }

    #[tokio::test]
    async fn test_handle_input_rework_preserves_completed() {
        let mut plan = plan_abc();
        plan.complete_task("a", "a done");
        plan.complete_task("b", "b done");
        let analysis = r#"{"impact": "rework", "affected_tasks": ["b"],
            "preserved_tasks": ["a"], "new_tasks": [], "reply": "Redoing B."}"#;
        let mut engine = test_engine(plan, MockModel::with_replies(vec![analysis]));

        let ack = engine.handle_input("B needs changes").await.unwrap();
        assert!(ack.contains("Redoing B."));
        assert_eq!(engine.plan().get("a").unwrap().notes.as_deref(), Some("a done"));
        assert_eq!(engine.plan().get("b").unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_handle_input_invalid_adjustment_leaves_plan_unchanged() {
        let plan = plan_abc();
        let analysis = r#"{"impact": "extend", "affected_tasks": [], "preserved_tasks": [],
            "new_tasks": [{"name": "D", "goal": "d", "dependencies": ["missing"]}], "reply": "ok"}"#;
        let mut engine = test_engine(plan, MockModel::with_replies(vec![analysis]));

        let before = serde_json::to_value(engine.plan()).unwrap();
        let err = engine.handle_input("add D").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidDependency(_)));
        assert_eq!(before, serde_json::to_value(engine.plan()).unwrap());
    }

    #[tokio::test]
    async fn test_every_transition_persisted() {
        let store = Arc::new(MemoryStore::new());
        let mut plan = Plan::new("g");
        plan.add_task(Task::new("A", "a").with_id("a").with_agent("writer")).unwrap();
        let team = AgentTeam::new(Arc::new(MockModel::with_replies(vec!["done"])))
            .with_agent(AgentProfile::new("writer", "w"));
        let gateway = Arc::new(ToolGateway::new(
            ToolRegistry::new(),
            SecurityPolicy::allow_all(),
        ));
        let adapter = PersistenceAdapter::new(store.clone() as Arc<dyn PlanStore>, "s1");
        let mut engine = Engine::new(plan, team, gateway, adapter);

        engine.step().await.unwrap();

        let persisted = store.load_plan("s1").await.unwrap().unwrap();
        assert_eq!(persisted.get("a").unwrap().status, TaskStatus::Completed);
        assert_eq!(persisted.get("a").unwrap().notes.as_deref(), Some("done"));
    }
}
