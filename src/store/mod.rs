//! 持久层：计划存储契约与适配器
//!
//! 每个会话一份 JSON 计划文档（读取 / 原子覆盖 / 存在性检查）加一条
//! 只追加的消息日志。store_plan 成功返回即须持久（同进程内随后 load_plan
//! 必须可见）。引擎经 PersistenceAdapter 写入：写失败降级为警告，内存状态
//! 在本进程生命周期内保持权威，下一次变更会再次携带全量文档重试。

use async_trait::async_trait;
use thiserror::Error;

pub mod file;
pub mod memory;
pub mod sqlite;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::plan::Plan;
use crate::queue::Message;

/// 存储层错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),
}

/// 计划存储契约（外部协作者）
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// 原子覆盖整份计划文档；返回 Ok 即已持久
    async fn store_plan(&self, session: &str, plan: &Plan) -> Result<(), StoreError>;

    /// 读取计划；会话不存在时返回 None
    async fn load_plan(&self, session: &str) -> Result<Option<Plan>, StoreError>;

    /// 会话是否已有计划文档
    async fn plan_exists(&self, session: &str) -> bool;

    /// 追加一条会话消息（只追加，不改写历史）
    async fn store_message(&self, session: &str, message: &Message) -> Result<(), StoreError>;

    /// 读取完整会话历史（入库顺序）
    async fn conversation_history(&self, session: &str) -> Result<Vec<Message>, StoreError>;
}

/// 持久化适配器：把引擎变更变成即时的 PlanStore 写入。
/// 内存变更先于且独立于持久化尝试；写失败置 dirty 并在下一次变更重试。
pub struct PersistenceAdapter {
    store: std::sync::Arc<dyn PlanStore>,
    session: String,
    dirty: std::sync::atomic::AtomicBool,
}

impl PersistenceAdapter {
    pub fn new(store: std::sync::Arc<dyn PlanStore>, session: impl Into<String>) -> Self {
        Self {
            store,
            session: session.into(),
            dirty: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn store(&self) -> &std::sync::Arc<dyn PlanStore> {
        &self.store
    }

    /// 每次计划变更后调用。失败只警告（内存为准），成功时若此前有失败
    /// 记录恢复（全量覆盖天然补上漏掉的写）。
    pub async fn persist(&self, plan: &Plan) {
        use std::sync::atomic::Ordering;
        match self.store.store_plan(&self.session, plan).await {
            Ok(()) => {
                if self.dirty.swap(false, Ordering::SeqCst) {
                    tracing::info!(session = %self.session, "Plan persistence recovered");
                }
            }
            Err(e) => {
                self.dirty.store(true, Ordering::SeqCst);
                tracing::warn!(session = %self.session, error = %e, "Plan persistence failed, will retry on next mutation");
            }
        }
    }

    /// 是否有尚未落盘的变更
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// 追加会话消息；失败同样只警告
    pub async fn record_message(&self, message: &Message) {
        if let Err(e) = self.store.store_message(&self.session, message).await {
            tracing::warn!(session = %self.session, error = %e, "Message persistence failed");
        }
    }
}
