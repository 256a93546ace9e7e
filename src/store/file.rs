//! 文件计划存储
//!
//! 每个会话一个目录：plan.json（整份文档，临时文件 + rename 原子覆盖）
//! 与 messages.jsonl（每行一条消息，只追加）。父目录不存在时自动创建。

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::plan::Plan;
use crate::queue::Message;
use crate::store::{PlanStore, StoreError};

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn plan_path(&self, session: &str) -> PathBuf {
        self.root.join(session).join("plan.json")
    }

    fn messages_path(&self, session: &str) -> PathBuf {
        self.root.join(session).join("messages.jsonl")
    }
}

#[async_trait]
impl PlanStore for FileStore {
    async fn store_plan(&self, session: &str, plan: &Plan) -> Result<(), StoreError> {
        let path = self.plan_path(session);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // 先写临时文件再 rename，读者永远看不到半成品文档
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(plan)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    async fn load_plan(&self, session: &str) -> Result<Option<Plan>, StoreError> {
        let path = self.plan_path(session);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    async fn plan_exists(&self, session: &str) -> bool {
        self.plan_path(session).exists()
    }

    async fn store_message(&self, session: &str, message: &Message) -> Result<(), StoreError> {
        let path = self.messages_path(session);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        writeln!(file, "{}", serde_json::to_string(message)?)?;
        Ok(())
    }

    async fn conversation_history(&self, session: &str) -> Result<Vec<Message>, StoreError> {
        let path = self.messages_path(session);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&path)?;
        data.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(StoreError::from))
            .collect()
    }
}
