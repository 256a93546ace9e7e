//! 内存计划存储（测试与演示）
//!
//! 计划以序列化后的 JSON 字符串存放，读取时重新反序列化，
//! 与文件/SQLite 实现走完全相同的往返路径。

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::plan::Plan;
use crate::queue::Message;
use crate::store::{PlanStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    plans: Mutex<HashMap<String, String>>,
    messages: Mutex<HashMap<String, Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanStore for MemoryStore {
    async fn store_plan(&self, session: &str, plan: &Plan) -> Result<(), StoreError> {
        let doc = serde_json::to_string(plan)?;
        self.plans.lock().unwrap().insert(session.to_string(), doc);
        Ok(())
    }

    async fn load_plan(&self, session: &str) -> Result<Option<Plan>, StoreError> {
        let plans = self.plans.lock().unwrap();
        match plans.get(session) {
            Some(doc) => Ok(Some(serde_json::from_str(doc)?)),
            None => Ok(None),
        }
    }

    async fn plan_exists(&self, session: &str) -> bool {
        self.plans.lock().unwrap().contains_key(session)
    }

    async fn store_message(&self, session: &str, message: &Message) -> Result<(), StoreError> {
        let doc = serde_json::to_string(message)?;
        self.messages
            .lock()
            .unwrap()
            .entry(session.to_string())
            .or_default()
            .push(doc);
        Ok(())
    }

    async fn conversation_history(&self, session: &str) -> Result<Vec<Message>, StoreError> {
        let messages = self.messages.lock().unwrap();
        messages
            .get(session)
            .map(|docs| {
                docs.iter()
                    .map(|d| serde_json::from_str(d).map_err(StoreError::from))
                    .collect()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
