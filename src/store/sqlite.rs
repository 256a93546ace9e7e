//! SQLite 计划存储（同步 rusqlite）
//!
//! plans 表按会话一行，INSERT OR REPLACE 即整份文档的原子覆盖；
//! messages 表只追加。单写者模型下用互斥锁包住连接即可。

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection};

use crate::plan::Plan;
use crate::queue::Message;
use crate::store::{PlanStore, StoreError};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::init(conn)
    }

    /// 内存数据库（测试）
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS plans (
                session_id TEXT PRIMARY KEY,
                document   TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS messages (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                document   TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id);",
        )
        .map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

#[async_trait]
impl PlanStore for SqliteStore {
    async fn store_plan(&self, session: &str, plan: &Plan) -> Result<(), StoreError> {
        let doc = serde_json::to_string(plan)?;
        let now = chrono::Utc::now().timestamp_millis();
        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT OR REPLACE INTO plans (session_id, document, updated_at) VALUES (?1, ?2, ?3)",
                params![session, doc, now],
            )
            .map_err(db_err)?;
        Ok(())
    }

    async fn load_plan(&self, session: &str) -> Result<Option<Plan>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT document FROM plans WHERE session_id = ?1")
            .map_err(db_err)?;
        let mut rows = stmt.query(params![session]).map_err(db_err)?;
        match rows.next().map_err(db_err)? {
            Some(row) => {
                let doc: String = row.get(0).map_err(db_err)?;
                Ok(Some(serde_json::from_str(&doc)?))
            }
            None => Ok(None),
        }
    }

    async fn plan_exists(&self, session: &str) -> bool {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT 1 FROM plans WHERE session_id = ?1",
            params![session],
            |_| Ok(()),
        )
        .is_ok()
    }

    async fn store_message(&self, session: &str, message: &Message) -> Result<(), StoreError> {
        let doc = serde_json::to_string(message)?;
        self.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO messages (session_id, document, created_at) VALUES (?1, ?2, ?3)",
                params![session, doc, message.created_at],
            )
            .map_err(db_err)?;
        Ok(())
    }

    async fn conversation_history(&self, session: &str) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT document FROM messages WHERE session_id = ?1 ORDER BY id ASC")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![session], |row| row.get::<_, String>(0))
            .map_err(db_err)?;
        let mut out = Vec::new();
        for doc in rows {
            out.push(serde_json::from_str(&doc.map_err(db_err)?)?);
        }
        Ok(out)
    }
}
