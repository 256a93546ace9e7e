//! 消息队列与中断控制
//!
//! 外部输入经无界 FIFO 队列串行化到单消费者，消费者是计划状态的唯一写者
//! （计划本身因此无需加锁）。每条消息配一个 oneshot 响应 future，生产者
//! 可带超时等待；超时只是放弃等待，底层步骤仍会执行到下一个安全检查点。
//! 待处理深度计数充当中断信号：执行循环在任务边界观察到队列非空即暂停。
//!
//! 消息生命周期：Queued -> Processing -> Completed | Failed | TimedOut。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use crate::core::EngineError;

pub mod message;

pub use message::{Message, MessagePart, Role};

/// 消息处理状态（用于日志与观测）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    Queued,
    Processing,
    Completed,
    Failed,
    TimedOut,
}

/// 队列中的一条待处理消息
pub struct QueuedMessage {
    pub id: String,
    /// 原始输入；空串为「继续执行」哨兵
    pub content: String,
    pub enqueued_at: i64,
    responder: oneshot::Sender<Result<String, EngineError>>,
}

impl QueuedMessage {
    /// 是否为不修改计划、仅推进执行的继续消息
    pub fn is_continuation(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// 回传处理结果；接收端已超时放弃则结果被丢弃
    pub fn respond(self, result: Result<String, EngineError>) {
        let state = match &result {
            Ok(_) => MessageState::Completed,
            Err(_) => MessageState::Failed,
        };
        if self.responder.send(result).is_err() {
            tracing::debug!(message_id = %self.id, "Result discarded: caller timed out");
        } else {
            tracing::debug!(message_id = %self.id, state = ?state, "Message finished");
        }
    }
}

/// 中断信号：执行循环在任务边界查询队列是否非空
#[derive(Clone, Default)]
pub struct InterruptSignal {
    pending: Arc<AtomicUsize>,
}

impl InterruptSignal {
    /// 永不触发的信号（无队列场景/测试）
    pub fn none() -> Self {
        Self::default()
    }

    pub fn interrupted(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }
}

/// 生产者句柄：多生产者并发入队安全
#[derive(Clone)]
pub struct MessageQueue {
    tx: mpsc::UnboundedSender<QueuedMessage>,
    pending: Arc<AtomicUsize>,
    timeout: Duration,
}

/// 消费端：严格 FIFO 单消费者
pub struct MessageReceiver {
    rx: mpsc::UnboundedReceiver<QueuedMessage>,
    pending: Arc<AtomicUsize>,
}

/// 创建队列两端；timeout_secs 为每条消息等待结果的上限
pub fn channel(timeout_secs: u64) -> (MessageQueue, MessageReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));
    (
        MessageQueue {
            tx,
            pending: Arc::clone(&pending),
            timeout: Duration::from_secs(timeout_secs.max(1)),
        },
        MessageReceiver { rx, pending },
    )
}

impl MessageQueue {
    /// 入队并等待结果。超时返回 MessageTimeout，底层步骤不会被强杀，
    /// 其结果在到达时被静默丢弃。
    pub async fn send(&self, content: impl Into<String>) -> Result<String, EngineError> {
        let rx = self.enqueue(content)?;
        let secs = self.timeout.as_secs();
        match timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(EngineError::QueueClosed),
            Err(_) => Err(EngineError::MessageTimeout(secs)),
        }
    }

    /// 入队但不等待（调用方自行持有 future）
    pub fn enqueue(
        &self,
        content: impl Into<String>,
    ) -> Result<oneshot::Receiver<Result<String, EngineError>>, EngineError> {
        let (responder, rx) = oneshot::channel();
        let msg = QueuedMessage {
            id: format!("msg_{}", uuid::Uuid::new_v4()),
            content: content.into(),
            enqueued_at: chrono::Utc::now().timestamp_millis(),
            responder,
        };
        tracing::debug!(message_id = %msg.id, state = ?MessageState::Queued, "Message enqueued");
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.tx.send(msg).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            EngineError::QueueClosed
        })?;
        Ok(rx)
    }

    /// 供执行循环观察的中断信号（共享同一待处理计数）
    pub fn interrupt_signal(&self) -> InterruptSignal {
        InterruptSignal {
            pending: Arc::clone(&self.pending),
        }
    }

    /// 当前待处理深度
    pub fn pending_len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

impl MessageReceiver {
    /// 取下一条消息；出队即递减深度（该消息进入 Processing，
    /// 之后到达的消息才构成新的中断）
    pub async fn next(&mut self) -> Option<QueuedMessage> {
        let msg = self.rx.recv().await?;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(message_id = %msg.id, state = ?MessageState::Processing, "Message dequeued");
        Some(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_order() {
        let (queue, mut rx) = channel(5);
        let _a = queue.enqueue("first").unwrap();
        let _b = queue.enqueue("second").unwrap();

        assert_eq!(rx.next().await.unwrap().content, "first");
        assert_eq!(rx.next().await.unwrap().content, "second");
    }

    #[tokio::test]
    async fn test_pending_depth_drives_interrupt() {
        let (queue, mut rx) = channel(5);
        let signal = queue.interrupt_signal();
        assert!(!signal.interrupted());

        let _r = queue.enqueue("hello").unwrap();
        assert!(signal.interrupted());

        let msg = rx.next().await.unwrap();
        // 出队后该消息正在处理，不再算作中断来源
        assert!(!signal.interrupted());
        msg.respond(Ok("ok".into()));
    }

    #[tokio::test]
    async fn test_send_resolves_with_result() {
        let (queue, mut rx) = channel(5);
        let consumer = tokio::spawn(async move {
            let msg = rx.next().await.unwrap();
            let reply = format!("got: {}", msg.content);
            msg.respond(Ok(reply));
        });

        let result = queue.send("ping").await.unwrap();
        assert_eq!(result, "got: ping");
        consumer.await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_is_typed_and_step_not_killed() {
        let (queue, mut rx) = channel(1);
        let consumer = tokio::spawn(async move {
            let msg = rx.next().await.unwrap();
            // 模拟慢步骤：超过调用方等待上限
            tokio::time::sleep(Duration::from_millis(1500)).await;
            msg.respond(Ok("late".into()));
            "step completed"
        });

        let err = queue.send("slow").await.unwrap_err();
        assert!(matches!(err, EngineError::MessageTimeout(1)));
        // 步骤执行到了自然终点，结果被丢弃而非被杀
        assert_eq!(consumer.await.unwrap(), "step completed");
    }

    #[tokio::test]
    async fn test_continuation_detection() {
        let (queue, mut rx) = channel(5);
        let _r1 = queue.enqueue("").unwrap();
        let _r2 = queue.enqueue("  ").unwrap();
        let _r3 = queue.enqueue("add a task").unwrap();

        assert!(rx.next().await.unwrap().is_continuation());
        assert!(rx.next().await.unwrap().is_continuation());
        assert!(!rx.next().await.unwrap().is_continuation());
    }

    #[tokio::test]
    async fn test_closed_queue_errors() {
        let (queue, rx) = channel(5);
        drop(rx);
        let err = queue.send("x").await.unwrap_err();
        assert!(matches!(err, EngineError::QueueClosed));
    }
}
