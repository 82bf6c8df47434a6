//! 取消令牌
//!
//! 客户端断开或显式取消时，通过令牌把取消信号传播到
//! 进行中的上游调用和流式读取。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// 取消令牌
///
/// 克隆共享同一份状态；取消是单向的，令牌不可复位。
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// 发出取消信号，唤醒所有等待者
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// 等待取消信号；已取消时立即返回
    pub async fn cancelled(&self) {
        loop {
            // 先注册等待再检查标志，避免丢失两者之间到达的信号
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
