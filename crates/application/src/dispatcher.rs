use async_trait::async_trait;
use thiserror::Error;

use crate::events::AddressedEvent;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatch failed: {0}")]
    Failed(String),
}

impl DispatchError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 事件分发器：把带寻址的事件送到订阅了对应房间频道或
/// 用户私有频道的连接。跨进程复制由实现方处理。
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    async fn dispatch(&self, event: AddressedEvent) -> Result<(), DispatchError>;

    /// 按顺序分发一批事件；单个失败记日志后继续
    async fn dispatch_all(&self, events: Vec<AddressedEvent>) -> Result<(), DispatchError> {
        for event in events {
            let event_type = event.event.event_type();
            if let Err(err) = self.dispatch(event).await {
                tracing::warn!(event_type, error = %err, "event dispatch failed");
            }
        }
        Ok(())
    }
}
