//! Redis 事件订阅
//!
//! 每个服务实例启动一个订阅任务，按模式订阅全部扇出频道，
//! 把收到的事件转交给进程内分发器。连接断开后按固定间隔
//! 重连，订阅丢失期间的事件不补发（实时事件，过期即弃）。

use std::sync::Arc;

use application::{AddressedEvent, EventDispatcher};
use futures_util::StreamExt;
use tokio::time::{sleep, Duration};

use super::RedisConfig;
use crate::broadcast::LocalEventDispatcher;

pub struct RedisEventSubscriber {
    client: Arc<redis::Client>,
    config: RedisConfig,
    local: LocalEventDispatcher,
}

impl RedisEventSubscriber {
    pub fn new(client: Arc<redis::Client>, config: RedisConfig, local: LocalEventDispatcher) -> Self {
        Self {
            client,
            config,
            local,
        }
    }

    /// 订阅循环；在独立任务中运行，直到进程退出
    pub async fn run(self) {
        let patterns = [
            format!("{}*", self.config.room_channel_prefix),
            format!("{}*", self.config.user_channel_prefix),
        ];

        loop {
            match self.subscribe_once(&patterns).await {
                Ok(()) => {
                    tracing::warn!("redis subscription stream ended, reconnecting");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "redis subscription failed, reconnecting");
                }
            }
            sleep(Duration::from_secs(2)).await;
        }
    }

    async fn subscribe_once(&self, patterns: &[String]) -> Result<(), redis::RedisError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        for pattern in patterns {
            pubsub.psubscribe(pattern).await?;
        }
        tracing::info!("subscribed to fanout channels");

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::warn!(error = %err, "unreadable pubsub payload, skipping");
                    continue;
                }
            };
            match serde_json::from_str::<AddressedEvent>(&payload) {
                Ok(event) => {
                    if let Err(err) = self.local.dispatch(event).await {
                        tracing::warn!(error = %err, "local dispatch of replicated event failed");
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "corrupt replicated event, skipping");
                }
            }
        }
        Ok(())
    }
}
