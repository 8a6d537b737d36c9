//! Redis 事件发布
//!
//! 跨实例广播不在进程内重新实现，而是委托给存储的原生
//! 发布/订阅：每个实例把带寻址的事件发布到对应频道，
//! 所有实例（包括发布方自己）通过订阅端收回并投递到
//! 本进程的连接。

use std::sync::Arc;

use application::{Address, AddressedEvent, DispatchError, EventDispatcher};
use async_trait::async_trait;

use super::RedisConfig;

pub struct RedisEventDispatcher {
    client: Arc<redis::Client>,
    config: RedisConfig,
}

impl RedisEventDispatcher {
    pub fn new(client: Arc<redis::Client>, config: RedisConfig) -> Self {
        Self { client, config }
    }

    fn channel_for(&self, address: &Address) -> String {
        match address {
            Address::Room(room_id) => format!("{}{}", self.config.room_channel_prefix, room_id),
            Address::User(user_id) => format!("{}{}", self.config.user_channel_prefix, user_id),
        }
    }
}

#[async_trait]
impl EventDispatcher for RedisEventDispatcher {
    async fn dispatch(&self, event: AddressedEvent) -> Result<(), DispatchError> {
        let channel = self.channel_for(&event.address);
        let payload = serde_json::to_string(&event)
            .map_err(|err| DispatchError::failed(err.to_string()))?;

        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| DispatchError::failed(format!("Redis connection failed: {err}")))?;

        let receivers: u32 = redis::cmd("PUBLISH")
            .arg(&channel)
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .map_err(|err| DispatchError::failed(format!("Redis publish failed: {err}")))?;

        tracing::debug!(
            channel = %channel,
            receivers,
            event_type = event.event.event_type(),
            "event published"
        );
        Ok(())
    }
}
