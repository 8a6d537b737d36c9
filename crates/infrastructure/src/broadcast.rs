//! 进程内事件分发
//!
//! 单条 tokio broadcast 通道承载所有带寻址的事件；每个网关连接
//! 订阅后按自己加入的房间和用户身份在本地过滤。

use application::{AddressedEvent, DispatchError, EventDispatcher};
use async_trait::async_trait;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct LocalEventDispatcher {
    sender: broadcast::Sender<AddressedEvent>,
}

impl LocalEventDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AddressedEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventDispatcher for LocalEventDispatcher {
    async fn dispatch(&self, event: AddressedEvent) -> Result<(), DispatchError> {
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.sender
            .send(event)
            .map_err(|err| DispatchError::failed(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use application::{Address, ChatEvent};

    #[tokio::test]
    async fn delivers_to_subscriber() {
        let dispatcher = LocalEventDispatcher::new(16);
        let mut rx = dispatcher.subscribe();

        let event = AddressedEvent::user(
            "alice",
            ChatEvent::MessagesRead {
                room_id: "sala".to_string(),
            },
        );
        dispatcher.dispatch(event.clone()).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.address, Address::User("alice".to_string()));
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn dispatch_without_subscribers_is_ok() {
        let dispatcher = LocalEventDispatcher::new(16);
        let event = AddressedEvent::room(
            "sala",
            ChatEvent::MessagesRead {
                room_id: "sala".to_string(),
            },
        );
        assert!(dispatcher.dispatch(event).await.is_ok());
    }
}
