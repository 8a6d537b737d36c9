//! 应用层实现。
//!
//! 这里提供在线状态服务与消息扇出协调器，处理输入校验、
//! 失败降级策略，以及对外部适配器（在线状态存储、持久层、
//! 事件分发）的抽象。

pub mod clock;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod presence;
pub mod repository;
pub mod services;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::{DispatchError, EventDispatcher};
pub use error::ApplicationError;
pub use events::{Address, AddressedEvent, ChatEvent};
pub use presence::{PresenceConfig, RoomPresenceService};
pub use repository::{
    FileStorage, FileStorageError, MessageRepository, RoomMemberRepository, UnreadMarkerRepository,
};
pub use services::fanout::{CreateMessageCommand, FanoutDependencies, FanoutOutcome, MessageFanoutService};
pub use store::{PresenceStore, StoreError};

#[cfg(test)]
mod presence_tests;
