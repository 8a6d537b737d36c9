//! 持久层端口
//!
//! 关系存储的访问通过这些 trait 完成；具体实现在 infrastructure。
//! 内存实现随模块提供，供测试注入。

use async_trait::async_trait;
use domain::{Message, RepositoryError, RoomMember, UnreadMarker};
use thiserror::Error;
use uuid::Uuid;

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 持久化消息及其附件行；从调用方视角是单次原子写入，
    /// 要么全部成功要么全部失败
    async fn create(&self, message: &Message) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>, RepositoryError>;

    /// 更新消息行并把附件行同步到实体当前状态
    /// （删除消息时实体附件已清空，对应附件行一并删除）
    async fn update(&self, message: &Message) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait RoomMemberRepository: Send + Sync {
    async fn is_member(&self, room_id: &str, user_id: &str) -> Result<bool, RepositoryError>;

    async fn list_members(&self, room_id: &str) -> Result<Vec<RoomMember>, RepositoryError>;
}

#[async_trait]
pub trait UnreadMarkerRepository: Send + Sync {
    async fn insert(&self, marker: &UnreadMarker) -> Result<(), RepositoryError>;

    /// 用户在房间的未读总数
    async fn count_for(&self, user_id: &str, room_id: &str) -> Result<u64, RepositoryError>;

    /// 按 (用户, 房间) 批量删除，返回删除数
    async fn delete_for(&self, user_id: &str, room_id: &str) -> Result<u64, RepositoryError>;
}

#[derive(Debug, Error)]
pub enum FileStorageError {
    #[error("file storage error: {0}")]
    Failed(String),
}

impl FileStorageError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 附件 blob 存储；删除是尽力而为的
#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn delete(&self, storage_path: &str) -> Result<(), FileStorageError>;
}

/// 内存实现（用于测试）
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use tokio::sync::RwLock;

    #[derive(Default)]
    pub struct MemoryMessageRepository {
        messages: RwLock<HashMap<Uuid, Message>>,
    }

    impl MemoryMessageRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl MessageRepository for MemoryMessageRepository {
        async fn create(&self, message: &Message) -> Result<(), RepositoryError> {
            let mut messages = self.messages.write().await;
            messages.insert(message.id, message.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>, RepositoryError> {
            let messages = self.messages.read().await;
            Ok(messages.get(&id).cloned())
        }

        async fn update(&self, message: &Message) -> Result<(), RepositoryError> {
            let mut messages = self.messages.write().await;
            if !messages.contains_key(&message.id) {
                return Err(RepositoryError::NotFound);
            }
            messages.insert(message.id, message.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MemoryRoomMemberRepository {
        members: RwLock<HashMap<String, Vec<RoomMember>>>,
    }

    impl MemoryRoomMemberRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn add_member(&self, room_id: &str, user_id: &str, username: &str) {
            let mut members = self.members.write().await;
            let room = members.entry(room_id.to_string()).or_default();
            if !room.iter().any(|m| m.user_id == user_id) {
                room.push(RoomMember {
                    user_id: user_id.to_string(),
                    username: username.to_string(),
                });
            }
        }
    }

    #[async_trait]
    impl RoomMemberRepository for MemoryRoomMemberRepository {
        async fn is_member(&self, room_id: &str, user_id: &str) -> Result<bool, RepositoryError> {
            let members = self.members.read().await;
            Ok(members
                .get(room_id)
                .is_some_and(|room| room.iter().any(|m| m.user_id == user_id)))
        }

        async fn list_members(&self, room_id: &str) -> Result<Vec<RoomMember>, RepositoryError> {
            let members = self.members.read().await;
            Ok(members.get(room_id).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    pub struct MemoryUnreadMarkerRepository {
        markers: RwLock<Vec<UnreadMarker>>,
        /// 打开后 insert 返回错误，用于验证逐接收者的尽力而为语义
        fail_inserts: AtomicBool,
    }

    impl MemoryUnreadMarkerRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_fail_inserts(&self, fail: bool) {
            self.fail_inserts.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl UnreadMarkerRepository for MemoryUnreadMarkerRepository {
        async fn insert(&self, marker: &UnreadMarker) -> Result<(), RepositoryError> {
            if self.fail_inserts.load(Ordering::SeqCst) {
                return Err(RepositoryError::storage("simulated insert failure"));
            }
            let mut markers = self.markers.write().await;
            // 每个 (消息, 接收者) 至多一条
            if !markers
                .iter()
                .any(|m| m.message_id == marker.message_id && m.user_id == marker.user_id)
            {
                markers.push(marker.clone());
            }
            Ok(())
        }

        async fn count_for(&self, user_id: &str, room_id: &str) -> Result<u64, RepositoryError> {
            let markers = self.markers.read().await;
            Ok(markers
                .iter()
                .filter(|m| m.user_id == user_id && m.room_id == room_id)
                .count() as u64)
        }

        async fn delete_for(&self, user_id: &str, room_id: &str) -> Result<u64, RepositoryError> {
            let mut markers = self.markers.write().await;
            let before = markers.len();
            markers.retain(|m| !(m.user_id == user_id && m.room_id == room_id));
            Ok((before - markers.len()) as u64)
        }
    }

    /// 只计数的文件存储，按路径前缀模拟删除失败
    #[derive(Default)]
    pub struct MemoryFileStorage {
        pub deleted: AtomicU64,
        pub failed: AtomicU64,
    }

    impl MemoryFileStorage {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl FileStorage for MemoryFileStorage {
        async fn delete(&self, storage_path: &str) -> Result<(), FileStorageError> {
            if storage_path.starts_with("missing/") {
                self.failed.fetch_add(1, Ordering::SeqCst);
                return Err(FileStorageError::failed(format!(
                    "no such file: {}",
                    storage_path
                )));
            }
            self.deleted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
