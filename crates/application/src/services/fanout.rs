//! 消息扇出协调器
//!
//! 新建/编辑/删除的消息对其他客户端可见的唯一路径。保证持久化
//! 和未读记账先于任何 socket 事件发出，且每个 (接收者, 消息)
//! 恰好产生一条未读标记。
//!
//! 协调器不直接触达传输层：每个操作返回持久化结果加一份
//! "待发出事件" 列表，由调用方交给分发器执行实际发送。

use std::sync::Arc;

use domain::{DomainError, Message, UnreadMarker};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::events::{AddressedEvent, ChatEvent};
use crate::presence::RoomPresenceService;
use crate::repository::{
    FileStorage, MessageRepository, RoomMemberRepository, UnreadMarkerRepository,
};

/// 发送消息命令
#[derive(Debug, Clone)]
pub struct CreateMessageCommand {
    pub room_id: String,
    pub author_id: String,
    pub author_username: String,
    pub content: String,
    pub attachments: Vec<domain::Attachment>,
}

/// 协调器操作的产出：持久化后的消息加待发出事件。
///
/// 事件按应发出的顺序排列，逐用户的未读事件在前，
/// 房间级广播在最后。
#[derive(Debug)]
pub struct FanoutOutcome {
    pub message: Message,
    pub events: Vec<AddressedEvent>,
}

/// 协调器依赖（进程启动时构建一次，显式注入）
pub struct FanoutDependencies {
    pub messages: Arc<dyn MessageRepository>,
    pub members: Arc<dyn RoomMemberRepository>,
    pub unread: Arc<dyn UnreadMarkerRepository>,
    pub files: Arc<dyn FileStorage>,
    pub presence: Arc<RoomPresenceService>,
    pub clock: Arc<dyn Clock>,
}

pub struct MessageFanoutService {
    messages: Arc<dyn MessageRepository>,
    members: Arc<dyn RoomMemberRepository>,
    unread: Arc<dyn UnreadMarkerRepository>,
    files: Arc<dyn FileStorage>,
    presence: Arc<RoomPresenceService>,
    clock: Arc<dyn Clock>,
}

impl MessageFanoutService {
    pub fn new(deps: FanoutDependencies) -> Self {
        Self {
            messages: deps.messages,
            members: deps.members,
            unread: deps.unread,
            files: deps.files,
            presence: deps.presence,
            clock: deps.clock,
        }
    }

    /// 创建消息并计算扇出。
    ///
    /// 持久化失败使整个操作失败，不发出任何事件；单个接收者的
    /// 未读标记写入失败只记日志、跳过该接收者，不影响其余接收者
    /// 和房间级广播。消息本身必达是核心保证，未读记账相对它
    /// 是尽力而为。
    pub async fn create_message(
        &self,
        command: CreateMessageCommand,
    ) -> Result<FanoutOutcome, ApplicationError> {
        domain::validate_identifier("room_id", &command.room_id)?;
        domain::validate_identifier("author_id", &command.author_id)?;

        // 作者必须是房间成员（调用方已经校验过，这里纵深防御）
        if !self
            .members
            .is_member(&command.room_id, &command.author_id)
            .await?
        {
            return Err(DomainError::forbidden("send message: not a room member").into());
        }

        Message::validate_payload(&command.content, &command.attachments)?;

        let message = Message::new(
            command.room_id.clone(),
            command.author_id.clone(),
            command.author_username,
            command.content,
            command.attachments,
            self.clock.now(),
        );

        // 持久化先于一切事件：客户端绝不能在实时频道上观察到
        // 一条随后的分页拉取还取不到的消息
        self.messages.create(&message).await?;

        let mut events = Vec::new();
        let recipients = self
            .members
            .list_members(&command.room_id)
            .await?
            .into_iter()
            .filter(|m| m.user_id != command.author_id);

        for member in recipients {
            // 正在查看房间的成员不产生未读标记，他们会实时看到消息。
            // 查看状态和标记写入之间存在检查后行动窗口，漏掉一次
            // 抑制只会多一条角标，可以接受。
            if self
                .presence
                .is_user_active_viewer(&command.room_id, &member.user_id)
                .await
            {
                continue;
            }

            let marker = UnreadMarker::new(
                message.id,
                member.user_id.clone(),
                command.room_id.clone(),
                self.clock.now(),
            );
            if let Err(err) = self.unread.insert(&marker).await {
                tracing::error!(
                    user_id = %member.user_id,
                    room_id = %command.room_id,
                    error = %err,
                    "unread marker creation failed, skipping recipient"
                );
                continue;
            }

            let count = match self
                .unread
                .count_for(&member.user_id, &command.room_id)
                .await
            {
                Ok(count) => count,
                Err(err) => {
                    tracing::error!(
                        user_id = %member.user_id,
                        error = %err,
                        "unread count failed, skipping notification"
                    );
                    continue;
                }
            };

            events.push(AddressedEvent::user(
                member.user_id,
                ChatEvent::UnreadMessage {
                    room_id: command.room_id.clone(),
                    last_message: message.clone(),
                    count,
                },
            ));
        }

        // 房间级广播无条件发给所有订阅者，包括活跃查看者
        events.push(AddressedEvent::room(
            command.room_id.clone(),
            ChatEvent::ReceiveMessage {
                room_id: command.room_id,
                message: message.clone(),
            },
        ));

        tracing::info!(
            message_id = %message.id,
            room_id = %message.room_id,
            recipients = events.len() - 1,
            "message created"
        );

        Ok(FanoutOutcome { message, events })
    }

    /// 编辑消息：只有作者可以编辑，已删除的消息不允许编辑
    pub async fn update_message(
        &self,
        message_id: Uuid,
        new_content: &str,
        editor_id: &str,
    ) -> Result<FanoutOutcome, ApplicationError> {
        let mut message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| DomainError::not_found("message", message_id.to_string()))?;

        if message.author_id != editor_id {
            return Err(DomainError::forbidden("edit message: not the author").into());
        }
        if message.is_deleted() {
            return Err(DomainError::invalid_state("cannot edit deleted message").into());
        }

        Message::validate_payload(new_content, &message.attachments)?;
        message.edit(new_content, self.clock.now())?;
        self.messages.update(&message).await?;

        let events = vec![AddressedEvent::room(
            message.room_id.clone(),
            ChatEvent::MessageUpdated {
                message_id,
                content: message.content.clone(),
                message: message.clone(),
            },
        )];

        tracing::info!(message_id = %message_id, "message updated");
        Ok(FanoutOutcome { message, events })
    }

    /// 删除消息：附件文件的清理是尽力而为的，成功/失败数只记录
    /// 不阻塞操作；附件行和消息状态的变更是持久的
    pub async fn delete_message(
        &self,
        message_id: Uuid,
        requester_id: &str,
    ) -> Result<FanoutOutcome, ApplicationError> {
        let mut message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| DomainError::not_found("message", message_id.to_string()))?;

        if message.author_id != requester_id {
            return Err(DomainError::forbidden("delete message: not the author").into());
        }
        if message.is_deleted() {
            return Err(DomainError::invalid_state("already deleted").into());
        }

        let mut files_deleted = 0u32;
        let mut files_failed = 0u32;
        for attachment in &message.attachments {
            match self.files.delete(&attachment.storage_path).await {
                Ok(()) => files_deleted += 1,
                Err(err) => {
                    files_failed += 1;
                    tracing::warn!(
                        message_id = %message_id,
                        path = %attachment.storage_path,
                        error = %err,
                        "attachment file deletion failed"
                    );
                }
            }
        }

        message.delete(self.clock.now())?;
        self.messages.update(&message).await?;

        let events = vec![AddressedEvent::room(
            message.room_id.clone(),
            ChatEvent::MessageDeleted {
                message_id,
                message: message.clone(),
            },
        )];

        tracing::info!(
            message_id = %message_id,
            files_deleted,
            files_failed,
            "message deleted"
        );
        Ok(FanoutOutcome { message, events })
    }

    /// 用户读取房间：批量删除该用户在房间的所有未读标记，
    /// 事件发往用户私有频道（而非房间），让同一用户的其他
    /// 设备/标签页清除角标
    pub async fn mark_messages_as_read(
        &self,
        user_id: &str,
        room_id: &str,
    ) -> Result<Vec<AddressedEvent>, ApplicationError> {
        domain::validate_identifier("user_id", user_id)?;
        domain::validate_identifier("room_id", room_id)?;

        let removed = self.unread.delete_for(user_id, room_id).await?;
        tracing::info!(user_id = %user_id, room_id = %room_id, removed, "messages marked as read");

        Ok(vec![AddressedEvent::user(
            user_id,
            ChatEvent::MessagesRead {
                room_id: room_id.to_string(),
            },
        )])
    }
}
