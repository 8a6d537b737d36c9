//! 消息实体
//!
//! 消息的状态生命周期：`Active → Edited`（可反复编辑），
//! `Active|Edited → Deleted`（终态，内容替换为固定的墓碑文案，
//! 附件清空，之后不允许再编辑或删除）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// 删除后的占位内容（对用户可见的墓碑文案）
pub const DELETED_MESSAGE_PLACEHOLDER: &str = "Mensagem deletada";

/// 单个附件的最大字节数（10 MiB）
pub const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

/// 附件允许的 MIME 类型
const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
    "text/plain",
    "audio/mpeg",
    "video/mp4",
];

/// 消息状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Active,
    Edited,
    Deleted,
}

/// 消息附件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    /// 文件在 blob 存储中的路径，删除消息时用于清理
    pub storage_path: String,
}

impl Attachment {
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        size_bytes: u64,
        storage_path: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            size_bytes,
            storage_path: storage_path.into(),
        }
    }

    /// 校验附件大小和 MIME 类型
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.size_bytes > MAX_ATTACHMENT_BYTES {
            return Err(DomainError::invalid_input(
                "attachment",
                format!(
                    "file {} exceeds maximum size of {} bytes",
                    self.file_name, MAX_ATTACHMENT_BYTES
                ),
            ));
        }
        if !ALLOWED_MIME_TYPES.contains(&self.mime_type.as_str()) {
            return Err(DomainError::invalid_input(
                "attachment",
                format!("mime type {} is not allowed", self.mime_type),
            ));
        }
        Ok(())
    }
}

/// 聊天消息
///
/// 一条消息属于恰好一个房间，有恰好一个作者；
/// 只有作者可以编辑或删除。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub room_id: String,
    pub author_id: String,
    pub author_username: String,
    pub content: String,
    pub status: MessageStatus,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(
        room_id: impl Into<String>,
        author_id: impl Into<String>,
        author_username: impl Into<String>,
        content: impl Into<String>,
        attachments: Vec<Attachment>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id: room_id.into(),
            author_id: author_id.into(),
            author_username: author_username.into(),
            content: content.into(),
            status: MessageStatus::Active,
            attachments,
            created_at: now,
            updated_at: None,
        }
    }

    /// 消息内容是否有效：非空内容或至少一个附件
    pub fn validate_payload(content: &str, attachments: &[Attachment]) -> Result<(), DomainError> {
        if content.trim().is_empty() && attachments.is_empty() {
            return Err(DomainError::invalid_input(
                "content",
                "message must have content or at least one attachment",
            ));
        }
        for attachment in attachments {
            attachment.validate()?;
        }
        Ok(())
    }

    /// 编辑消息内容；已删除的消息不允许编辑
    pub fn edit(&mut self, new_content: impl Into<String>, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status == MessageStatus::Deleted {
            return Err(DomainError::invalid_state("cannot edit deleted message"));
        }
        self.content = new_content.into();
        self.status = MessageStatus::Edited;
        self.updated_at = Some(now);
        Ok(())
    }

    /// 删除消息：内容替换为墓碑文案，附件清空，状态终结
    pub fn delete(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status == MessageStatus::Deleted {
            return Err(DomainError::invalid_state("already deleted"));
        }
        self.content = DELETED_MESSAGE_PLACEHOLDER.to_string();
        self.status = MessageStatus::Deleted;
        self.attachments.clear();
        self.updated_at = Some(now);
        Ok(())
    }

    pub fn is_deleted(&self) -> bool {
        self.status == MessageStatus::Deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> Message {
        Message::new("room-1", "user-1", "alice", "hello", Vec::new(), Utc::now())
    }

    #[test]
    fn edit_flips_status_and_keeps_editable() {
        let mut msg = message();
        msg.edit("updated", Utc::now()).unwrap();
        assert_eq!(msg.status, MessageStatus::Edited);
        assert_eq!(msg.content, "updated");

        // 编辑后的消息可以再次编辑
        msg.edit("updated again", Utc::now()).unwrap();
        assert_eq!(msg.status, MessageStatus::Edited);
    }

    #[test]
    fn delete_is_terminal() {
        let mut msg = message();
        msg.attachments.push(Attachment::new(
            "photo.png",
            "image/png",
            1024,
            "uploads/photo.png",
        ));

        msg.delete(Utc::now()).unwrap();
        assert_eq!(msg.status, MessageStatus::Deleted);
        assert_eq!(msg.content, DELETED_MESSAGE_PLACEHOLDER);
        assert!(msg.attachments.is_empty());

        let err = msg.delete(Utc::now()).unwrap_err();
        assert_eq!(err, DomainError::invalid_state("already deleted"));

        let err = msg.edit("nope", Utc::now()).unwrap_err();
        assert_eq!(err, DomainError::invalid_state("cannot edit deleted message"));
    }

    #[test]
    fn payload_requires_content_or_attachment() {
        assert!(Message::validate_payload("  ", &[]).is_err());
        assert!(Message::validate_payload("hi", &[]).is_ok());

        let attachment = Attachment::new("a.pdf", "application/pdf", 10, "uploads/a.pdf");
        assert!(Message::validate_payload("", std::slice::from_ref(&attachment)).is_ok());
    }

    #[test]
    fn attachment_validation() {
        let too_big = Attachment::new("big.png", "image/png", MAX_ATTACHMENT_BYTES + 1, "x");
        assert!(too_big.validate().is_err());

        let bad_mime = Attachment::new("run.exe", "application/x-msdownload", 10, "x");
        let err = bad_mime.validate().unwrap_err();
        assert!(err.to_string().contains("application/x-msdownload"));
    }
}
