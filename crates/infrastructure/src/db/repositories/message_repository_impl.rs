//! 消息仓库实现
//!
//! 消息和附件行的写入在同一事务里完成：对调用方而言
//! 是单次持久写入，要么全部成功要么全部失败。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Attachment, Message, MessageStatus, RepositoryError};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::db::map_sqlx_err;

/// 数据库消息行
#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    room_id: String,
    author_id: String,
    author_username: String,
    content: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct AttachmentRow {
    id: Uuid,
    file_name: String,
    mime_type: String,
    size_bytes: i64,
    storage_path: String,
}

fn status_to_str(status: MessageStatus) -> &'static str {
    match status {
        MessageStatus::Active => "active",
        MessageStatus::Edited => "edited",
        MessageStatus::Deleted => "deleted",
    }
}

fn status_from_str(value: &str) -> MessageStatus {
    match value {
        "edited" => MessageStatus::Edited,
        "deleted" => MessageStatus::Deleted,
        _ => MessageStatus::Active,
    }
}

fn into_message(row: MessageRow, attachments: Vec<AttachmentRow>) -> Message {
    Message {
        id: row.id,
        room_id: row.room_id,
        author_id: row.author_id,
        author_username: row.author_username,
        content: row.content,
        status: status_from_str(&row.status),
        attachments: attachments
            .into_iter()
            .map(|a| Attachment {
                id: a.id,
                file_name: a.file_name,
                mime_type: a.mime_type,
                size_bytes: a.size_bytes as u64,
                storage_path: a.storage_path,
            })
            .collect(),
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl application::MessageRepository for PgMessageRepository {
    async fn create(&self, message: &Message) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        sqlx::query(
            "INSERT INTO messages (id, room_id, author_id, author_username, content, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(message.id)
        .bind(&message.room_id)
        .bind(&message.author_id)
        .bind(&message.author_username)
        .bind(&message.content)
        .bind(status_to_str(message.status))
        .bind(message.created_at)
        .bind(message.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        for attachment in &message.attachments {
            sqlx::query(
                "INSERT INTO message_attachments (id, message_id, file_name, mime_type, size_bytes, storage_path)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(attachment.id)
            .bind(message.id)
            .bind(&attachment.file_name)
            .bind(&attachment.mime_type)
            .bind(attachment.size_bytes as i64)
            .bind(&attachment.storage_path)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        }

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>, RepositoryError> {
        let row: Option<MessageRow> = sqlx::query_as(
            "SELECT id, room_id, author_id, author_username, content, status, created_at, updated_at
             FROM messages WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let attachments: Vec<AttachmentRow> = sqlx::query_as(
            "SELECT id, file_name, mime_type, size_bytes, storage_path
             FROM message_attachments WHERE message_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(Some(into_message(row, attachments)))
    }

    async fn update(&self, message: &Message) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let result = sqlx::query(
            "UPDATE messages SET content = $2, status = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(message.id)
        .bind(&message.content)
        .bind(status_to_str(message.status))
        .bind(message.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        // 附件行同步到实体当前状态（删除消息后实体附件为空）
        let kept_ids: Vec<Uuid> = message.attachments.iter().map(|a| a.id).collect();
        sqlx::query("DELETE FROM message_attachments WHERE message_id = $1 AND id <> ALL($2)")
            .bind(message.id)
            .bind(&kept_ids)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }
}
