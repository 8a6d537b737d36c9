//! 未读标记仓库实现
//!
//! (消息, 接收者) 上有唯一约束，重复写入走 ON CONFLICT DO NOTHING，
//! 保证每个接收者每条消息至多一条标记。

use async_trait::async_trait;
use domain::{RepositoryError, UnreadMarker};
use sqlx::{PgPool, Row};

use crate::db::map_sqlx_err;

pub struct PgUnreadMarkerRepository {
    pool: PgPool,
}

impl PgUnreadMarkerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl application::UnreadMarkerRepository for PgUnreadMarkerRepository {
    async fn insert(&self, marker: &UnreadMarker) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO unread_markers (message_id, user_id, room_id, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (message_id, user_id) DO NOTHING",
        )
        .bind(marker.message_id)
        .bind(&marker.user_id)
        .bind(&marker.room_id)
        .bind(marker.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn count_for(&self, user_id: &str, room_id: &str) -> Result<u64, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM unread_markers WHERE user_id = $1 AND room_id = $2",
        )
        .bind(user_id)
        .bind(room_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(row.get::<i64, _>("count") as u64)
    }

    async fn delete_for(&self, user_id: &str, room_id: &str) -> Result<u64, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM unread_markers WHERE user_id = $1 AND room_id = $2")
                .bind(user_id)
                .bind(room_id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }
}
