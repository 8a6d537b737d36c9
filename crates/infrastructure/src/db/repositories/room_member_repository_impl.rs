//! 房间成员仓库实现

use async_trait::async_trait;
use domain::{RepositoryError, RoomMember};
use sqlx::{PgPool, Row};

use crate::db::map_sqlx_err;

pub struct PgRoomMemberRepository {
    pool: PgPool,
}

impl PgRoomMemberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl application::RoomMemberRepository for PgRoomMemberRepository {
    async fn is_member(&self, room_id: &str, user_id: &str) -> Result<bool, RepositoryError> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM room_members WHERE room_id = $1 AND user_id = $2) AS is_member",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(row.get::<bool, _>("is_member"))
    }

    async fn list_members(&self, room_id: &str) -> Result<Vec<RoomMember>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT user_id, username FROM room_members WHERE room_id = $1 ORDER BY user_id",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(rows
            .into_iter()
            .map(|row| RoomMember {
                user_id: row.get("user_id"),
                username: row.get("username"),
            })
            .collect())
    }
}
