//! PostgreSQL 访问
//!
//! 连接池构建与仓库实现。

pub mod repositories;

pub use repositories::{PgMessageRepository, PgRoomMemberRepository, PgUnreadMarkerRepository};

use domain::RepositoryError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub async fn create_pg_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

pub(crate) fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}
