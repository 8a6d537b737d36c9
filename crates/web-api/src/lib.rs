//! Web API 层
//!
//! 实时连接网关（WebSocket）、消息边界路由和监控端点。

pub mod auth;
pub mod error;
pub mod gateway;
pub mod routes;
pub mod state;

pub use auth::{AuthError, Claims, JwtConfig, JwtService};
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
