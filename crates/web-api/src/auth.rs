//! JWT 认证
//!
//! 实时连接和 HTTP API 使用同一套凭证方案。凭证的签发
//! 属于外部认证服务，这里只负责校验（测试中也用它铸造
//! 令牌）。

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(String),
}

/// JWT 载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// 用户ID
    pub sub: String,
    pub username: String,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration: chrono::Duration,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            expiration: chrono::Duration::hours(config.expiration_hours),
        }
    }

    pub fn issue_token(&self, user_id: &str, username: &str) -> Result<String, AuthError> {
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            exp: (Utc::now() + self.expiration).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| AuthError::InvalidToken(err.to_string()))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|err| AuthError::InvalidToken(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new(JwtConfig {
            secret: "test-secret".to_string(),
            expiration_hours: 1,
        })
    }

    #[test]
    fn issue_and_validate_round_trip() {
        let jwt = service();
        let token = jwt.issue_token("alice", "Alice").unwrap();
        let claims = jwt.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.username, "Alice");
    }

    #[test]
    fn rejects_garbage_token() {
        let jwt = service();
        assert!(jwt.validate_token("not.a.token").is_err());
    }

    #[test]
    fn rejects_token_from_other_secret() {
        let other = JwtService::new(JwtConfig {
            secret: "other-secret".to_string(),
            expiration_hours: 1,
        });
        let token = other.issue_token("alice", "Alice").unwrap();
        assert!(service().validate_token(&token).is_err());
    }
}
