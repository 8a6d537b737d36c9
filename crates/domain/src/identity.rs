//! 标识符校验与清洗
//!
//! 房间ID、用户ID等标识符来自客户端，可能被攻击者构造。
//! 所有标识符在用于构建共享存储的键之前必须经过这里的清洗，
//! 防止键注入或命名空间穿越。

use crate::errors::DomainError;

/// 标识符和用户名的最大长度
pub const MAX_IDENTIFIER_LEN: usize = 1000;

/// 校验标识符：非空且不超过最大长度
pub fn validate_identifier(field: &str, value: &str) -> Result<(), DomainError> {
    if value.is_empty() {
        return Err(DomainError::invalid_input(field, "must not be empty"));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(DomainError::invalid_input(
            field,
            format!("exceeds {} characters", MAX_IDENTIFIER_LEN),
        ));
    }
    Ok(())
}

/// 校验用户名：规则与标识符一致，单独命名以便错误信息指向正确字段
pub fn validate_username(value: &str) -> Result<(), DomainError> {
    validate_identifier("username", value)
}

/// 清洗标识符用于键构建，只保留 `[a-zA-Z0-9:_-]`
pub fn sanitize_key_part(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '-'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_identifier() {
        let err = validate_identifier("room_id", "").unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput { .. }));
    }

    #[test]
    fn rejects_oversized_identifier() {
        let long = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(validate_identifier("user_id", &long).is_err());
        let max = "a".repeat(MAX_IDENTIFIER_LEN);
        assert!(validate_identifier("user_id", &max).is_ok());
    }

    #[test]
    fn strips_disallowed_characters() {
        assert_eq!(sanitize_key_part("room@#$123"), "room123");
        assert_eq!(sanitize_key_part("a:b_c-d"), "a:b_c-d");
        assert_eq!(sanitize_key_part("../../etc"), "etc");
    }
}
