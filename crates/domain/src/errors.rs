//! 领域错误定义
//!
//! 区分确定性的、面向用户的错误（参数非法、权限不足、资源不存在、
//! 状态不允许）和存储层错误，便于上层按策略传播或降级。

use thiserror::Error;

/// 领域错误类型
///
/// 这些错误都是确定性的：同样的输入总是产生同样的错误，
/// 直接向调用方呈现，不做自动重试。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 输入非法：在触达任何存储之前被拒绝
    #[error("invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    /// 权限不足
    #[error("forbidden: {action}")]
    Forbidden { action: String },

    /// 资源不存在
    #[error("not found: {resource} {id}")]
    NotFound { resource: String, id: String },

    /// 请求合法但当前状态不允许
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },
}

impl DomainError {
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn forbidden(action: impl Into<String>) -> Self {
        Self::Forbidden {
            action: action.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }
}

/// 持久化存储错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    /// 底层存储不可达或执行失败
    #[error("storage error: {0}")]
    Storage(String),

    /// 目标行不存在
    #[error("record not found")]
    NotFound,
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}
