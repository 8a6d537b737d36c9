use domain::{DomainError, RepositoryError};
use thiserror::Error;

use crate::dispatcher::DispatchError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("presence store error: {0}")]
    Store(#[from] StoreError),
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Repository(value)
    }
}

impl ApplicationError {
    /// 是否为确定性的、面向用户的错误（不重试，直接呈现）
    pub fn is_user_facing(&self) -> bool {
        matches!(self, ApplicationError::Domain(_))
    }
}
