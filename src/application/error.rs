use thiserror::Error;

use crate::{application::repos::RepoError, domain::error::DomainError, infra::error::InfraError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("resource not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AppError::NotFound
                | AppError::Domain(DomainError::NotFound { .. })
                | AppError::Repo(RepoError::NotFound)
        )
    }

    /// Process exit status for the command-line entry point.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Domain(DomainError::NotFound { .. })
            | AppError::Repo(RepoError::NotFound)
            | AppError::NotFound => 2,
            AppError::Domain(_)
            | AppError::Validation(_)
            | AppError::Repo(RepoError::InvalidInput { .. }) => 3,
            AppError::Infra(InfraError::Configuration { .. }) => 78,
            AppError::Repo(_) | AppError::Infra(_) => 1,
        }
    }
}
