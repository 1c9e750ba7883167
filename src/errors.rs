use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::order::{OrderError, OrderStatus};
use crate::utils::IsTransient;

// ============================================================================
// Service Error Taxonomy
// ============================================================================
//
// Every use case, adapter and controller speaks this error type. Adapters
// convert driver errors at their boundary and attach the operation they
// were performing; the HTTP layer maps variants to status codes.
//
// ============================================================================

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("bad input: {0}")]
    BadInput(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("order {0} is not pending")]
    NotPending(Uuid),

    /// The projection has not caught up with the command side yet.
    #[error("view for order {0} not materialized yet")]
    ViewNotReady(Uuid),

    #[error("{service} unavailable: {message}")]
    DependencyUnavailable {
        service: &'static str,
        message: String,
    },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("event bus error: {0}")]
    Bus(String),
}

impl ServiceError {
    pub fn persistence(context: &str, err: impl std::fmt::Display) -> Self {
        ServiceError::Persistence(format!("{}: {}", context, err))
    }

    pub fn bus(context: &str, err: impl std::fmt::Display) -> Self {
        ServiceError::Bus(format!("{}: {}", context, err))
    }

    pub fn unavailable(service: &'static str, message: impl Into<String>) -> Self {
        ServiceError::DependencyUnavailable {
            service,
            message: message.into(),
        }
    }

    /// Stable machine-readable code carried in error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::BadInput(_) => "BAD_INPUT",
            ServiceError::Unauthenticated(_) => "UNAUTHENTICATED",
            ServiceError::NotFound(_) | ServiceError::ViewNotReady(_) => "NOT_FOUND",
            ServiceError::InvalidTransition { .. } => "INVALID_TRANSITION",
            ServiceError::NotPending(_) => "NOT_PENDING",
            ServiceError::DependencyUnavailable { .. } => "DEPENDENCY_UNAVAILABLE",
            ServiceError::Persistence(_) => "PERSISTENCE_ERROR",
            ServiceError::Bus(_) => "BUS_ERROR",
        }
    }
}

impl From<OrderError> for ServiceError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidTransition { from, to } => ServiceError::InvalidTransition { from, to },
            other => ServiceError::BadInput(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::persistence("database", err)
    }
}

impl From<redis::RedisError> for ServiceError {
    fn from(err: redis::RedisError) -> Self {
        ServiceError::persistence("key-value store", err)
    }
}

impl IsTransient for ServiceError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::ViewNotReady(_)
                | ServiceError::DependencyUnavailable { .. }
                | ServiceError::Persistence(_)
                | ServiceError::Bus(_)
        )
    }
}

// ============================================================================
// HTTP Mapping
// ============================================================================

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: u16,
    error: &'a str,
    message: String,
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::BadInput(_) | ServiceError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ServiceError::NotFound(_) | ServiceError::NotPending(_) | ServiceError::ViewNotReady(_) => {
                StatusCode::NOT_FOUND
            }
            ServiceError::DependencyUnavailable { .. } | ServiceError::Persistence(_) | ServiceError::Bus(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "Request failed");
        }

        HttpResponse::build(status).json(ErrorBody {
            code: status.as_u16(),
            error: self.kind(),
            message: self.to_string(),
        })
    }
}
