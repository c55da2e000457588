//! # Error Classification
//!
//! Maps an arbitrary failure onto a small, stable set of category tags used as
//! the `error_type` attribute on error counters.
//!
//! Checks run as a priority cascade, first match wins. Each check walks the
//! whole `source()` chain before the next check runs, so a deadline wrapped
//! inside an I/O error still classifies as `timeout`:
//!
//! 1. no error → `""`
//! 2. cancellation → `canceled`
//! 3. deadline → `timeout`
//! 4. network → `network_timeout` / `network`
//! 5. message mentions `parse` or `syntax` → `invalid_input`
//! 6. database error codes → `db_unique_violation`, `db_fk_violation`, `db_error`
//! 7. gRPC status → `grpc_timeout`, `grpc_not_found`, `grpc_invalid_arg`, `grpc_<Code>`
//! 8. anything else → `unknown`

use std::error::Error as StdError;
use std::fmt;
use std::io;

use thiserror::Error;
use tonic::Code;

/// Caller-side cancellation and deadline signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// A transport-level failure that knows whether it was a timeout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct NetworkError {
    pub message: String,
    pub timeout: bool,
}

impl NetworkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timeout: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timeout: true,
        }
    }
}

/// Classification result. [`as_str`](Self::as_str) yields the attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    None,
    Canceled,
    Timeout,
    NetworkTimeout,
    Network,
    InvalidInput,
    DbUniqueViolation,
    DbFkViolation,
    DbError,
    GrpcTimeout,
    GrpcNotFound,
    GrpcInvalidArg,
    Grpc(Code),
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Canceled => "canceled",
            Self::Timeout => "timeout",
            Self::NetworkTimeout => "network_timeout",
            Self::Network => "network",
            Self::InvalidInput => "invalid_input",
            Self::DbUniqueViolation => "db_unique_violation",
            Self::DbFkViolation => "db_fk_violation",
            Self::DbError => "db_error",
            Self::GrpcTimeout => "grpc_timeout",
            Self::GrpcNotFound => "grpc_not_found",
            Self::GrpcInvalidArg => "grpc_invalid_arg",
            Self::Grpc(code) => grpc_code_category(*code),
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical gRPC code names, matching what other language runtimes emit.
fn grpc_code_category(code: Code) -> &'static str {
    #[allow(unreachable_patterns)]
    match code {
        Code::Ok => "grpc_OK",
        Code::Cancelled => "grpc_Canceled",
        Code::Unknown => "grpc_Unknown",
        Code::InvalidArgument => "grpc_InvalidArgument",
        Code::DeadlineExceeded => "grpc_DeadlineExceeded",
        Code::NotFound => "grpc_NotFound",
        Code::AlreadyExists => "grpc_AlreadyExists",
        Code::PermissionDenied => "grpc_PermissionDenied",
        Code::ResourceExhausted => "grpc_ResourceExhausted",
        Code::FailedPrecondition => "grpc_FailedPrecondition",
        Code::Aborted => "grpc_Aborted",
        Code::OutOfRange => "grpc_OutOfRange",
        Code::Unimplemented => "grpc_Unimplemented",
        Code::Internal => "grpc_Internal",
        Code::Unavailable => "grpc_Unavailable",
        Code::DataLoss => "grpc_DataLoss",
        Code::Unauthenticated => "grpc_Unauthenticated",
        _ => "grpc_Unknown",
    }
}

fn chain<'a>(
    err: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |&e| e.source())
}

fn is_canceled(err: &(dyn StdError + 'static)) -> bool {
    if let Some(ctx) = err.downcast_ref::<ContextError>() {
        return *ctx == ContextError::Canceled;
    }
    err.downcast_ref::<tokio::task::JoinError>()
        .is_some_and(|join| join.is_cancelled())
}

fn is_deadline(err: &(dyn StdError + 'static)) -> bool {
    err.downcast_ref::<ContextError>() == Some(&ContextError::DeadlineExceeded)
        || err.is::<tokio::time::error::Elapsed>()
}

/// `Some(timeout)` when the error is network-shaped.
fn network_timeout_flag(err: &(dyn StdError + 'static)) -> Option<bool> {
    if let Some(net) = err.downcast_ref::<NetworkError>() {
        return Some(net.timeout);
    }
    let io_err = err.downcast_ref::<io::Error>()?;
    match io_err.kind() {
        io::ErrorKind::TimedOut => Some(true),
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable
        | io::ErrorKind::BrokenPipe => Some(false),
        _ => None,
    }
}

fn mentions_invalid_input(err: &(dyn StdError + 'static)) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("parse") || msg.contains("syntax")
}

fn database_category(err: &(dyn StdError + 'static)) -> Option<ErrorCategory> {
    match err.downcast_ref::<sqlx::Error>()? {
        sqlx::Error::Database(db) => Some(match db.kind() {
            sqlx::error::ErrorKind::UniqueViolation => ErrorCategory::DbUniqueViolation,
            sqlx::error::ErrorKind::ForeignKeyViolation => ErrorCategory::DbFkViolation,
            _ => ErrorCategory::DbError,
        }),
        _ => None,
    }
}

fn grpc_category(err: &(dyn StdError + 'static)) -> Option<ErrorCategory> {
    let status = err.downcast_ref::<tonic::Status>()?;
    Some(match status.code() {
        Code::DeadlineExceeded => ErrorCategory::GrpcTimeout,
        Code::NotFound => ErrorCategory::GrpcNotFound,
        Code::InvalidArgument => ErrorCategory::GrpcInvalidArg,
        other => ErrorCategory::Grpc(other),
    })
}

/// Classify a failure into an [`ErrorCategory`].
pub fn classify(err: Option<&(dyn StdError + 'static)>) -> ErrorCategory {
    let Some(err) = err else {
        return ErrorCategory::None;
    };

    if chain(err).any(is_canceled) {
        return ErrorCategory::Canceled;
    }
    if chain(err).any(is_deadline) {
        return ErrorCategory::Timeout;
    }
    if let Some(timeout) = chain(err).find_map(network_timeout_flag) {
        return if timeout {
            ErrorCategory::NetworkTimeout
        } else {
            ErrorCategory::Network
        };
    }
    if chain(err).any(mentions_invalid_input) {
        return ErrorCategory::InvalidInput;
    }
    if let Some(category) = chain(err).find_map(database_category) {
        return category;
    }
    if let Some(category) = chain(err).find_map(grpc_category) {
        return category;
    }

    ErrorCategory::Unknown
}

/// String form of [`classify`], as emitted on the `error_type` attribute.
pub fn classify_error(err: Option<&(dyn StdError + 'static)>) -> &'static str {
    classify(err).as_str()
}
