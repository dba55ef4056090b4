use crate::router::OperationResult;
use filegate_storage::{ErrorKind, StorageError};
use std::borrow::Cow;

/// A specialized [`GatewayError`] enum of this crate.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Unknown backend id or other missing entity.
    #[error("Not found{}: {message}", format_context(.context))]
    NotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Sandbox or ACL rejection. Always surfaced to the caller.
    #[error("Unauthorized{}: {message}", format_context(.context))]
    Unauthorized { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Invalid argument{}: {message}", format_context(.context))]
    InvalidArgument { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Unsupported operation{}: {message}", format_context(.context))]
    UnsupportedOperation { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Storage failure{}: {source}", format_context(.context))]
    Storage { source: StorageError, context: Option<Cow<'static, str>> },

    /// A repository could not serve the request.
    #[error("Repository failure{}: {message}", format_context(.context))]
    Repository { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// A routed operation completed with a failed result envelope.
    #[error("Operation '{}' failed: {}", .result.operation, .result.message)]
    OperationFailed { result: Box<OperationResult> },

    #[error("Invalid configuration{}: {source}", format_context(.context))]
    Config { source: config::ConfigError, context: Option<Cow<'static, str>> },

    /// Internal fallback for unexpected issues or logic errors.
    #[error("Internal gateway error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl GatewayError {
    /// Classifies the error into the backend-independent taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::InvalidArgument { .. } | Self::UnsupportedOperation { .. } => {
                ErrorKind::InvalidArgument
            },
            Self::Storage { source, .. } => source.kind(),
            Self::OperationFailed { result } => result.error.unwrap_or(ErrorKind::Unexpected),
            Self::Repository { .. } | Self::Config { .. } | Self::Internal { .. } => {
                ErrorKind::Unexpected
            },
        }
    }

    pub(crate) fn unauthorized(reason: &'static str, path: &str) -> Self {
        Self::Unauthorized { message: reason.into(), context: Some(path.to_owned().into()) }
    }

    pub(crate) fn invalid_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidArgument { message: message.into(), context: None }
    }
}

/// Adds `.context(..)` to results that can be converted into a [`GatewayError`].
pub trait GatewayErrorExt<T> {
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, GatewayError>;
}

impl<T> GatewayErrorExt<T> for Result<T, GatewayError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Self {
        self.map_err(|mut e| {
            match &mut e {
                GatewayError::NotFound { context: c, .. }
                | GatewayError::Unauthorized { context: c, .. }
                | GatewayError::InvalidArgument { context: c, .. }
                | GatewayError::UnsupportedOperation { context: c, .. }
                | GatewayError::Storage { context: c, .. }
                | GatewayError::Repository { context: c, .. }
                | GatewayError::Config { context: c, .. }
                | GatewayError::Internal { context: c, .. } => *c = Some(context.into()),
                GatewayError::OperationFailed { .. } => {},
            }
            e
        })
    }
}

impl<T> GatewayErrorExt<T> for Result<T, StorageError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, GatewayError> {
        self.map_err(|source| GatewayError::Storage { source, context: Some(context.into()) })
    }
}

impl<T> GatewayErrorExt<T> for Result<T, config::ConfigError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, GatewayError> {
        self.map_err(|source| GatewayError::Config { source, context: Some(context.into()) })
    }
}

impl From<StorageError> for GatewayError {
    #[inline]
    fn from(source: StorageError) -> Self {
        Self::Storage { source, context: None }
    }
}

impl From<config::ConfigError> for GatewayError {
    #[inline]
    fn from(source: config::ConfigError) -> Self {
        Self::Config { source, context: None }
    }
}

impl From<&'static str> for GatewayError {
    #[inline]
    fn from(s: &'static str) -> Self {
        Self::Internal { message: Cow::Borrowed(s), context: None }
    }
}

impl From<String> for GatewayError {
    #[inline]
    fn from(s: String) -> Self {
        Self::Internal { message: Cow::Owned(s), context: None }
    }
}

#[allow(clippy::ref_option)]
fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}
