use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Backend-independent failure classes every storage error is translated into.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::IntoStaticStr
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ErrorKind {
    /// Missing file, directory or backend.
    NotFound,
    /// Sandbox, jail or remote permission rejection.
    Unauthorized,
    /// Malformed input, missing parameters or configuration keys.
    InvalidArgument,
    /// Unknown backend type tag.
    UnsupportedType,
    /// Transport-level failure of the underlying storage system.
    Unavailable,
    /// Anything else. Never recovered silently.
    Unexpected,
}

/// A specialized [`StorageError`] enum of this crate.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("File not found{}: {message}", format_context(.context))]
    FileNotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Directory not found{}: {message}", format_context(.context))]
    DirectoryNotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Path traversal security violation{}: {message}", format_context(.context))]
    PathTraversalAttempt { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Access denied by storage system{}: {message}", format_context(.context))]
    AccessDenied { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Invalid path{}: {message}", format_context(.context))]
    InvalidPath { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Invalid argument{}: {message}", format_context(.context))]
    InvalidArgument { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Unsupported backend type{}: {message}", format_context(.context))]
    UnsupportedType { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Missing configuration key{}: {message}", format_context(.context))]
    MissingConfig { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Backend not initialized{}: {message}", format_context(.context))]
    NotInitialized { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Connection failure{}: {message}", format_context(.context))]
    Connection { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Protocol failure{}: {message}", format_context(.context))]
    Protocol { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Hardware I/O failure{}: {source}", format_context(.context))]
    Io { source: std::io::Error, context: Option<Cow<'static, str>> },

    #[error("Object store failure{}: {source}", format_context(.context))]
    ObjectStore { source: object_store::Error, context: Option<Cow<'static, str>> },

    /// Internal fallback for unexpected issues or logic errors.
    #[error("Internal storage error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl StorageError {
    /// Classifies the error into the backend-independent taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FileNotFound { .. } | Self::DirectoryNotFound { .. } => ErrorKind::NotFound,
            Self::PathTraversalAttempt { .. } | Self::AccessDenied { .. } => {
                ErrorKind::Unauthorized
            },
            Self::InvalidPath { .. }
            | Self::InvalidArgument { .. }
            | Self::MissingConfig { .. } => ErrorKind::InvalidArgument,
            Self::UnsupportedType { .. } => ErrorKind::UnsupportedType,
            Self::Connection { .. } | Self::Protocol { .. } => ErrorKind::Unavailable,
            Self::Io { source, .. } => io_kind(source),
            Self::ObjectStore { source, .. } => object_store_kind(source),
            Self::NotInitialized { .. } | Self::Internal { .. } => ErrorKind::Unexpected,
        }
    }

    pub(crate) fn not_found(path: impl Into<Cow<'static, str>>) -> Self {
        Self::FileNotFound { message: path.into(), context: None }
    }

    pub(crate) fn not_initialized(id: &str) -> Self {
        Self::NotInitialized {
            message: id.to_owned().into(),
            context: Some("initialize() must be called before any I/O".into()),
        }
    }
}

fn io_kind(err: &std::io::Error) -> ErrorKind {
    use std::io::ErrorKind as Io;

    match err.kind() {
        Io::NotFound => ErrorKind::NotFound,
        Io::PermissionDenied => ErrorKind::Unauthorized,
        Io::InvalidInput | Io::InvalidData => ErrorKind::InvalidArgument,
        _ => ErrorKind::Unavailable,
    }
}

fn object_store_kind(err: &object_store::Error) -> ErrorKind {
    match err {
        object_store::Error::NotFound { .. } => ErrorKind::NotFound,
        object_store::Error::PermissionDenied { .. }
        | object_store::Error::Unauthenticated { .. } => ErrorKind::Unauthorized,
        object_store::Error::InvalidPath { .. } => ErrorKind::InvalidArgument,
        _ => ErrorKind::Unavailable,
    }
}

/// Adds `.context(..)` to results that can be converted into a [`StorageError`].
pub trait StorageErrorExt<T> {
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, StorageError>;
}

impl<T> StorageErrorExt<T> for Result<T, StorageError> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Self {
        self.map_err(|mut e| {
            match &mut e {
                StorageError::FileNotFound { context: c, .. }
                | StorageError::DirectoryNotFound { context: c, .. }
                | StorageError::PathTraversalAttempt { context: c, .. }
                | StorageError::AccessDenied { context: c, .. }
                | StorageError::InvalidPath { context: c, .. }
                | StorageError::InvalidArgument { context: c, .. }
                | StorageError::UnsupportedType { context: c, .. }
                | StorageError::MissingConfig { context: c, .. }
                | StorageError::NotInitialized { context: c, .. }
                | StorageError::Connection { context: c, .. }
                | StorageError::Protocol { context: c, .. }
                | StorageError::Io { context: c, .. }
                | StorageError::ObjectStore { context: c, .. }
                | StorageError::Internal { context: c, .. } => *c = Some(context.into()),
            }
            e
        })
    }
}

impl<T> StorageErrorExt<T> for Result<T, std::io::Error> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, StorageError> {
        self.map_err(|source| StorageError::Io { source, context: Some(context.into()) })
    }
}

impl<T> StorageErrorExt<T> for Result<T, object_store::Error> {
    #[inline]
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, StorageError> {
        self.map_err(|source| StorageError::ObjectStore { source, context: Some(context.into()) })
    }
}

impl From<std::io::Error> for StorageError {
    #[inline]
    fn from(source: std::io::Error) -> Self {
        Self::Io { source, context: None }
    }
}

impl From<object_store::Error> for StorageError {
    #[inline]
    fn from(source: object_store::Error) -> Self {
        Self::ObjectStore { source, context: None }
    }
}

impl From<&'static str> for StorageError {
    #[inline]
    fn from(s: &'static str) -> Self {
        Self::Internal { message: Cow::Borrowed(s), context: None }
    }
}

impl From<String> for StorageError {
    #[inline]
    fn from(s: String) -> Self {
        Self::Internal { message: Cow::Owned(s), context: None }
    }
}

#[allow(clippy::ref_option)]
fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}
