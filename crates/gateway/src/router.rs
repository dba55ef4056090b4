//! Resolves a backend by id and executes named operations against it.

use crate::error::GatewayError;
use crate::registry::BackendRegistry;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use filegate_storage::{Backend, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error};

/// Operations a [`Router`] can dispatch. Parsed case-insensitively with aliases.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::IntoStaticStr
)]
#[strum(ascii_case_insensitive)]
pub enum Operation {
    #[strum(to_string = "read", serialize = "readfile", serialize = "get")]
    Read,
    #[strum(to_string = "write", serialize = "writefile", serialize = "put", serialize = "upload")]
    Write,
    #[strum(to_string = "delete", serialize = "deletefile", serialize = "remove", serialize = "rm")]
    Delete,
    #[strum(to_string = "list", serialize = "listfiles", serialize = "ls", serialize = "dir")]
    List,
    #[strum(to_string = "exists", serialize = "fileexists")]
    Exists,
    #[strum(to_string = "stat", serialize = "getinfo", serialize = "info")]
    Stat,
    #[strum(to_string = "testconnection", serialize = "test", serialize = "ping")]
    TestConnection,
}

impl Operation {
    /// The resource parameter this operation acts on, as dispatched by [`Router::execute`].
    ///
    /// `List` reads `directory` and falls back to `path`; `TestConnection` names no resource.
    /// Authorization must check this same value.
    pub fn resource(self, params: &Map<String, Value>) -> Result<Option<&str>, GatewayError> {
        match self {
            Self::List => Ok(optional_str(params, "directory")?.or(optional_str(params, "path")?)),
            Self::TestConnection => Ok(None),
            _ => optional_str(params, "path"),
        }
    }
}

/// Content encodings accepted and produced in payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::EnumString, strum_macros::IntoStaticStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Encoding {
    #[strum(to_string = "utf8", serialize = "utf-8", serialize = "text")]
    Utf8,
    Base64,
}

/// Uniform result envelope of a routed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl OperationResult {
    #[must_use]
    pub fn ok(operation: impl Into<String>, message: impl Into<String>, payload: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            payload: Some(payload),
            operation: operation.into(),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(operation: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            payload: None,
            operation: operation.into(),
            error: Some(kind),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<BackendRegistry>,
}

impl Router {
    #[must_use]
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Looks up a registered backend.
    pub fn resolve(&self, backend_id: &str) -> Result<Arc<dyn Backend>, GatewayError> {
        self.registry.get(backend_id).ok_or_else(|| GatewayError::NotFound {
            message: format!("backend '{backend_id}'").into(),
            context: None,
        })
    }

    /// Executes `operation` on the backend registered as `backend_id`.
    ///
    /// Domain failures (unknown backend or operation, bad parameters, backend errors other
    /// than [`ErrorKind::Unexpected`]) come back as a failed [`OperationResult`]. Unexpected
    /// failures are logged and returned as `Err`.
    pub async fn execute(
        &self,
        backend_id: &str,
        operation: &str,
        params: &Map<String, Value>,
    ) -> Result<OperationResult, GatewayError> {
        let name = Operation::from_str(operation)
            .map_or_else(|_| operation.to_owned(), |op| op.to_string());

        match self.dispatch(backend_id, operation, params).await {
            Ok(result) => Ok(result),
            Err(e) if e.kind() == ErrorKind::Unexpected => {
                error!(backend = backend_id, operation = %name, error = %e, "Operation failed unexpectedly");
                Err(e)
            },
            Err(e) => {
                debug!(backend = backend_id, operation = %name, error = %e, "Operation failed");
                Ok(OperationResult::failed(name, e.kind(), e.to_string()))
            },
        }
    }

    async fn dispatch(
        &self,
        backend_id: &str,
        operation: &str,
        params: &Map<String, Value>,
    ) -> Result<OperationResult, GatewayError> {
        let op = Operation::from_str(operation).map_err(|_| GatewayError::UnsupportedOperation {
            message: operation.to_owned().into(),
            context: None,
        })?;
        let backend = self.resolve(backend_id)?;

        match op {
            Operation::Read => read(backend.as_ref(), params).await,
            Operation::Write => write(backend.as_ref(), params).await,
            Operation::Delete => {
                let path = required_str(params, "path")?;
                backend.delete(path).await?;
                Ok(OperationResult::ok(op.to_string(), "File deleted", json!({ "path": path })))
            },
            Operation::List => {
                let dir = op.resource(params)?.unwrap_or_default();
                let recursive = optional_bool(params, "recursive")?.unwrap_or(false);
                let entries = backend.list(dir, recursive).await?;
                let count = entries.len();
                Ok(OperationResult::ok(
                    op.to_string(),
                    format!("{count} entries"),
                    json!({ "directory": dir, "recursive": recursive, "entries": entries, "count": count }),
                ))
            },
            Operation::Exists => {
                let path = required_str(params, "path")?;
                let exists = backend.exists(path).await?;
                Ok(OperationResult::ok(op.to_string(), "Existence checked", json!({ "path": path, "exists": exists })))
            },
            Operation::Stat => {
                let path = required_str(params, "path")?;
                let stat = backend.stat(path).await?;
                let payload = serde_json::to_value(stat).map_err(|e| e.to_string())?;
                Ok(OperationResult::ok(op.to_string(), "Metadata loaded", payload))
            },
            Operation::TestConnection => {
                if backend.test_connection().await? {
                    Ok(OperationResult::ok(op.to_string(), "Backend reachable", json!({ "reachable": true })))
                } else {
                    Ok(OperationResult::failed(op.to_string(), ErrorKind::Unavailable, "Backend unreachable"))
                }
            },
        }
    }
}

async fn read(backend: &dyn Backend, params: &Map<String, Value>) -> Result<OperationResult, GatewayError> {
    let path = required_str(params, "path")?;
    let requested = encoding(params)?;
    let data = backend.read(path).await?;
    let size = data.len();

    let (content, used) = match requested {
        Encoding::Base64 => (STANDARD.encode(&data), Encoding::Base64),
        Encoding::Utf8 => match String::from_utf8(data) {
            Ok(text) => (text, Encoding::Utf8),
            Err(e) => (STANDARD.encode(e.as_bytes()), Encoding::Base64),
        },
    };
    let used: &'static str = used.into();

    Ok(OperationResult::ok(
        Operation::Read.to_string(),
        "File read",
        json!({ "path": path, "content": content, "encoding": used, "size": size }),
    ))
}

async fn write(backend: &dyn Backend, params: &Map<String, Value>) -> Result<OperationResult, GatewayError> {
    let path = required_str(params, "path")?;
    let content = required_str(params, "content")?;
    let data = match encoding(params)? {
        Encoding::Utf8 => content.as_bytes().to_vec(),
        Encoding::Base64 => STANDARD
            .decode(content)
            .map_err(|e| GatewayError::invalid_argument(format!("'content' is not valid base64: {e}")))?,
    };

    backend.write(path, &data).await?;
    Ok(OperationResult::ok(
        Operation::Write.to_string(),
        "File written",
        json!({ "path": path, "size": data.len() }),
    ))
}

fn encoding(params: &Map<String, Value>) -> Result<Encoding, GatewayError> {
    optional_str(params, "encoding")?.map_or(Ok(Encoding::Utf8), |raw| {
        Encoding::from_str(raw)
            .map_err(|_| GatewayError::invalid_argument(format!("unknown encoding '{raw}'")))
    })
}

fn optional_str<'a>(params: &'a Map<String, Value>, key: &'static str) -> Result<Option<&'a str>, GatewayError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(GatewayError::invalid_argument(format!("'{key}' must be a string"))),
    }
}

fn required_str<'a>(params: &'a Map<String, Value>, key: &'static str) -> Result<&'a str, GatewayError> {
    optional_str(params, key)?
        .ok_or_else(|| GatewayError::invalid_argument(format!("missing parameter '{key}'")))
}

fn optional_bool(params: &Map<String, Value>, key: &'static str) -> Result<Option<bool>, GatewayError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::String(s)) => s
            .parse()
            .map(Some)
            .map_err(|_| GatewayError::invalid_argument(format!("'{key}' must be a boolean"))),
        Some(_) => Err(GatewayError::invalid_argument(format!("'{key}' must be a boolean"))),
    }
}
