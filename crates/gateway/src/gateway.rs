use crate::acl::Access;
use crate::error::GatewayError;
use crate::proxy::SecurityProxy;
use crate::router::{Operation, OperationResult, Router};
use filegate_storage::FileStat;
use serde_json::{Map, Value};
use std::str::FromStr;

/// Facade composing the [`SecurityProxy`] and the [`Router`].
///
/// Every call is authorized and audited before a backend is touched.
#[derive(Debug, Clone)]
pub struct FileGateway {
    proxy: SecurityProxy,
    router: Router,
}

impl FileGateway {
    #[must_use]
    pub fn new(proxy: SecurityProxy, router: Router) -> Self {
        Self { proxy, router }
    }

    #[must_use]
    pub fn proxy(&self) -> &SecurityProxy {
        &self.proxy
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Authorizes and routes a named operation.
    ///
    /// The access check uses the resource the router will act on (see
    /// [`Operation::resource`]), defaulting to `/`. A failed envelope is audited `FAILED`
    /// and still returned as `Ok`; sandbox rejections and unexpected failures are returned
    /// as `Err`.
    pub async fn execute(
        &self,
        user: &str,
        backend_id: &str,
        operation: &str,
        params: &Map<String, Value>,
    ) -> Result<OperationResult, GatewayError> {
        let access = access_name(operation);
        let path = resource(operation, params).unwrap_or("/");

        let outcome = self
            .proxy
            .execute_secure(&access, backend_id, path, user, || async move {
                let result = self.router.execute(backend_id, operation, params).await?;
                if result.success {
                    Ok(result)
                } else {
                    Err(GatewayError::OperationFailed { result: Box::new(result) })
                }
            })
            .await;

        match outcome {
            Err(GatewayError::OperationFailed { result }) => Ok(*result),
            other => other,
        }
    }

    pub async fn read(&self, user: &str, backend_id: &str, path: &str) -> Result<Vec<u8>, GatewayError> {
        self.proxy
            .execute_secure(Access::Read.into(), backend_id, path, user, || async move {
                self.router.resolve(backend_id)?.read(path).await.map_err(GatewayError::from)
            })
            .await
    }

    pub async fn write(
        &self,
        user: &str,
        backend_id: &str,
        path: &str,
        content: &[u8],
    ) -> Result<(), GatewayError> {
        self.proxy
            .execute_secure(Access::Write.into(), backend_id, path, user, || async move {
                self.router.resolve(backend_id)?.write(path, content).await.map_err(GatewayError::from)
            })
            .await
    }

    pub async fn delete(&self, user: &str, backend_id: &str, path: &str) -> Result<(), GatewayError> {
        self.proxy
            .execute_secure(Access::Delete.into(), backend_id, path, user, || async move {
                self.router.resolve(backend_id)?.delete(path).await.map_err(GatewayError::from)
            })
            .await
    }

    pub async fn list(
        &self,
        user: &str,
        backend_id: &str,
        dir: &str,
        recursive: bool,
    ) -> Result<Vec<String>, GatewayError> {
        let resource = if dir.trim().is_empty() { "/" } else { dir };
        self.proxy
            .execute_secure(Access::List.into(), backend_id, resource, user, || async move {
                self.router.resolve(backend_id)?.list(dir, recursive).await.map_err(GatewayError::from)
            })
            .await
    }

    pub async fn exists(&self, user: &str, backend_id: &str, path: &str) -> Result<bool, GatewayError> {
        self.proxy
            .execute_secure(Access::Read.into(), backend_id, path, user, || async move {
                self.router.resolve(backend_id)?.exists(path).await.map_err(GatewayError::from)
            })
            .await
    }

    pub async fn stat(&self, user: &str, backend_id: &str, path: &str) -> Result<FileStat, GatewayError> {
        self.proxy
            .execute_secure(Access::Read.into(), backend_id, path, user, || async move {
                self.router.resolve(backend_id)?.stat(path).await.map_err(GatewayError::from)
            })
            .await
    }
}

/// Resource named by `params` for `operation`. Malformed parameters authorize against the
/// root and are rejected by the router afterwards.
fn resource<'a>(operation: &str, params: &'a Map<String, Value>) -> Option<&'a str> {
    let raw = match Operation::from_str(operation) {
        Ok(op) => op.resource(params).ok().flatten(),
        Err(_) => params.get("path").and_then(Value::as_str),
    };
    raw.filter(|p| !p.trim().is_empty())
}

/// Maps a routed operation to the access name checked by the sandbox. Unknown operations
/// pass through unchanged so the access check rejects them.
fn access_name(operation: &str) -> String {
    let access = match Operation::from_str(operation) {
        Ok(Operation::Read | Operation::Exists | Operation::Stat | Operation::TestConnection) => Access::Read,
        Ok(Operation::Write) => Access::Write,
        Ok(Operation::Delete) => Access::Delete,
        Ok(Operation::List) => Access::List,
        Err(_) => return operation.to_owned(),
    };
    access.to_string()
}
