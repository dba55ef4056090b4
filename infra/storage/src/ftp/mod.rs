//! FTP backend with a pooled, reconnecting session layer.
//!
//! The wire protocol is hidden behind [`FtpConnector`] and [`FtpSession`]; the backend only
//! deals with pooling, path handling and translating results. Every session call is
//! blocking and runs on the tokio blocking pool.

#[cfg(feature = "ftp")]
mod client;

#[cfg(feature = "ftp")]
pub use client::SuppaFtpConnector;

use crate::backend::{Backend, BackendConfig, BackendKind, FileStat};
use crate::error::StorageError;
use crate::path;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const HOST: &str = "host";
const PORT: &str = "port";
const USERNAME: &str = "username";
const PASSWORD: &str = "password";
const TIMEOUT_SECS: &str = "timeoutSecs";
const POOL_SIZE: &str = "poolSize";

const DEFAULT_PORT: u16 = 21;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_POOL_SIZE: usize = 4;

/// Connection settings parsed from a [`BackendConfig`].
#[derive(Clone, PartialEq, Eq)]
pub struct FtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub connect_timeout: Duration,
    /// Maximum number of idle sessions kept for reuse.
    pub pool_size: usize,
}

impl fmt::Debug for FtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("connect_timeout", &self.connect_timeout)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

impl FtpSettings {
    /// Reads `host`, `username`, `password` and the optional `port`, `timeoutSecs` and
    /// `poolSize` keys.
    pub fn from_config(config: &BackendConfig) -> Result<Self, StorageError> {
        let host = config.require(HOST)?.to_owned();
        let username = config.require(USERNAME)?.to_owned();
        let password = config.require(PASSWORD)?.to_owned();

        let port = parse_optional(config, PORT)?.unwrap_or(DEFAULT_PORT);
        let connect_timeout =
            parse_optional(config, TIMEOUT_SECS)?.map_or(DEFAULT_TIMEOUT, Duration::from_secs);
        let pool_size = parse_optional(config, POOL_SIZE)?.unwrap_or(DEFAULT_POOL_SIZE).max(1);

        Ok(Self { host, port, username, password, connect_timeout, pool_size })
    }
}

fn parse_optional<T: std::str::FromStr>(
    config: &BackendConfig,
    key: &'static str,
) -> Result<Option<T>, StorageError> {
    config
        .get(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|_| StorageError::InvalidArgument {
                message: key.into(),
                context: Some(format!("'{raw}' is not a valid value").into()),
            })
        })
        .transpose()
}

/// A single entry returned by a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// One logged-in control connection.
///
/// Paths are normalized and root-relative; the empty string denotes the login directory.
/// Implementations translate protocol errors: a permanent "file unavailable" reply must
/// become [`StorageError::FileNotFound`], transport failures [`StorageError::Connection`].
pub trait FtpSession: Send {
    fn retrieve(&mut self, path: &str) -> Result<Vec<u8>, StorageError>;

    fn store(&mut self, path: &str, content: &[u8]) -> Result<(), StorageError>;

    fn remove(&mut self, path: &str) -> Result<(), StorageError>;

    fn make_dir(&mut self, path: &str) -> Result<(), StorageError>;

    fn entries(&mut self, dir: &str) -> Result<Vec<FtpEntry>, StorageError>;

    fn size(&mut self, path: &str) -> Result<u64, StorageError>;

    fn is_dir(&mut self, path: &str) -> Result<bool, StorageError>;

    fn noop(&mut self) -> Result<(), StorageError>;
}

/// Opens new sessions for the pool.
pub trait FtpConnector: Send + Sync + fmt::Debug {
    fn connect(&self, settings: &FtpSettings) -> Result<Box<dyn FtpSession>, StorageError>;
}

/// Connector used when the crate is built without the `ftp` feature.
#[cfg(not(feature = "ftp"))]
#[derive(Debug, Default)]
struct DisabledConnector;

#[cfg(not(feature = "ftp"))]
impl FtpConnector for DisabledConnector {
    fn connect(&self, _settings: &FtpSettings) -> Result<Box<dyn FtpSession>, StorageError> {
        Err(StorageError::UnsupportedType {
            message: "ftp".into(),
            context: Some("Built without the `ftp` feature".into()),
        })
    }
}

fn default_connector() -> Arc<dyn FtpConnector> {
    #[cfg(feature = "ftp")]
    {
        Arc::new(SuppaFtpConnector)
    }
    #[cfg(not(feature = "ftp"))]
    {
        Arc::new(DisabledConnector)
    }
}

struct SessionPool {
    connector: Arc<dyn FtpConnector>,
    settings: FtpSettings,
    idle: Mutex<Vec<Box<dyn FtpSession>>>,
}

impl fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPool")
            .field("settings", &self.settings)
            .field("idle", &self.idle.lock().len())
            .finish_non_exhaustive()
    }
}

impl SessionPool {
    fn checkout(&self) -> Result<Box<dyn FtpSession>, StorageError> {
        let idle = self.idle.lock().pop();
        match idle {
            Some(session) => Ok(session),
            None => self.connector.connect(&self.settings),
        }
    }

    fn checkin<T>(&self, session: Box<dyn FtpSession>, result: &Result<T, StorageError>) {
        if matches!(result, Err(StorageError::Connection { .. })) {
            return;
        }
        let mut idle = self.idle.lock();
        if idle.len() < self.settings.pool_size {
            idle.push(session);
        }
    }

    /// Runs `op` on a pooled session, retrying once on a fresh connection if the
    /// session turned out to be broken.
    fn with_session<T, F>(&self, op: &F) -> Result<T, StorageError>
    where
        F: Fn(&mut dyn FtpSession) -> Result<T, StorageError>,
    {
        let mut session = self.checkout()?;
        match op(session.as_mut()) {
            Err(err @ StorageError::Connection { .. }) => {
                warn!(host = %self.settings.host, error = %err, "FTP session failed, reconnecting");
                drop(session);
                let mut fresh = self.connector.connect(&self.settings)?;
                let result = op(fresh.as_mut());
                self.checkin(fresh, &result);
                result
            },
            result => {
                self.checkin(session, &result);
                result
            },
        }
    }
}

/// A backend talking to an FTP server.
///
/// # Configuration
/// `host`, `username`, `password` (required); `port` (default 21), `timeoutSecs`
/// (connect timeout, default 10) and `poolSize` (idle sessions kept, default 4).
#[derive(Debug)]
pub struct FtpBackend {
    id: String,
    connector: Arc<dyn FtpConnector>,
    pool: RwLock<Option<Arc<SessionPool>>>,
}

impl FtpBackend {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_connector(id, default_connector())
    }

    pub fn with_connector(id: impl Into<String>, connector: Arc<dyn FtpConnector>) -> Self {
        Self { id: id.into(), connector, pool: RwLock::new(None) }
    }

    fn pool(&self) -> Result<Arc<SessionPool>, StorageError> {
        self.pool.read().clone().ok_or_else(|| StorageError::not_initialized(&self.id))
    }

    async fn run<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: Fn(&mut dyn FtpSession) -> Result<T, StorageError> + Send + 'static,
    {
        let pool = self.pool()?;
        tokio::task::spawn_blocking(move || pool.with_session(&op)).await.map_err(|e| {
            StorageError::Internal {
                message: e.to_string().into(),
                context: Some("FTP task panicked".into()),
            }
        })?
    }

    fn file_path(path: &str) -> Result<String, StorageError> {
        let normalized = path::resolve_relative(path)?;
        if normalized.is_empty() {
            return Err(StorageError::InvalidPath {
                message: path.to_owned().into(),
                context: Some("Target must be a file".into()),
            });
        }
        Ok(normalized)
    }
}

fn make_parents(session: &mut dyn FtpSession, file: &str) -> Result<(), StorageError> {
    let Some(parent) = path::parent(file) else {
        return Ok(());
    };

    let mut current = String::new();
    for segment in parent.split('/') {
        current = path::join(&current, segment);
        match session.make_dir(&current) {
            Err(err @ StorageError::Connection { .. }) => return Err(err),
            // Servers reply with an error for directories that already exist.
            _ => {},
        }
    }
    Ok(())
}

fn children(session: &mut dyn FtpSession, dir: &str) -> Result<Vec<FtpEntry>, StorageError> {
    match session.entries(dir) {
        Ok(entries) => Ok(entries.into_iter().filter(|e| e.name != "." && e.name != "..").collect()),
        Err(StorageError::FileNotFound { .. }) => {
            Err(StorageError::DirectoryNotFound { message: dir.to_owned().into(), context: None })
        },
        Err(err) => Err(err),
    }
}

fn walk(session: &mut dyn FtpSession, dir: &str, recursive: bool) -> Result<Vec<String>, StorageError> {
    let mut out = Vec::new();
    let mut pending = vec![dir.to_owned()];

    while let Some(current) = pending.pop() {
        for entry in children(session, &current)? {
            let full = path::join(&current, &entry.name);
            match (recursive, entry.is_dir) {
                (true, true) => pending.push(full),
                (true, false) | (false, _) => out.push(full),
            }
        }
    }

    out.sort();
    Ok(out)
}

fn stat_entry(session: &mut dyn FtpSession, target: &str) -> Result<FileStat, StorageError> {
    if target.is_empty() || session.is_dir(target)? {
        return Ok(FileStat { path: target.to_owned(), size: 0, is_dir: true, modified: None });
    }
    let size = session.size(target)?;
    Ok(FileStat { path: target.to_owned(), size, is_dir: false, modified: None })
}

#[async_trait]
impl Backend for FtpBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Ftp
    }

    async fn initialize(&self, config: &BackendConfig) -> Result<(), StorageError> {
        let settings = FtpSettings::from_config(config)?;
        info!(
            backend = %self.id,
            host = %settings.host,
            port = settings.port,
            pool_size = settings.pool_size,
            "FTP backend initialized"
        );

        let pool = SessionPool {
            connector: Arc::clone(&self.connector),
            settings,
            idle: Mutex::new(Vec::new()),
        };
        *self.pool.write() = Some(Arc::new(pool));
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let target = Self::file_path(path)?;
        self.run(move |session| session.retrieve(&target)).await
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        let target = Self::file_path(path)?;
        let content: Arc<[u8]> = Arc::from(content);

        self.run(move |session| {
            make_parents(session, &target)?;
            session.store(&target, &content)
        })
        .await?;

        debug!(backend = %self.id, path = %path::normalize(path), "FTP upload complete");
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let target = Self::file_path(path)?;
        self.run(move |session| session.remove(&target)).await
    }

    async fn list(&self, dir: &str, recursive: bool) -> Result<Vec<String>, StorageError> {
        let dir = path::resolve_relative(dir)?;
        self.run(move |session| walk(session, &dir, recursive)).await
    }

    async fn test_connection(&self) -> Result<bool, StorageError> {
        match self.run(|session| session.noop()).await {
            Ok(()) => Ok(true),
            Err(err @ StorageError::NotInitialized { .. }) => Err(err),
            Err(err) => {
                warn!(backend = %self.id, error = %err, "FTP connection test failed");
                Ok(false)
            },
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(StorageError::FileNotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn stat(&self, path: &str) -> Result<FileStat, StorageError> {
        let target = path::resolve_relative(path)?;
        self.run(move |session| stat_entry(session, &target)).await
    }
}
