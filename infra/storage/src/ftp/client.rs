use super::{FtpConnector, FtpEntry, FtpSession, FtpSettings};
use crate::error::StorageError;
use std::io::Cursor;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use suppaftp::list::File;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Status};
use tracing::{debug, trace};

/// Connects with the `suppaftp` blocking client in binary transfer mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct SuppaFtpConnector;

impl FtpConnector for SuppaFtpConnector {
    fn connect(&self, settings: &FtpSettings) -> Result<Box<dyn FtpSession>, StorageError> {
        let addr = resolve(settings)?;
        let mut stream = FtpStream::connect_timeout(addr, settings.connect_timeout)
            .map_err(|e| translate(e, &settings.host))?;

        stream
            .login(settings.username.as_str(), settings.password.as_str())
            .map_err(|e| translate(e, "login"))?;
        stream.transfer_type(FileType::Binary).map_err(|e| translate(e, "TYPE I"))?;

        debug!(host = %settings.host, port = settings.port, "FTP session opened");
        Ok(Box::new(SuppaSession { stream }))
    }
}

fn resolve(settings: &FtpSettings) -> Result<SocketAddr, StorageError> {
    (settings.host.as_str(), settings.port)
        .to_socket_addrs()
        .map_err(|e| StorageError::Connection {
            message: e.to_string().into(),
            context: Some(format!("Resolving {}:{}", settings.host, settings.port).into()),
        })?
        .next()
        .ok_or_else(|| StorageError::Connection {
            message: settings.host.clone().into(),
            context: Some("Host resolved to no address".into()),
        })
}

fn translate(err: FtpError, target: &str) -> StorageError {
    match err {
        FtpError::ConnectionError(source) => StorageError::Connection {
            message: source.to_string().into(),
            context: Some(target.to_owned().into()),
        },
        FtpError::UnexpectedResponse(resp) if matches!(resp.status, Status::FileUnavailable) => {
            StorageError::not_found(target.to_owned())
        },
        FtpError::UnexpectedResponse(resp) if matches!(resp.status, Status::NotLoggedIn) => {
            StorageError::AccessDenied {
                message: target.to_owned().into(),
                context: Some(String::from_utf8_lossy(&resp.body).trim().to_owned().into()),
            }
        },
        other => StorageError::Protocol {
            message: other.to_string().into(),
            context: Some(target.to_owned().into()),
        },
    }
}

struct SuppaSession {
    stream: FtpStream,
}

impl SuppaSession {
    fn dir_arg(dir: &str) -> &str {
        if dir.is_empty() { "." } else { dir }
    }
}

impl FtpSession for SuppaSession {
    fn retrieve(&mut self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.stream.retr_as_buffer(path).map(Cursor::into_inner).map_err(|e| translate(e, path))
    }

    fn store(&mut self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        let mut reader = Cursor::new(content);
        self.stream.put_file(path, &mut reader).map_err(|e| translate(e, path))?;
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        self.stream.rm(path).map_err(|e| translate(e, path))
    }

    fn make_dir(&mut self, path: &str) -> Result<(), StorageError> {
        self.stream.mkdir(path).map_err(|e| translate(e, path))
    }

    fn entries(&mut self, dir: &str) -> Result<Vec<FtpEntry>, StorageError> {
        let lines = self.stream.list(Some(Self::dir_arg(dir))).map_err(|e| translate(e, dir))?;

        Ok(lines
            .iter()
            .filter_map(|line| match File::from_str(line) {
                Ok(file) => Some(FtpEntry {
                    name: file.name().to_owned(),
                    is_dir: file.is_directory(),
                    size: file.size() as u64,
                }),
                Err(err) => {
                    trace!(line = %line, error = %err, "Skipping unparsable LIST line");
                    None
                },
            })
            .collect())
    }

    fn size(&mut self, path: &str) -> Result<u64, StorageError> {
        self.stream.size(path).map(|size| size as u64).map_err(|e| translate(e, path))
    }

    fn is_dir(&mut self, path: &str) -> Result<bool, StorageError> {
        let home = self.stream.pwd().map_err(|e| translate(e, "PWD"))?;
        match self.stream.cwd(Self::dir_arg(path)) {
            Ok(()) => {
                self.stream.cwd(home.as_str()).map_err(|e| translate(e, &home))?;
                Ok(true)
            },
            Err(FtpError::UnexpectedResponse(_)) => Ok(false),
            Err(err) => Err(translate(err, path)),
        }
    }

    fn noop(&mut self) -> Result<(), StorageError> {
        self.stream.noop().map_err(|e| translate(e, "NOOP"))
    }
}

impl Drop for SuppaSession {
    fn drop(&mut self) {
        if let Err(err) = self.stream.quit() {
            trace!(error = %err, "FTP QUIT failed");
        }
    }
}
