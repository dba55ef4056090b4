//! Global `tracing` subscriber for filegate services.
//!
//! Output goes to the console, to rolling files in a log directory, or both. Files are
//! written through non-blocking workers whose guards live in the returned [`Logger`].
//!
//! Records the gateway fails to persist in its audit store are emitted on the
//! [`AUDIT_FALLBACK_TARGET`] target. When a log directory is configured they can also be
//! routed to a dedicated `<name>-audit` JSON file, so they can be replayed later.
//!
//! ```rust
//! use filegate_logger::{LevelFilter, LogFormat, Logger};
//!
//! let _logger = Logger::builder()
//!     .name("filegate")
//!     .level(LevelFilter::DEBUG)
//!     .format(LogFormat::Pretty)
//!     .init()
//!     .unwrap();
//! ```
//!
//! Services reading a configuration file use [`Logger::from_settings`] instead.

mod error;
mod settings;

pub use crate::error::{LoggerError, LoggerErrorExt};
pub use crate::settings::{LogFormat, LogRotation, LoggerSettings};
pub use tracing::level_filters::LevelFilter;

use private::Sealed;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::Subscriber;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::filter::{Directive, Targets};
use tracing_subscriber::fmt::{MakeWriter, layer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Tracing target receiving audit records whose persistence failed.
pub const AUDIT_FALLBACK_TARGET: &str = "filegate::audit_fallback";

const LOG_FILE_SUFFIX: &str = "log";
const AUDIT_FILE_INFIX: &str = "audit";

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

#[derive(Debug)]
struct Options {
    console: bool,
    directory: Option<PathBuf>,
    level: LevelFilter,
    format: LogFormat,
    rotation: LogRotation,
    max_files: usize,
    audit_fallback: bool,
    filter: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        let defaults = LoggerSettings::default();
        Self {
            console: defaults.console,
            directory: None,
            level: LevelFilter::INFO,
            format: defaults.format,
            rotation: defaults.rotation,
            max_files: defaults.max_files,
            audit_fallback: false,
            filter: None,
        }
    }
}

#[derive(Debug)]
pub struct Unnamed;
#[derive(Debug)]
pub struct Named(String);
#[derive(Debug)]
pub struct ConsoleOnly;
#[derive(Debug)]
pub struct WithDirectory;

mod private {
    pub trait Sealed {}
}
impl Sealed for Unnamed {}
impl Sealed for Named {}
impl Sealed for ConsoleOnly {}
impl Sealed for WithDirectory {}

/// Typestate builder of the global subscriber: a name is required before `init`, file
/// options only exist once a directory is set.
#[derive(Debug)]
pub struct LoggerBuilder<N: Sealed = Unnamed, D: Sealed = ConsoleOnly> {
    options: Options,
    name: N,
    output: PhantomData<D>,
}

impl<D: Sealed> LoggerBuilder<Unnamed, D> {
    /// Sets the name used as the rolling file prefix.
    pub fn name(self, name: impl Into<String>) -> LoggerBuilder<Named, D> {
        LoggerBuilder { options: self.options, name: Named(name.into()), output: PhantomData }
    }
}

impl LoggerBuilder<Named, WithDirectory> {
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub const fn max_files(mut self, max: usize) -> Self {
        self.options.max_files = max;
        self
    }

    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub const fn rotation(mut self, rotation: LogRotation) -> Self {
        self.options.rotation = rotation;
        self
    }

    /// Also writes [`AUDIT_FALLBACK_TARGET`] events to a `<name>-audit` JSON file.
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub const fn audit_fallback(mut self, enabled: bool) -> Self {
        self.options.audit_fallback = enabled;
        self
    }
}

impl<D: Sealed> LoggerBuilder<Named, D> {
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub const fn level(mut self, level: LevelFilter) -> Self {
        self.options.level = level;
        self
    }

    /// Per-module directives such as `filegate_storage=debug`.
    ///
    /// Replaces `RUST_LOG`. Invalid directives make [`LoggerBuilder::init`] fail.
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub fn filter(mut self, directives: impl Into<String>) -> Self {
        self.options.filter = Some(directives.into());
        self
    }

    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub const fn console(mut self, enabled: bool) -> Self {
        self.options.console = enabled;
        self
    }

    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub const fn format(mut self, format: LogFormat) -> Self {
        self.options.format = format;
        self
    }

    /// Enables rolling file output into `directory`, created on `init` if missing.
    pub fn directory(self, directory: impl Into<PathBuf>) -> LoggerBuilder<Named, WithDirectory> {
        let mut options = self.options;
        options.directory = Some(directory.into());
        LoggerBuilder { options, name: self.name, output: PhantomData }
    }

    /// Installs the global subscriber.
    ///
    /// Keep the returned [`Logger`] alive for the lifetime of the process; dropping it
    /// stops the file writers.
    ///
    /// # Errors
    /// - [`LoggerError::InvalidConfiguration`] for a blank name, zero `max_files`, bad
    ///   filter directives or when no output is enabled.
    /// - [`LoggerError::Subscriber`] if a global subscriber is already installed.
    pub fn init(self) -> Result<Logger, LoggerError> {
        let name = self.name.0;
        let options = self.options;
        validate(&options, &name)?;

        let env_filter = env_filter(&options)?;
        let mut layers = Vec::new();
        let mut guards = Vec::new();

        if options.console {
            layers.push(formatted(std::io::stdout, true, options.format));
        }

        if let Some(directory) = &options.directory {
            std::fs::create_dir_all(directory)
                .context(format!("Failed to create log directory {}", directory.display()))?;

            let (writer, guard) = rolling_writer(&options, directory, &name)?;
            guards.push(guard);
            layers.push(formatted(writer, false, options.format));

            if options.audit_fallback {
                let (writer, guard) =
                    rolling_writer(&options, directory, &format!("{name}-{AUDIT_FILE_INFIX}"))?;
                guards.push(guard);
                let only_audit = Targets::new().with_target(AUDIT_FALLBACK_TARGET, LevelFilter::TRACE);
                layers.push(
                    layer().json().with_writer(writer).with_ansi(false).with_filter(only_audit).boxed(),
                );
            }
        }

        if layers.is_empty() {
            return Err(LoggerError::InvalidConfiguration {
                message: "No output enabled; enable the console or set a directory".into(),
                context: None,
            });
        }

        tracing_subscriber::registry().with(env_filter).with(layers).try_init()?;
        tracing::debug!(logger = %name, files = guards.len(), "Logger initialized");

        Ok(Logger { guards })
    }
}

fn formatted<S, W>(writer: W, ansi: bool, format: LogFormat) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let base = layer().with_writer(writer);
    match format {
        LogFormat::Compact => base.with_ansi(ansi).compact().boxed(),
        LogFormat::Pretty => base.with_ansi(ansi).pretty().boxed(),
        LogFormat::Json => base.with_ansi(false).json().boxed(),
    }
}

fn rolling_writer(
    options: &Options,
    directory: &Path,
    prefix: &str,
) -> Result<(NonBlocking, WorkerGuard), LoggerError> {
    let appender = RollingFileAppender::builder()
        .rotation(options.rotation.into())
        .filename_prefix(prefix)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(options.max_files)
        .build(directory)?;

    Ok(tracing_appender::non_blocking(appender))
}

fn validate(options: &Options, name: &str) -> Result<(), LoggerError> {
    if name.trim().is_empty() {
        return Err(LoggerError::InvalidConfiguration {
            message: "Logger name cannot be empty".into(),
            context: None,
        });
    }
    if options.max_files == 0 {
        return Err(LoggerError::InvalidConfiguration {
            message: "max_files must be greater than zero".into(),
            context: None,
        });
    }
    Ok(())
}

/// Level and per-module directives, plus a fixed directive that keeps
/// [`AUDIT_FALLBACK_TARGET`] warnings enabled whatever the configured level.
fn env_filter(options: &Options) -> Result<EnvFilter, LoggerError> {
    let builder = EnvFilter::builder().with_default_directive(options.level.into());
    let filter = match &options.filter {
        Some(directives) => builder.parse(directives).map_err(|e| LoggerError::InvalidConfiguration {
            message: format!("Invalid filter '{directives}': {e}").into(),
            context: None,
        })?,
        None => builder.from_env_lossy(),
    };

    let audit: Directive = format!("{AUDIT_FALLBACK_TARGET}=warn").parse().map_err(|e| {
        LoggerError::InvalidConfiguration { message: format!("Invalid audit directive: {e}").into(), context: None }
    })?;
    Ok(filter.add_directive(audit))
}

/// Handle to the installed subscriber; owns the file writers' worker guards.
#[must_use = "Dropping this handle will stop background logging threads."]
#[derive(Debug)]
pub struct Logger {
    guards: Vec<WorkerGuard>,
}

impl Logger {
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder { options: Options::default(), name: Unnamed, output: PhantomData }
    }

    /// Installs the global subscriber described by `settings`.
    ///
    /// # Errors
    /// Same as [`LoggerBuilder::init`], plus [`LoggerError::InvalidConfiguration`] for an
    /// unknown `level`.
    pub fn from_settings(settings: &LoggerSettings) -> Result<Self, LoggerError> {
        let level: LevelFilter = settings.level.parse().map_err(|_| LoggerError::InvalidConfiguration {
            message: format!("Unknown log level '{}'", settings.level).into(),
            context: None,
        })?;

        let mut builder = Self::builder()
            .name(settings.name.as_str())
            .level(level)
            .console(settings.console)
            .format(settings.format);
        if let Some(filter) = &settings.filter {
            builder = builder.filter(filter.as_str());
        }

        match &settings.directory {
            Some(directory) => builder
                .directory(directory)
                .rotation(settings.rotation)
                .max_files(settings.max_files)
                .audit_fallback(settings.audit_fallback)
                .init(),
            None => builder.init(),
        }
    }

    /// Worker guards of the file writers, one per file.
    #[must_use]
    pub fn guards(&self) -> &[WorkerGuard] {
        &self.guards
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        if !self.guards.is_empty() {
            tracing::info!("Logging system shutting down, flushing buffers...");
        }
    }
}
