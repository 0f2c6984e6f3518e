//! Process-wide tracing setup for the control plane binaries.
//!
//! Configuration comes from the environment:
//! - `RUST_LOG` (full filter syntax) or `LOG_LEVEL` (default `info`)
//! - `LOG_FORMAT`: `human` (default) or `json`
//! - `LOG_OUTPUT`: `console` (default), `file`, `both` or `none`
//! - `LOG_FILE_PATH`: file written with daily rotation (default `/tmp/cloud-ide.log`)

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{Directive, ParseError};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{prelude::*, registry, EnvFilter, Layer, Registry};

const DEFAULT_LOG_FILE: &str = "/tmp/cloud-ide.log";

/// Chatty dependencies capped at `warn` unless `RUST_LOG` says otherwise.
const QUIET_TARGETS: [&str; 4] = ["hyper=warn", "h2=warn", "tower=warn", "sqlx=warn"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Raw `RUST_LOG` value; takes precedence over `level`.
    pub filter: Option<String>,
    pub level: String,
    pub format: LogFormat,
    pub output: LogOutput,
    pub file_path: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: None,
            level: "info".to_string(),
            format: LogFormat::Human,
            output: LogOutput::Console,
            file_path: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unknown values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let format = match get("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Human,
        };
        let output = match get("LOG_OUTPUT").as_deref() {
            Some("file") => LogOutput::File,
            Some("both") => LogOutput::Both,
            Some("none") => LogOutput::None,
            _ => LogOutput::Console,
        };

        Self {
            filter: get("RUST_LOG"),
            level: get("LOG_LEVEL").unwrap_or(defaults.level),
            format,
            output,
            file_path: get("LOG_FILE_PATH").map(PathBuf::from).unwrap_or(defaults.file_path),
        }
    }

    fn env_filter(&self) -> Result<EnvFilter, LogInitError> {
        let base = self.filter.as_deref().unwrap_or(&self.level);
        let mut filter = EnvFilter::try_new(base).map_err(|e| LogInitError::Filter(e.to_string()))?;
        if self.filter.is_none() {
            for target in QUIET_TARGETS {
                filter = filter.add_directive(target.parse::<Directive>()?);
            }
        }
        Ok(filter)
    }

    fn file_location(&self) -> (&Path, &Path) {
        let dir = self
            .file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = self
            .file_path
            .file_name()
            .map(Path::new)
            .unwrap_or_else(|| Path::new("cloud-ide.log"));
        (dir, name)
    }
}

#[derive(Error, Debug)]
pub enum LogInitError {
    #[error("invalid log filter: {0}")]
    Filter(String),

    #[error("invalid log directive: {0}")]
    Directive(#[from] ParseError),

    #[error("a global subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] TryInitError),
}

/// Writes every line to both sinks; succeeds if either does.
struct Tee<A, B> {
    first: A,
    second: B,
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let first = self.first.write(buf);
        let second = self.second.write(buf);
        first.or(second)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.first.flush()?;
        self.second.flush()
    }
}

struct MakeTee<A, B> {
    first: A,
    second: B,
}

impl<'a, A, B> MakeWriter<'a> for MakeTee<A, B>
where
    A: MakeWriter<'a>,
    B: MakeWriter<'a>,
{
    type Writer = Tee<A::Writer, B::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        Tee {
            first: self.first.make_writer(),
            second: self.second.make_writer(),
        }
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must live as long as
/// the process logs to a file.
pub fn init_subscriber(config: &LogConfig) -> Result<Option<WorkerGuard>, LogInitError> {
    let filter = config.env_filter()?;

    let mut guard = None;
    let mut file_writer = || {
        let (dir, name) = config.file_location();
        let (writer, g) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));
        guard = Some(g);
        writer
    };

    let writer = match config.output {
        LogOutput::None => {
            registry().with(filter).try_init()?;
            return Ok(None);
        }
        LogOutput::Console => BoxMakeWriter::new(io::stdout),
        LogOutput::File => BoxMakeWriter::new(file_writer()),
        LogOutput::Both => BoxMakeWriter::new(MakeTee {
            first: io::stdout,
            second: file_writer(),
        }),
    };

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(writer);
    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => fmt_layer.json().boxed(),
        LogFormat::Human => fmt_layer.pretty().boxed(),
    };

    registry().with(fmt_layer).with(filter).try_init()?;

    Ok(guard)
}
