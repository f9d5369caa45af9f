//! Tracing subscriber setup for gemgate.
//!
//! The server calls [`init_subscriber`] once at startup with the `logging`
//! section of its configuration. `RUST_LOG`, when set, takes precedence over
//! the configured level.

use serde::{Deserialize, Serialize};
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt::MakeWriter, prelude::*, registry, EnvFilter};

/// Output encoding for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

/// Where log lines are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Console,
    File,
    Both,
    None,
}

/// Logging section of the server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `gemgate_server=debug`
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub output: LogOutput,
    /// Base path of the daily rolling log file
    #[serde(default = "default_file_path")]
    pub file_path: PathBuf,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_file_path() -> PathBuf {
    PathBuf::from("/tmp/gemgate.log")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            file_path: default_file_path(),
        }
    }
}

impl LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set. Noisy transport
    /// crates are capped at `warn`.
    pub fn directive(&self) -> String {
        format!("{},hyper=warn,tokio=warn,reqwest=warn", self.level)
    }

    fn log_dir(&self) -> &Path {
        self.file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("/tmp"))
    }

    fn log_file_name(&self) -> &std::ffi::OsStr {
        self.file_path
            .file_name()
            .unwrap_or_else(|| "gemgate.log".as_ref())
    }
}

// Writes every buffer to both inner writers.
struct Tee<A, B> {
    a: A,
    b: B,
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res_a = self.a.write_all(buf);
        let res_b = self.b.write_all(buf);
        res_a.and(res_b).map(|_| buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.a.flush()?;
        self.b.flush()
    }
}

#[derive(Clone)]
struct MakeTee<A, B> {
    make_a: A,
    make_b: B,
}

impl<'a, A, B> MakeWriter<'a> for MakeTee<A, B>
where
    A: MakeWriter<'a>,
    B: MakeWriter<'a>,
{
    type Writer = Tee<A::Writer, B::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        Tee {
            a: self.make_a.make_writer(),
            b: self.make_b.make_writer(),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Returns the appender guard when file output is enabled; the caller must
/// keep it alive for the lifetime of the process or buffered lines are lost.
pub fn init_subscriber(config: &LoggingConfig) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directive()));
    let subscriber = registry().with(env_filter);
    let is_json = config.format == LogFormat::Json;

    match config.output {
        LogOutput::None => {
            subscriber.init();
            None
        }
        LogOutput::Console => {
            let layer = tracing_subscriber::fmt::layer().with_writer(io::stdout);
            if is_json {
                subscriber.with(layer.json()).init();
            } else {
                subscriber.with(layer).init();
            }
            None
        }
        LogOutput::File => {
            let appender =
                tracing_appender::rolling::daily(config.log_dir(), config.log_file_name());
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking);
            if is_json {
                subscriber.with(layer.json()).init();
            } else {
                subscriber.with(layer).init();
            }
            Some(guard)
        }
        LogOutput::Both => {
            let appender =
                tracing_appender::rolling::daily(config.log_dir(), config.log_file_name());
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let tee = MakeTee {
                make_a: io::stdout,
                make_b: non_blocking,
            };
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(tee);
            if is_json {
                subscriber.with(layer.json()).init();
            } else {
                subscriber.with(layer).init();
            }
            Some(guard)
        }
    }
}
