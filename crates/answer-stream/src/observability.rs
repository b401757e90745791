//! Process-wide `tracing` subscriber setup for binaries.
//!
//! The library itself only emits events; embedding applications that already
//! install a subscriber should not call [`init_observability`].

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const ENABLED_VAR: &str = "ANSWER_STREAM_OBSERVABILITY_ENABLED";
const LEVEL_VAR: &str = "ANSWER_STREAM_LOG_LEVEL";
const JSON_PATH_VAR: &str = "ANSWER_STREAM_JSON_LOG_PATH";

static INIT: OnceCell<()> = OnceCell::new();

/// Where log records go.
#[derive(Clone, Debug, PartialEq, Eq)]
enum LogSink {
    Disabled,
    /// Compact lines on stderr; stdout is reserved for answers.
    Console,
    /// One JSON object per line, appended to this file.
    JsonFile(PathBuf),
}

impl LogSink {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup(ENABLED_VAR).is_none_or(|value| {
            !matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "no" | "off" | "disabled"
            )
        });
        if !enabled {
            return Self::Disabled;
        }
        match lookup(JSON_PATH_VAR) {
            Some(path) if !path.trim().is_empty() => Self::JsonFile(PathBuf::from(path.trim())),
            _ => Self::Console,
        }
    }
}

fn env_filter(lookup: impl Fn(&str) -> Option<String>, default_level: &str) -> EnvFilter {
    lookup(LEVEL_VAR)
        .and_then(|level| EnvFilter::try_new(level).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_level))
}

fn json_file_writer(path: &Path) -> Result<RollingFileAppender, String> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| format!("log path {} has no file name", path.display()))?;
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("failed to create log directory {}: {e}", dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .map_err(|e| format!("failed to open log file {}: {e}", path.display()))
}

fn init_console(filter: EnvFilter) {
    let console = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .try_init();
}

/// Installs the global subscriber once per process.
///
/// Environment variables:
/// - `ANSWER_STREAM_OBSERVABILITY_ENABLED`: `0`/`false`/`off` turns logging off.
/// - `ANSWER_STREAM_LOG_LEVEL`: filter directive, then `RUST_LOG`, then `default_level`.
/// - `ANSWER_STREAM_JSON_LOG_PATH`: write JSONL to this file instead of stderr.
///
/// If the log file cannot be opened, logs go to stderr and the failure is
/// reported as the first warning.
pub fn init_observability(default_level: &str) {
    INIT.get_or_init(|| {
        let lookup = |key: &str| std::env::var(key).ok();
        let filter = env_filter(lookup, default_level);
        match LogSink::from_lookup(lookup) {
            LogSink::Disabled => {}
            LogSink::Console => init_console(filter),
            LogSink::JsonFile(path) => match json_file_writer(&path) {
                Ok(writer) => {
                    let json = tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(false)
                        .with_writer(writer);
                    let _ = tracing_subscriber::registry()
                        .with(filter)
                        .with(json)
                        .try_init();
                }
                Err(reason) => {
                    init_console(filter);
                    tracing::warn!(%reason, "JSON log file unavailable, logging to stderr");
                }
            },
        }
    });
}
