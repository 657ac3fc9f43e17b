use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "agent-stream.logs.jsonl";

/// Where log records are written.
#[derive(Clone, Debug, PartialEq, Eq)]
enum LogOutput {
    /// Compact human-readable lines on stderr.
    Console,
    /// JSON lines appended to `dir/file_name`.
    JsonFile { dir: PathBuf, file_name: String },
}

/// Logging settings resolved from `AGENT_STREAM_*` variables.
#[derive(Clone, Debug, PartialEq, Eq)]
struct LogSettings {
    enabled: bool,
    /// Filter directive from `AGENT_STREAM_LOG_LEVEL`; `RUST_LOG` applies when unset.
    directive: Option<String>,
    output: LogOutput,
}

impl LogSettings {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = ["AGENT_STREAM_OBSERVABILITY_ENABLED", "AGENT_STREAM_OBSERVABILITY"]
            .into_iter()
            .find_map(&lookup)
            .is_none_or(|flag| parse_flag(&flag).unwrap_or(true));
        let directive = lookup("AGENT_STREAM_LOG_LEVEL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let output = log_output(lookup("AGENT_STREAM_JSON_LOG_PATH").as_deref());
        Self {
            enabled,
            directive,
            output,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        self.directive
            .as_deref()
            .and_then(|d| EnvFilter::try_new(d).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn log_output(json_log_path: Option<&str>) -> LogOutput {
    let Some(raw) = json_log_path.map(str::trim).filter(|p| !p.is_empty()) else {
        return LogOutput::Console;
    };
    let path = Path::new(raw);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE)
        .to_string();
    LogOutput::JsonFile { dir, file_name }
}

/// Installs the session log subscriber once per process.
///
/// `AGENT_STREAM_OBSERVABILITY_ENABLED=false` turns logging off.
/// `AGENT_STREAM_LOG_LEVEL` takes precedence over `RUST_LOG`; the default
/// level is `info`. With `AGENT_STREAM_JSON_LOG_PATH` set, session records go
/// to that file as JSON lines. Otherwise they go to stderr, leaving stdout to
/// the narrative.
pub fn init_observability() {
    INIT.get_or_init(|| {
        let settings = LogSettings::from_lookup(|key| std::env::var(key).ok());
        if !settings.enabled {
            return;
        }

        let (json_layer, console_layer) = match &settings.output {
            LogOutput::JsonFile { dir, file_name } => {
                let _ = std::fs::create_dir_all(dir);
                let layer = fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(false)
                    .with_writer(tracing_appender::rolling::never(dir, file_name));
                (Some(layer), None)
            }
            LogOutput::Console => {
                let layer = fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                (None, Some(layer))
            }
        };
        let _ = tracing_subscriber::registry()
            .with(settings.env_filter())
            .with(json_layer)
            .with(console_layer)
            .try_init();
    });
}
