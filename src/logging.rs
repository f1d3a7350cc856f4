//! Tracing subscriber setup for the library and the CLI
//!
//! The filter comes from `NOTEMIND_LOG`, then `RUST_LOG`, then
//! [`DEFAULT_FILTER`]: engine events at `info`, HTTP traces at `info`,
//! everything else at `warn`. `NOTEMIND_LOG_JSON=1` emits one JSON object per
//! event. Output always goes to stderr so CLI JSON on stdout stays clean.

use tracing_subscriber::{fmt, EnvFilter};

pub const DEFAULT_FILTER: &str = "warn,notemind=info,tower_http=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match std::env::var("NOTEMIND_LOG_JSON").as_deref() {
            Ok("1") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// First non-blank of the two overrides, else the default.
fn directives(notemind_log: Option<String>, rust_log: Option<String>) -> String {
    notemind_log
        .into_iter()
        .chain(rust_log)
        .find(|d| !d.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

fn filter() -> EnvFilter {
    let wanted = directives(std::env::var("NOTEMIND_LOG").ok(), std::env::var("RUST_LOG").ok());
    EnvFilter::try_new(&wanted).unwrap_or_else(|e| {
        eprintln!("ignoring log filter '{}': {}", wanted, e);
        EnvFilter::new(DEFAULT_FILTER)
    })
}

pub fn init_logging() { init_with(LogFormat::from_env()) }

/// Installs the global subscriber. Later calls are no-ops.
pub fn init_with(format: LogFormat) {
    let builder = fmt::Subscriber::builder().with_env_filter(filter()).with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}
