//! Structured logging setup.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

/// Output encoding of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per line, with thread ids and source locations
    Json,
}

#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// `EnvFilter` directives, e.g. `info,worker=debug`
    pub filter: String,
    pub format: LogFormat,
    /// Also log span open and close
    pub span_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Text,
            span_events: false,
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

impl TracingConfig {
    /// `RUST_LOG` for the filter, `LOG_JSON` and `LOG_SPANS` as `1`/`true` flags.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            filter: std::env::var("RUST_LOG").unwrap_or(defaults.filter),
            format: if env_flag("LOG_JSON") {
                LogFormat::Json
            } else {
                LogFormat::Text
            },
            span_events: env_flag("LOG_SPANS"),
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn try_init_tracing(config: &TracingConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let spans = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_span_events(spans)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_span_events(spans).with_target(true))
            .try_init(),
    }
}

/// Install the subscriber from the environment. Later calls are no-ops.
pub fn init_tracing_from_env() {
    let config = TracingConfig::from_env();
    if try_init_tracing(&config).is_ok() {
        tracing::info!(filter = %config.filter, format = ?config.format, "Tracing initialized");
    }
}
