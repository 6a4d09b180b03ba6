//! Subscriber initialization.
//!
//! Filtering follows `RUST_LOG` (default `info`). Output is JSON unless
//! `STOCKLEDGER_LOG_FORMAT=pretty`.

use std::env;

use tracing_subscriber::EnvFilter;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn from_env() -> Self {
        Self::parse(env::var("STOCKLEDGER_LOG_FORMAT").ok().as_deref())
    }

    /// Anything other than `pretty` (case-insensitive) selects JSON.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

pub fn init(format: LogFormat) {
    init_with_writer(format, false);
}

/// Install the global subscriber. A second call leaves the first one in place.
pub fn init_with_writer(format: LogFormat, test_writer: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let _ = match (format, test_writer) {
        (LogFormat::Json, false) => builder.json().try_init(),
        (LogFormat::Json, true) => builder.json().with_test_writer().try_init(),
        (LogFormat::Pretty, false) => builder.pretty().try_init(),
        (LogFormat::Pretty, true) => builder.pretty().with_test_writer().try_init(),
    };
}
