//! Tracing and logging setup shared by every stockledger binary and test suite.

/// Initialize process-wide logging from the environment.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::from_env());
}

/// Initialize logging for tests: human-readable output captured by the test harness.
pub fn init_for_tests() {
    tracing::init_with_writer(tracing::LogFormat::Pretty, true);
}

/// Subscriber configuration (filters, formats).
pub mod tracing;
