//! Tracing/logging setup shared by every entry point.

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use self::tracing::LogFormat;

/// Initialize process-wide logging with the defaults (`info`, JSON).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init("info", LogFormat::Json);
}

/// Initialize process-wide logging with an explicit filter and format.
///
/// `RUST_LOG` still wins over `default_filter` when it is set.
pub fn init_with(default_filter: &str, format: LogFormat) {
    tracing::init(default_filter, format);
}
