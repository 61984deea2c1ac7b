//! Tracing initialisation for tests.
//!
//! Engine phase transitions are logged at `debug` and materialization
//! decisions at `trace`; [`init_test_tracing_at`] makes those visible for a
//! single investigation without exporting `RUST_LOG`.

use tracing_subscriber::EnvFilter;

/// Install a test-writer subscriber filtered by `RUST_LOG`, defaulting to
/// `info`. Later calls in the same process are ignored.
///
/// ```ignore
/// #[tokio::test]
/// async fn runs_entry() {
///     funclab_test_utils::tracing_setup::init_test_tracing();
///     // engine events now land in the captured test output
/// }
/// ```
pub fn init_test_tracing() {
    init_with_default("info");
}

/// Like [`init_test_tracing`], but with `level` as the fallback filter.
pub fn init_test_tracing_at(level: &str) {
    init_with_default(level);
}

fn init_with_default(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_target(false)
        .try_init();
}
