//! Test-only `tracing-subscriber` wiring, matching the teacher's own
//! `tracing_subscriber::fmt().with_env_filter(...)` diagnostics setup in
//! `nclav-cli`'s `main`, pointed at the test harness's writer instead of a
//! binary's stdout so `RUST_LOG=debug cargo test -- --ignored` surfaces the
//! store's own `tracing` calls alongside each Postgres-backed test.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Initialize the subscriber once per test binary. Safe to call from every
/// test's connection helper; only the first call takes effect.
pub(crate) fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
