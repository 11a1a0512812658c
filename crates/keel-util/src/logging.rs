//! Tracing subscriber setup for binaries and test harnesses embedding Keel.

use tracing_subscriber::EnvFilter;

/// Install a formatted tracing subscriber filtered by `RUST_LOG`.
///
/// `default_directive` applies when `RUST_LOG` is unset (e.g. `"keel_engine=debug"`).
/// Installing a second subscriber is a no-op, so this is safe to call from
/// every test.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_harmless() {
        init("keel_util=debug");
        init("keel_util=trace");
        tracing::debug!("subscriber installed");
    }
}
