#![forbid(unsafe_code)]

//! Test harness for the weft workspace: a deterministic scenario driver and
//! the reference patterns the end-to-end suites are written against.
//!
//! Everything here is single-threaded and fully deterministic; a scenario
//! replayed twice produces the same tick sequence, the same resolution
//! order, and the same step reports.

pub mod fixtures;
pub mod scenario;

pub use fixtures::{WishHandle, counter_pattern, publisher_pattern, wisher_pattern};
pub use scenario::Scenario;

/// Install the process-wide tracing subscriber, filtered by `RUST_LOG`.
///
/// Idempotent: later calls (and any subscriber installed by the embedding
/// process first) win silently. Every [`Scenario`] calls this, so suites
/// driven through the harness get env-filtered logs without their own
/// setup.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_tracing_is_idempotent() {
        super::init_tracing();
        super::init_tracing();
    }
}
