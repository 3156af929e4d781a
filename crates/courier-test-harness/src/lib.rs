//! Test harness shared by the courier crates.
//!
//! Provides a wiremock-backed HTTP server with the response shapes courier
//! cares about (JSON, XML, redirects, sequences) and one-time tracing setup.

pub mod mocks;
pub mod setup;

pub use mocks::network::{responses, TestHttpServer};

use once_cell::sync::Lazy;
use tracing_subscriber::EnvFilter;

/// Initialize the test harness with tracing support.
pub fn init() {
    static INIT: Lazy<()> = Lazy::new(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,courier=debug"));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .try_init()
            .ok();
    });

    Lazy::force(&INIT);
}
