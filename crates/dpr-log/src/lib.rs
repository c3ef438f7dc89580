//! # dpr-log
//!
//! Logging bootstrap for processes that host libdpr workers.
//!
//! `libdpr` itself only emits `tracing` events; binaries and test suites use
//! this crate to install a subscriber.
//!
//! ```rust,no_run
//! fn main() -> dpr_log::LogResult<()> {
//!     let _guard = dpr_log::auto_init()?;
//!     tracing::info!(worker = 7, "worker starting");
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod builder;
mod config;
mod error;

pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, DisplayConfig, Format};
pub use error::{LogError, LogResult};

static TEST_INIT: std::sync::Once = std::sync::Once::new();

/// Auto-detect and initialize the best logging configuration
///
/// Uses [`Config::from_env`] when `DPR_LOG` or `RUST_LOG` is set, otherwise
/// the development preset in debug builds and the production preset in
/// release builds.
pub fn auto_init() -> LogResult<LoggerGuard> {
    if std::env::var("DPR_LOG").is_ok() || std::env::var("RUST_LOG").is_ok() {
        init_with(Config::from_env())
    } else if cfg!(debug_assertions) {
        init_with(Config::development())
    } else {
        init_with(Config::production())
    }
}

/// Initialize with default configuration
pub fn init() -> LogResult<LoggerGuard> {
    init_with(Config::default())
}

/// Initialize with custom configuration
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}

/// Initialize for tests
///
/// Safe to call from every test: only the first call installs a subscriber,
/// later calls (or calls after another subscriber was installed) return a
/// no-op guard.
pub fn init_test() -> LoggerGuard {
    let mut guard = LoggerGuard::noop();
    TEST_INIT.call_once(|| {
        if tracing::dispatcher::has_been_set() {
            return;
        }
        if let Ok(installed) = LoggerBuilder::from_config(Config::test())
            .with_test_writer()
            .build()
        {
            guard = installed;
        }
    });
    guard
}
