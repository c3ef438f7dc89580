//! Logger builder implementation

use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, fmt::writer::BoxMakeWriter, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::{Config, DisplayConfig, Format};
use crate::error::{LogError, LogResult};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
    test_writer: bool,
}

/// Outcome of an init call
///
/// Reports whether this call installed the global subscriber. The
/// subscriber stays installed for the rest of the process whether or not
/// the guard is kept.
#[derive(Debug)]
#[must_use = "check `is_installed` to learn whether this call installed the subscriber"]
pub struct LoggerGuard {
    installed: bool,
}

impl LoggerGuard {
    pub(crate) fn noop() -> Self {
        Self { installed: false }
    }

    /// Whether this guard installed the global subscriber
    pub fn is_installed(&self) -> bool {
        self.installed
    }
}

/// Apply the display switches shared by every format, then box the layer.
///
/// Dropping the timer changes the layer's type, so each arm boxes on its own.
macro_rules! finish_layer {
    ($layer:expr, $display:expr, $writer:expr) => {{
        let layer = $layer
            .with_writer($writer)
            .with_ansi($display.colors)
            .with_target($display.target)
            .with_file($display.source)
            .with_line_number($display.source)
            .with_thread_ids($display.thread_ids)
            .with_thread_names($display.thread_names);
        if $display.time {
            layer.boxed()
        } else {
            layer.without_time().boxed()
        }
    }};
}

fn make_fmt_layer(format: Format, display: &DisplayConfig, writer: BoxMakeWriter) -> BoxedLayer {
    match format {
        Format::Pretty => finish_layer!(fmt::layer().pretty(), display, writer),
        Format::Compact => finish_layer!(fmt::layer().compact(), display, writer),
        Format::Json => finish_layer!(fmt::layer().json(), display, writer),
    }
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self {
            config,
            test_writer: false,
        }
    }

    /// Route output through the libtest capture writer
    #[must_use]
    pub fn with_test_writer(mut self) -> Self {
        self.test_writer = true;
        self
    }

    /// Parse the configured filter without installing anything
    pub fn filter(&self) -> LogResult<EnvFilter> {
        EnvFilter::try_new(&self.config.level).map_err(|e| LogError::Filter {
            filter: self.config.level.clone(),
            reason: e.to_string(),
        })
    }

    /// Build and initialize the logger
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Filter string cannot be parsed
    /// - A global subscriber is already installed
    pub fn build(self) -> LogResult<LoggerGuard> {
        let filter = self.filter()?;
        let writer = if self.test_writer {
            BoxMakeWriter::new(fmt::TestWriter::new())
        } else {
            BoxMakeWriter::new(std::io::stderr)
        };
        let fmt_layer = make_fmt_layer(self.config.format, &self.config.display, writer);

        Registry::default()
            .with(fmt_layer.with_filter(filter))
            .try_init()
            .map_err(|e| LogError::Init(e.to_string()))?;

        Ok(LoggerGuard { installed: true })
    }
}
