use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct LogOptions {
    /// `-v` on the command line.
    pub verbose: bool,
    /// `--log-json` on the command line; ORed with `logging.json`.
    pub json: bool,
    /// Drop all output (the TUI owns the terminal).
    pub silent: bool,
}

/// `RUST_LOG` wins; otherwise the configured level, raised to `debug` by `-v`.
pub fn filter_directive(cfg: &LoggingConfig, verbose: bool) -> String {
    if let Ok(env) = std::env::var(EnvFilter::DEFAULT_ENV) {
        if !env.trim().is_empty() {
            return env;
        }
    }
    if verbose {
        return "debug".to_string();
    }
    let level = cfg.level.trim();
    if level.is_empty() {
        "info".to_string()
    } else {
        level.to_string()
    }
}

pub fn init(cfg: &LoggingConfig, opts: LogOptions) -> Result<()> {
    let directive = filter_directive(cfg, opts.verbose);
    let filter = EnvFilter::try_new(&directive)
        .map_err(|e| Error::config(format!("invalid log filter '{directive}': {e}")))?;

    let writer = if opts.silent {
        BoxMakeWriter::new(std::io::sink)
    } else {
        BoxMakeWriter::new(std::io::stderr)
    };

    let registry = tracing_subscriber::registry().with(filter);
    let res = if opts.json || cfg.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(writer),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(writer),
            )
            .try_init()
    };
    res.map_err(|e| Error::msg(format!("logging already initialised: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_raises_to_debug_when_env_unset() {
        if std::env::var(EnvFilter::DEFAULT_ENV).is_ok() {
            return;
        }
        let cfg = LoggingConfig {
            level: "warn".into(),
            json: false,
        };
        assert_eq!(filter_directive(&cfg, false), "warn");
        assert_eq!(filter_directive(&cfg, true), "debug");
    }
}
