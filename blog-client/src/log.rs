use std::io::{self, IsTerminal};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, prelude::*};

#[derive(Default, Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub enum Level {
    Silent,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> LevelFilter {
        match level {
            Level::Silent => LevelFilter::OFF,
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Info => LevelFilter::INFO,
            Level::Debug => LevelFilter::DEBUG,
        }
    }
}

/// How log lines are rendered on stderr.
#[derive(Default, Debug, Clone, Copy, Eq, PartialEq, clap::ValueEnum)]
pub enum LogFormat {
    /// One line per event.
    #[default]
    Full,
    /// Multi-line, human-oriented output.
    Pretty,
}

/// Install the global subscriber. `RUST_LOG` overrides `level`.
pub fn init_tracing(level: Level, log_format: LogFormat) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(level).into())
        .from_env_lossy();

    let stderr = io::stderr;
    let ansi = stderr().is_terminal();

    match log_format {
        LogFormat::Full => {
            let stderr_layer = tracing_subscriber::fmt::layer()
                .with_writer(stderr)
                .with_ansi(ansi);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
        }
        LogFormat::Pretty => {
            let stderr_layer = tracing_subscriber::fmt::layer()
                .with_writer(stderr)
                .with_ansi(ansi)
                .pretty();
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_map_to_filters() {
        assert_eq!(LevelFilter::from(Level::Silent), LevelFilter::OFF);
        assert_eq!(LevelFilter::from(Level::default()), LevelFilter::INFO);
        assert_eq!(LevelFilter::from(Level::Debug), LevelFilter::DEBUG);
        assert!(Level::Debug > Level::Warn);
    }
}
