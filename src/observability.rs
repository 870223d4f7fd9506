//! Logging setup for the table server and the lifecycle events it emits.

use std::env;
use std::net::SocketAddr;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::dashboard::TABLE_ROUTES;

pub const LOG_LEVEL_ENV: &str = "PRODASH_LOG_LEVEL";
pub const LOG_FORMAT_ENV: &str = "PRODASH_LOG_FORMAT";
pub const LOG_TARGET_ENV: &str = "PRODASH_LOG_TARGET";

/// HTTP client internals are chatty at debug; keep them at warn unless asked for by target.
const QUIET_TARGETS: [&str; 3] = ["hyper", "reqwest", "h2"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "pretty" => Some(LogFormat::Pretty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// `EnvFilter` directive for this config. A level that already names targets is used as is.
    pub fn filter_directive(&self) -> String {
        if self.level.contains('=') {
            return self.level.clone();
        }
        let mut directive = self.level.clone();
        for target in QUIET_TARGETS {
            directive.push_str(&format!(",{target}=warn"));
        }
        directive
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub fn logging_config_from_env() -> LoggingConfig {
    logging_config_from_lookup(|key| env::var(key).ok())
}

/// Unset, blank or unparseable values keep their defaults.
fn logging_config_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> LoggingConfig {
    let defaults = LoggingConfig::default();
    LoggingConfig {
        level: lookup(LOG_LEVEL_ENV)
            .map(|level| level.trim().to_string())
            .filter(|level| !level.is_empty())
            .unwrap_or(defaults.level),
        format: lookup(LOG_FORMAT_ENV)
            .as_deref()
            .and_then(LogFormat::parse)
            .unwrap_or(defaults.format),
        include_target: lookup(LOG_TARGET_ENV)
            .as_deref()
            .and_then(parse_flag)
            .unwrap_or(defaults.include_target),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(config.filter_directive()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_ansi(config.format == LogFormat::Pretty);

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }
    Ok(())
}

pub fn log_app_start(config: &LoggingConfig) {
    info!(
        component = "table_server",
        event = "app.start",
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        log_format = ?config.format,
        include_target = config.include_target
    );
}

pub fn log_app_bind(bound_addr: SocketAddr) {
    info!(
        component = "table_server",
        event = "app.bind",
        bind_addr = %bound_addr,
        routes = %TABLE_ROUTES.join(",")
    );
}

/// Where the server gets its table data from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSelection<'a> {
    Demo { reason: &'a str },
    Live { api_base: &'a str, datasets_base: &'a str },
}

pub fn log_source_selected(selection: SourceSelection<'_>) {
    match selection {
        SourceSelection::Demo { reason } => info!(
            component = "table_server",
            event = "source.selected",
            source = "demo",
            reason
        ),
        SourceSelection::Live {
            api_base,
            datasets_base,
        } => info!(
            component = "table_server",
            event = "source.selected",
            source = "live",
            api_base,
            datasets_base
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> LoggingConfig {
        logging_config_from_lookup(|key| {
            vars.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.to_string())
        })
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        assert_eq!(config_from(&[]), LoggingConfig::default());
    }

    #[test]
    fn reads_level_format_and_target() {
        let cfg = config_from(&[
            (LOG_LEVEL_ENV, "debug"),
            (LOG_FORMAT_ENV, "json"),
            (LOG_TARGET_ENV, "false"),
        ]);

        assert_eq!(cfg.level, "debug");
        assert_eq!(cfg.format, LogFormat::Json);
        assert!(!cfg.include_target);
    }

    #[test]
    fn blank_or_invalid_values_keep_defaults() {
        let cfg = config_from(&[
            (LOG_LEVEL_ENV, "   "),
            (LOG_FORMAT_ENV, "yaml"),
            (LOG_TARGET_ENV, "maybe"),
        ]);
        assert_eq!(cfg, LoggingConfig::default());

        let cfg = config_from(&[(LOG_FORMAT_ENV, " PRETTY "), (LOG_TARGET_ENV, "on")]);
        assert_eq!(cfg, LoggingConfig::default());
    }

    #[test]
    fn filter_directive_quiets_http_clients() {
        let directive = LoggingConfig::default().filter_directive();
        assert_eq!(directive, "info,hyper=warn,reqwest=warn,h2=warn");

        let explicit = LoggingConfig {
            level: "warn,prodash_table=debug".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(explicit.filter_directive(), "warn,prodash_table=debug");
    }
}
