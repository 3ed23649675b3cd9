//! stderr tracing for the server process.
//!
//! `--log-level` is either a bare level, applied to this crate and the HTTP
//! trace layer, or a comma-separated directive list such as
//! `warn,gitsync::scheduler=debug` for narrowing in on one subsystem.

use std::str::FromStr;

use anyhow::{Context, Result};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Targets the bare-level form applies to. Everything else stays at WARN.
const APP_TARGETS: &[&str] = &["gitsync", "tower_http"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

pub fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    let filter = log_filter(level)?;

    let init_result = match format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_filter(filter);

            tracing_subscriber::registry().with(fmt_layer).try_init()
        }
        LogFormat::Text => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_filter(filter);

            tracing_subscriber::registry().with(fmt_layer).try_init()
        }
    };

    // Tests in one process share the global dispatcher.
    if let Err(err) = init_result {
        let msg = err.to_string();
        if msg.contains("global default trace dispatcher has already been set") {
            return Ok(());
        }
        return Err(err.into());
    }

    Ok(())
}

/// Build the target filter for `--log-level`.
///
/// Anything without `=` or `,` is read as a bare level; unknown names fall
/// back to INFO. Directive lists go through `Targets` parsing and are
/// rejected when malformed.
pub fn log_filter(spec: &str) -> Result<Targets> {
    let spec = spec.trim();
    if !spec.contains(['=', ',']) {
        let level = parse_level(spec);
        let targets = APP_TARGETS
            .iter()
            .fold(Targets::new(), |targets, target| {
                targets.with_target(*target, level)
            });
        return Ok(targets.with_default(LevelFilter::WARN));
    }

    Targets::from_str(spec).with_context(|| format!("invalid log directives '{spec}'"))
}

fn parse_level(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" | "warning" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(parse_level("WARNING"), LevelFilter::WARN);
        assert_eq!(parse_level("loud"), LevelFilter::INFO);

        let filter = log_filter(" loud ").unwrap();
        assert!(filter.would_enable("gitsync::server", &Level::INFO));
        assert!(!filter.would_enable("gitsync::server", &Level::DEBUG));
    }

    #[test]
    fn bare_level_covers_app_and_http_targets_only() {
        let filter = log_filter("debug").unwrap();
        assert!(filter.would_enable("gitsync::git", &Level::DEBUG));
        assert!(filter.would_enable("tower_http::trace", &Level::DEBUG));
        assert!(!filter.would_enable("hyper::proto", &Level::INFO));
        assert!(filter.would_enable("hyper::proto", &Level::WARN));
    }

    #[test]
    fn directives_narrow_to_one_subsystem() {
        let filter = log_filter("warn,gitsync::scheduler=debug").unwrap();
        assert!(filter.would_enable("gitsync::scheduler", &Level::DEBUG));
        assert!(!filter.would_enable("gitsync::git", &Level::INFO));
        assert!(filter.would_enable("gitsync::git", &Level::WARN));
    }

    #[test]
    fn malformed_directives_are_rejected() {
        let err = log_filter("gitsync=loud").unwrap_err();
        assert!(err.to_string().contains("gitsync=loud"));
    }

    #[test]
    fn repeated_init_is_tolerated() {
        init_tracing("info", LogFormat::Text).unwrap();
        init_tracing("gitsync=debug", LogFormat::Json).unwrap();
    }
}
