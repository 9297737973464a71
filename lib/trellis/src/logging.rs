// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Process-wide tracing setup.
//!
//! - Configuration is loaded from defaults, then the TOML file named by
//!   `TRELLIS_LOGGING_CONFIG_PATH` if set.
//! - `TRELLIS_LOG` holds filter directives and wins over the file.
//! - `TRELLIS_LOGGING_JSONL=1` switches to one JSON object per line.
//!
//! All output goes to stderr.
//!
//! ```toml
//! log_level = "warn"
//!
//! [log_filters]
//! "trellis_backend::tcp" = "debug"
//! ```

use std::collections::HashMap;
use std::sync::Once;

use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, filter::Directive, fmt};

/// ENV used to set filter directives
pub const FILTER_ENV: &str = "TRELLIS_LOG";

/// ENV naming an optional TOML logging configuration
pub const CONFIG_PATH_ENV: &str = "TRELLIS_LOGGING_CONFIG_PATH";

/// ENV selecting JSONL output
pub const JSONL_ENV: &str = "TRELLIS_LOGGING_JSONL";

const DEFAULT_FILTER_LEVEL: &str = "info";

static INIT: Once = Once::new();

/// Level and per-module filters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level for everything without a module filter.
    pub log_level: String,
    /// Module path to level.
    pub log_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_FILTER_LEVEL.to_string(),
            log_filters: HashMap::from([
                ("tokio_util".to_string(), "warn".to_string()),
                ("mio".to_string(), "warn".to_string()),
            ]),
        }
    }
}

impl LoggingConfig {
    /// Loads the configuration, falling back to defaults on a bad file.
    pub fn load() -> Self {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            figment = figment.merge(Toml::file(path));
        }
        figment.extract().unwrap_or_else(|e| {
            eprintln!("Invalid logging configuration, using defaults: {e}");
            Self::default()
        })
    }

    /// Builds the filter: config first, then directives from `TRELLIS_LOG`.
    pub fn filter(&self) -> EnvFilter {
        let default_directive = self
            .log_level
            .parse::<Directive>()
            .unwrap_or_else(|_| tracing::level_filters::LevelFilter::INFO.into());

        let mut filter = EnvFilter::builder()
            .with_default_directive(default_directive)
            .parse_lossy("");

        for (module, level) in &self.log_filters {
            match format!("{module}={level}").parse::<Directive>() {
                Ok(d) => filter = filter.add_directive(d),
                Err(e) => eprintln!("Failed parsing filter '{level}' for module '{module}': {e}"),
            }
        }

        if let Ok(directives) = std::env::var(FILTER_ENV) {
            for directive in directives.split(',').filter(|d| !d.trim().is_empty()) {
                match directive.trim().parse::<Directive>() {
                    Ok(d) => filter = filter.add_directive(d),
                    Err(e) => eprintln!("Ignoring {FILTER_ENV} directive '{directive}': {e}"),
                }
            }
        }
        filter
    }
}

fn jsonl_enabled() -> bool {
    std::env::var(JSONL_ENV)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "on" | "yes"))
        .unwrap_or(false)
}

/// Installs the global subscriber once. Later calls are no-ops, as is a
/// call after some other subscriber was installed.
pub fn init() {
    INIT.call_once(setup_logging);
}

fn setup_logging() {
    let filter = LoggingConfig::load().filter();
    // Each builder returns a distinct type, so the layers are set up twice.
    let result = if jsonl_enabled() {
        let l = fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .with_filter(filter);
        tracing_subscriber::registry().with(l).try_init()
    } else {
        let l = fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(filter);
        tracing_subscriber::registry().with(l).try_init()
    };
    if let Err(e) = result {
        eprintln!("Tracing subscriber not installed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_without_file() {
        temp_env::with_var_unset(CONFIG_PATH_ENV, || {
            let config = LoggingConfig::load();
            assert_eq!(config, LoggingConfig::default());
        });
    }

    #[test]
    fn file_overrides_level_and_adds_filters() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "log_level = \"warn\"\n\n[log_filters]\n\"trellis::graph\" = \"trace\"").unwrap();

        file.flush().unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some(file.path().as_os_str()), || {
            let config = LoggingConfig::load();
            assert_eq!(config.log_level, "warn");
            assert_eq!(config.log_filters.get("trellis::graph").map(String::as_str), Some("trace"));
        });
    }

    #[test]
    fn bad_directives_do_not_break_the_filter() {
        temp_env::with_var(FILTER_ENV, Some("trellis=debug,==nonsense=="), || {
            let config = LoggingConfig {
                log_level: "not-a-level".to_string(),
                log_filters: HashMap::new(),
            };
            let rendered = config.filter().to_string();
            assert!(rendered.contains("trellis=debug"), "{rendered}");
        });
    }

    #[test]
    fn jsonl_toggle() {
        temp_env::with_var(JSONL_ENV, Some("1"), || assert!(jsonl_enabled()));
        temp_env::with_var(JSONL_ENV, Some("no"), || assert!(!jsonl_enabled()));
        temp_env::with_var_unset(JSONL_ENV, || assert!(!jsonl_enabled()));
    }

    #[test]
    fn init_is_idempotent() {
        init();
        init();
        tracing::info!("logging initialised");
    }
}
