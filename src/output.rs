//! # Output Configuration
//!
//! This module controls how log lines look on the terminal: whether colors
//! and emoji markers are used, and which marker each line gets.
//!
//! ## Respecting User Preferences
//!
//! The module respects the following environment variables and flags:
//! - `--color=never|always|auto` - CLI flag for color control
//! - `NO_COLOR` - Disables colors when set (per https://no-color.org/)
//! - `CLICOLOR=0` - Disables colors
//! - `CLICOLOR_FORCE=1` - Forces colors even in non-TTY
//! - `TERM=dumb` - Disables colors for dumb terminals
//!
//! ## Status levels
//!
//! Log records map onto four user-facing levels: info, success, warning and
//! error. Success is an info record sent to the `SUCCESS_TARGET` log target:
//!
//! ```rust,ignore
//! log::info!(target: SUCCESS_TARGET, "[{}] Full archive written", name);
//! ```

use std::env;

use console::style;
use log::{Level, Record};

/// Log target marking an info record as a success line.
pub const SUCCESS_TARGET: &str = "repo_vault::success";

/// Output configuration for controlling colors and emojis.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Whether colors and emojis should be used in output.
    pub use_color: bool,
}

impl OutputConfig {
    /// Create an output configuration from environment and CLI flag.
    ///
    /// # Arguments
    /// * `color_flag` - The value of the --color CLI flag: "always", "never", or "auto"
    ///
    /// In auto mode, colors are disabled if:
    /// - `NO_COLOR` environment variable is set (any value, including empty)
    /// - `CLICOLOR=0` is set
    /// - `TERM=dumb` is set
    /// - stdout is not a TTY (unless `CLICOLOR_FORCE=1`)
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };

        Self { use_color }
    }

    /// Detect whether color output is supported based on environment.
    fn detect_color_support() -> bool {
        // The presence of the variable (even if empty) disables colors
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }

        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }

        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }

        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }

        console::Term::stdout().features().colors_supported()
    }

    /// Create a configuration with colors always enabled.
    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    /// Create a configuration with colors always disabled.
    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// User-facing level of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Info,
    Success,
    Warning,
    Error,
}

impl Status {
    /// Classify a log record.
    pub fn of(record: &Record<'_>) -> Self {
        match record.level() {
            Level::Error => Status::Error,
            Level::Warn => Status::Warning,
            _ if record.target() == SUCCESS_TARGET => Status::Success,
            _ => Status::Info,
        }
    }

    /// Marker printed in front of the message.
    pub fn marker(self, config: &OutputConfig) -> String {
        let (emoji_str, plain) = match self {
            Status::Info => ("ℹ️ ", "[INFO]"),
            Status::Success => ("✅", "[OK]"),
            Status::Warning => ("⚠️ ", "[WARN]"),
            Status::Error => ("❌", "[ERROR]"),
        };
        let marker = emoji(config, emoji_str, plain);
        if !config.use_color {
            return marker.to_string();
        }
        let styled = style(marker).force_styling(true);
        match self {
            Status::Info => styled.cyan().to_string(),
            Status::Success => styled.green().to_string(),
            Status::Warning => styled.yellow().to_string(),
            Status::Error => styled.red().bold().to_string(),
        }
    }
}

/// Returns the appropriate string based on color configuration.
///
/// When colors are enabled, returns the emoji. When disabled, returns
/// the plain text alternative.
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}
