//! Line-oriented output with optional JSON mode

use serde::Serialize;

use super::OutputConfig;

/// Renders command results to stdout/stderr
#[derive(Debug, Clone)]
pub struct Printer {
    config: OutputConfig,
}

#[allow(dead_code)]
impl Printer {
    /// Printer with the given output behavior
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Whether JSON mode is active
    pub fn is_json(&self) -> bool {
        self.config.json
    }

    /// Whether the progress bar should render
    pub fn progress_enabled(&self) -> bool {
        !self.config.quiet && !self.config.json && !self.config.no_progress
    }

    fn colors(&self) -> bool {
        !self.config.no_color && !self.config.json
    }

    /// One plain line; silent in quiet mode
    pub fn line(&self, message: &str) {
        if !self.config.quiet {
            println!("{message}");
        }
    }

    /// A `key: value` row with aligned keys
    pub fn row(&self, key: &str, value: &str) {
        if !self.config.quiet {
            println!("{key:>24} : {value}");
        }
    }

    /// Success marker line
    pub fn ok(&self, message: &str) {
        if self.config.quiet || self.config.json {
            return;
        }
        if self.colors() {
            println!("\x1b[32m✓\x1b[0m {message}");
        } else {
            println!("✓ {message}");
        }
    }

    /// Warning to stderr; suppressed in quiet and JSON modes
    pub fn warn(&self, message: &str) {
        if self.config.quiet || self.config.json {
            return;
        }
        if self.colors() {
            eprintln!("\x1b[33m⚠\x1b[0m {message}");
        } else {
            eprintln!("⚠ {message}");
        }
    }

    /// Error to stderr; always printed
    pub fn error(&self, message: &str) {
        if self.config.json {
            let body = serde_json::json!({ "error": message });
            eprintln!("{body}");
        } else if self.colors() {
            eprintln!("\x1b[31m✗\x1b[0m {message}");
        } else {
            eprintln!("✗ {message}");
        }
    }

    /// Serialize a value as pretty JSON
    pub fn json<T: Serialize>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(body) => println!("{body}"),
            Err(e) => eprintln!("output serialization failed: {e}"),
        }
    }
}

impl Default for Printer {
    fn default() -> Self {
        Self::new(OutputConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_enabled_by_default() {
        let p = Printer::default();
        assert!(p.progress_enabled());
        assert!(!p.is_json());
    }

    #[test]
    fn test_progress_disabled_in_json_and_quiet() {
        for config in [
            OutputConfig { json: true, ..Default::default() },
            OutputConfig { quiet: true, ..Default::default() },
            OutputConfig { no_progress: true, ..Default::default() },
        ] {
            assert!(!Printer::new(config).progress_enabled());
        }
    }
}
