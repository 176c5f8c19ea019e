//! Output rendering for the command loop
//!
//! The printer handles human and JSON rendering plus the colored
//! success/warning/error markers; progress rendering for bulk transfers
//! lives in [`progress`].

mod printer;
pub mod progress;

pub use printer::Printer;

/// Output behavior derived from CLI flags
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Emit structured JSON instead of human lines
    pub json: bool,
    /// Disable ANSI colors
    pub no_color: bool,
    /// Disable the transfer progress bar
    pub no_progress: bool,
    /// Suppress non-error output
    pub quiet: bool,
}
