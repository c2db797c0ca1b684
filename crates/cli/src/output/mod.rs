//! Output formatting
//!
//! Human output is rendered as borderless tables; `--json` switches every
//! command to machine-readable JSON on stdout.

mod formatter;
mod table;

pub use formatter::Formatter;
pub use table::{Row, TableSink};

/// Output settings shared by every command
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Emit JSON instead of tables
    pub json: bool,
    /// Disable colored output
    pub no_color: bool,
    /// Suppress everything except errors
    pub quiet: bool,
}
