//! Status lines and whole-document JSON output
//!
//! Row output goes through [`super::TableSink`]; the formatter covers the
//! messages around it. Errors go to stderr in every mode.

use console::Style;
use serde::Serialize;

use super::OutputConfig;

#[derive(Debug, Clone)]
struct Theme {
    name: Style,
    success: Style,
    error: Style,
    warning: Style,
}

impl Theme {
    fn colored() -> Self {
        Self {
            name: Style::new().bold(),
            success: Style::new().green(),
            error: Style::new().red(),
            warning: Style::new().yellow(),
        }
    }

    fn plain() -> Self {
        Self {
            name: Style::new(),
            success: Style::new(),
            error: Style::new(),
            warning: Style::new(),
        }
    }
}

/// Mode-aware printer shared by every command
#[derive(Debug, Clone)]
pub struct Formatter {
    config: OutputConfig,
    theme: Theme,
}

impl Formatter {
    pub fn new(config: OutputConfig) -> Self {
        let theme = if config.no_color || config.json {
            Theme::plain()
        } else {
            Theme::colored()
        };
        Self { config, theme }
    }

    pub fn is_json(&self) -> bool {
        self.config.json
    }

    pub fn is_quiet(&self) -> bool {
        self.config.quiet
    }

    /// Spinners only make sense for interactive human output
    pub fn shows_progress(&self) -> bool {
        !self.config.quiet && !self.config.json
    }

    /// Highlight a path or alias name
    pub fn style_name(&self, text: &str) -> String {
        self.theme.name.apply_to(text).to_string()
    }

    /// Print a success line; silent in JSON and quiet mode
    pub fn success(&self, message: &str) {
        if self.config.quiet || self.config.json {
            return;
        }
        println!("{} {message}", self.theme.success.apply_to("✓"));
    }

    /// Print an error, even in quiet mode
    pub fn error(&self, message: &str) {
        if self.config.json {
            let error = serde_json::json!({ "error": message });
            eprintln!(
                "{}",
                serde_json::to_string(&error).unwrap_or_else(|_| message.to_string())
            );
        } else {
            eprintln!("{} {message}", self.theme.error.apply_to("✗"));
        }
    }

    pub fn warning(&self, message: &str) {
        if self.config.quiet || self.config.json {
            return;
        }
        eprintln!("{} {message}", self.theme.warning.apply_to("⚠"));
    }

    /// Print one pretty-printed JSON document
    pub fn json<T: Serialize>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to serialize output: {e}"),
        }
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(OutputConfig::default())
    }
}
