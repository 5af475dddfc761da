//! Semantic color palette for terminal output.

use owo_colors::{OwoColorize, Style};
use warden_abac::DecisionResult;

pub fn success_style() -> Style {
    Style::new().green().bold()
}

pub fn error_style() -> Style {
    Style::new().red().bold()
}

pub fn warning_style() -> Style {
    Style::new().yellow()
}

pub fn muted_style() -> Style {
    Style::new().dimmed()
}

pub fn header_style() -> Style {
    Style::new().bold()
}

/// Style for a decision outcome: permit green, deny red, not_applicable yellow.
pub fn decision_style(result: DecisionResult) -> Style {
    match result {
        DecisionResult::Permit => success_style(),
        DecisionResult::Deny => error_style(),
        DecisionResult::NotApplicable => warning_style(),
    }
}

/// Trait extension to apply semantic styles. Every method is a no-op when
/// colors are disabled.
pub trait SemanticStyle: Sized {
    fn styled(&self, style: Style) -> String;

    fn success(&self) -> String {
        self.styled(success_style())
    }

    fn error(&self) -> String {
        self.styled(error_style())
    }

    fn warning(&self) -> String {
        self.styled(warning_style())
    }

    fn muted(&self) -> String {
        self.styled(muted_style())
    }

    fn header(&self) -> String {
        self.styled(header_style())
    }
}

impl<T: std::fmt::Display> SemanticStyle for T {
    fn styled(&self, style: Style) -> String {
        if super::no_color() {
            self.to_string()
        } else {
            self.style(style).to_string()
        }
    }
}
