//! Display themes for severities and AI categories.

use crate::types::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThemeColor {
    Slate,
    Yellow,
    Red,
    Green,
}

impl ThemeColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeColor::Slate => "slate",
            ThemeColor::Yellow => "yellow",
            ThemeColor::Red => "red",
            ThemeColor::Green => "green",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub category: Severity,
    pub color: ThemeColor,
    pub label: &'static str,
}

const NORMAL: Theme = Theme { category: Severity::Normal, color: ThemeColor::Slate, label: "Normal" };
const ATTENTION: Theme = Theme { category: Severity::Attention, color: ThemeColor::Yellow, label: "Attention" };
const ERROR: Theme = Theme { category: Severity::Error, color: ThemeColor::Red, label: "Error" };
const SUCCESS: Theme = Theme { category: Severity::Success, color: ThemeColor::Green, label: "Success" };

/// Map a classifier category to its bucket. The backend's native spellings are accepted.
pub fn category_of(raw: Option<&str>) -> Severity {
    match raw.map(str::trim) {
        Some("attention") | Some("atenção") => Severity::Attention,
        Some("error") | Some("erro") => Severity::Error,
        Some("success") | Some("sucesso") => Severity::Success,
        _ => Severity::Normal,
    }
}

pub struct ClassificationPresenter;

impl ClassificationPresenter {
    /// Theme for a raw category. Unknown or missing input yields the normal theme.
    pub fn theme(raw: Option<&str>) -> Theme {
        Self::theme_for(category_of(raw))
    }

    pub fn theme_for(severity: Severity) -> Theme {
        match severity {
            Severity::Normal => NORMAL,
            Severity::Attention => ATTENTION,
            Severity::Error => ERROR,
            Severity::Success => SUCCESS,
        }
    }

    /// One-line explanation shown under a classification verdict.
    pub fn verdict(theme: &Theme) -> String {
        format!(
            "The classifier marked this event as {} based on its content.",
            theme.label.to_lowercase()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_categories_get_their_theme() {
        assert_eq!(ClassificationPresenter::theme(Some("attention")).color, ThemeColor::Yellow);
        assert_eq!(ClassificationPresenter::theme(Some("error")).label, "Error");
        assert_eq!(ClassificationPresenter::theme(Some("success")).category, Severity::Success);
        assert_eq!(ClassificationPresenter::theme(Some("erro")).category, Severity::Error);
        assert_eq!(ClassificationPresenter::theme(Some("sucesso")).category, Severity::Success);
    }

    #[test]
    fn anything_else_degrades_to_normal() {
        for raw in [None, Some(""), Some("normal"), Some("catastrophic"), Some("ERROR?")] {
            assert_eq!(ClassificationPresenter::theme(raw), NORMAL, "{raw:?}");
        }
    }
}
