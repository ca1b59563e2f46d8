//! Component health reporting.

use std::fmt;

use serde::Serialize;

/// Coarse health of one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Paused,
    Starting,
    Running,
    ShuttingDown,
    Recovering,
    Stopped,
    /// Partial functionality remains.
    ErrorNoncritical,
    /// The component no longer works.
    ErrorCritical,
}

impl HealthStatus {
    /// Single-glyph rendering used in chat replies.
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Paused => "⏸",
            Self::Starting => "🔜",
            Self::Running => "🆙",
            Self::ShuttingDown => "🔙",
            Self::Recovering => "🔄",
            Self::Stopped => "⏹",
            Self::ErrorNoncritical => "⚠",
            Self::ErrorCritical => "🆘",
        }
    }

    /// Whether the component is in an error state.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::ErrorNoncritical | Self::ErrorCritical)
    }
}

/// The health of one named component, with an optional detail line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub component: String,
    pub status: HealthStatus,
    pub message: Option<String>,
}

impl HealthReport {
    pub fn new(component: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            component: component.into(),
            status,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:<16}\t{}",
            self.status.icon(),
            self.component,
            self.message.as_deref().unwrap_or("")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_display() {
        let report = HealthReport::new("ModuleRegistry", HealthStatus::ErrorNoncritical)
            .with_message("Error loading 2 modules");
        assert_eq!(
            report.to_string(),
            "⚠ ModuleRegistry  \tError loading 2 modules"
        );
        assert!(report.status.is_error());
    }
}
