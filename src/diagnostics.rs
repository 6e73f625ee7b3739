// ABOUTME: Diagnostics accumulator for non-fatal warnings during site operations.
// ABOUTME: Collects warnings that shouldn't fail a command but should be shown to users.

/// Collects non-fatal warnings during validation, provisioning and rollback.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A non-fatal warning.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// The requested PHP version was replaced by a supported one.
    pub fn php_fallback(requested: &str, used: &str) -> Self {
        Self {
            kind: WarningKind::PhpFallback,
            message: format!("PHP {requested} is not supported, using PHP {used}"),
        }
    }

    /// One rollback step failed; the rest still ran.
    pub fn rollback_step(step: &str, message: impl std::fmt::Display) -> Self {
        Self {
            kind: WarningKind::RollbackStep,
            message: format!("rollback step '{step}' failed: {message}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    PhpFallback,
    /// Left-over resources may need removing by hand.
    RollbackStep,
}
