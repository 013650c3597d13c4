use serde::{Deserialize, Serialize};

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Completion status as understood by the backend attempt record and the
/// dashboard cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl CompletionStatus {
    /// Derives status from a percentage. Percentage is authoritative.
    #[must_use]
    pub fn from_percentage(percentage: u8) -> Self {
        if percentage >= 100 {
            Self::Completed
        } else if percentage > 0 {
            Self::InProgress
        } else {
            Self::NotStarted
        }
    }

    /// Derives status from a percentage, consulting the backend status string
    /// only when the percentage alone says nothing has happened yet.
    ///
    /// A backend string can never pull the status below what the percentage
    /// implies.
    #[must_use]
    pub fn from_backend(status: Option<&str>, percentage: u8) -> Self {
        let derived = Self::from_percentage(percentage);
        if derived != Self::NotStarted {
            return derived;
        }
        match status.map(str::trim) {
            Some("COMPLETED") => Self::Completed,
            Some("IN_PROGRESS") => Self::InProgress,
            _ => derived,
        }
    }

    #[must_use]
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
        }
    }
}

//
// ─── PERCENTAGE ────────────────────────────────────────────────────────────────
//

/// Converts a runtime fraction in `[0, 1]` into a whole percentage.
///
/// Returns `None` for non-finite input. Out-of-range fractions are clamped.
#[must_use]
pub fn percentage_from_fraction(fraction: f64) -> Option<u8> {
    if !fraction.is_finite() {
        return None;
    }
    let scaled = (fraction * 100.0).round().clamp(0.0, 100.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let pct = scaled as u8;
    Some(pct)
}

/// Converts a backend-reported percentage (any JSON number) into `0..=100`.
#[must_use]
pub fn percentage_from_backend(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let pct = value.round().clamp(0.0, 100.0) as u8;
    pct
}

//
// ─── SIGNAL ────────────────────────────────────────────────────────────────────
//

/// How far the learner is through the active lesson.
///
/// `completed` is true iff the percentage reached 100 or an explicit
/// completion was observed, in which case the percentage is 100 as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSignal {
    percentage: u8,
    completed: bool,
}

impl ProgressSignal {
    #[must_use]
    pub fn not_started() -> Self {
        Self::default()
    }

    /// Builds a signal, clamping and normalizing completion.
    #[must_use]
    pub fn new(percentage: u8, completed: bool) -> Self {
        let percentage = percentage.min(100);
        if completed || percentage == 100 {
            Self {
                percentage: 100,
                completed: true,
            }
        } else {
            Self {
                percentage,
                completed: false,
            }
        }
    }

    #[must_use]
    pub fn percentage(&self) -> u8 {
        self.percentage
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn status(&self) -> CompletionStatus {
        CompletionStatus::from_percentage(self.percentage)
    }

    /// True once anything worth persisting has been observed.
    #[must_use]
    pub fn has_activity(&self) -> bool {
        self.percentage > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_percentage() {
        assert_eq!(CompletionStatus::from_percentage(0), CompletionStatus::NotStarted);
        assert_eq!(CompletionStatus::from_percentage(1), CompletionStatus::InProgress);
        assert_eq!(CompletionStatus::from_percentage(99), CompletionStatus::InProgress);
        assert_eq!(CompletionStatus::from_percentage(100), CompletionStatus::Completed);
    }

    #[test]
    fn backend_status_is_fallback_only() {
        // A stale "IN_PROGRESS" never overrides a full percentage.
        assert_eq!(
            CompletionStatus::from_backend(Some("IN_PROGRESS"), 100),
            CompletionStatus::Completed
        );
        // "COMPLETED" with a lower percentage does not win either.
        assert_eq!(
            CompletionStatus::from_backend(Some("COMPLETED"), 40),
            CompletionStatus::InProgress
        );
        assert_eq!(
            CompletionStatus::from_backend(Some("IN_PROGRESS"), 0),
            CompletionStatus::InProgress
        );
        assert_eq!(CompletionStatus::from_backend(None, 0), CompletionStatus::NotStarted);
    }

    #[test]
    fn backend_completion_counts_when_percentage_is_silent() {
        assert_eq!(
            CompletionStatus::from_backend(Some("COMPLETED"), 0),
            CompletionStatus::Completed
        );
        assert_eq!(
            CompletionStatus::from_backend(Some(" COMPLETED "), 0),
            CompletionStatus::Completed
        );
        assert_eq!(
            CompletionStatus::from_backend(Some("PASSED"), 0),
            CompletionStatus::NotStarted
        );
    }

    #[test]
    fn status_serializes_to_wire_names() {
        let json = serde_json::to_string(&CompletionStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
        assert_eq!(CompletionStatus::Completed.as_wire(), "COMPLETED");
    }

    #[test]
    fn fraction_rounds_and_clamps() {
        assert_eq!(percentage_from_fraction(0.404), Some(40));
        assert_eq!(percentage_from_fraction(0.996), Some(100));
        assert_eq!(percentage_from_fraction(1.7), Some(100));
        assert_eq!(percentage_from_fraction(-0.2), Some(0));
        assert_eq!(percentage_from_fraction(f64::NAN), None);
    }

    #[test]
    fn signal_normalizes_completion() {
        let signal = ProgressSignal::new(40, true);
        assert_eq!(signal.percentage(), 100);
        assert_eq!(signal.status(), CompletionStatus::Completed);

        let signal = ProgressSignal::new(100, false);
        assert!(signal.completed());

        let signal = ProgressSignal::new(55, false);
        assert_eq!(signal.status(), CompletionStatus::InProgress);
    }

    #[test]
    fn backend_percentage_rounds_and_clamps() {
        assert_eq!(percentage_from_backend(64.6), 65);
        assert_eq!(percentage_from_backend(250.0), 100);
        assert_eq!(percentage_from_backend(-3.0), 0);
    }
}
