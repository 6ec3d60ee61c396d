//! Core data model: items, outcomes, run configuration, and progress state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identifier of one classification item, unique within a run.
pub type ItemId = u64;

/// One unit of text to classify. Immutable once created; the core only
/// reads these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationItem {
    pub id: ItemId,
    pub text: String,
    /// Where the item came from (e.g. source file name). Carried through to
    /// the export untouched.
    pub origin: String,
}

impl ClassificationItem {
    pub fn new(id: ItemId, text: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            origin: origin.into(),
        }
    }
}

/// Canonical risk taxonomy. `Error` is a sentinel meaning "classification
/// could not be completed" and does not participate in the severity order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Critical,
    High,
    Medium,
    Low,
    Error,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Critical => "Critical",
            RiskLevel::High => "High",
            RiskLevel::Medium => "Medium",
            RiskLevel::Low => "Low",
            RiskLevel::Error => "Error",
        }
    }

    /// Severity rank, higher is more severe. `None` for the `Error` sentinel.
    pub fn severity(self) -> Option<u8> {
        match self {
            RiskLevel::Critical => Some(3),
            RiskLevel::High => Some(2),
            RiskLevel::Medium => Some(1),
            RiskLevel::Low => Some(0),
            RiskLevel::Error => None,
        }
    }

    /// Whether this level meets a reporting threshold. `Error` never does;
    /// it is surfaced through the separate error view.
    pub fn meets(self, threshold: RiskLevel) -> bool {
        match (self.severity(), threshold.severity()) {
            (Some(s), Some(t)) => s >= t,
            _ => false,
        }
    }
}

/// Outcome of classifying one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub id: ItemId,
    pub risk: RiskLevel,
    pub reason: String,
}

/// Primary/fallback model pair. The fallback is attempted at most once per
/// batch-processing chain when the primary identifier is rejected as unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelector {
    pub primary: String,
    pub fallback: String,
}

impl Default for ModelSelector {
    fn default() -> Self {
        Self {
            primary: "gemini-2.5-flash".to_string(),
            fallback: "gemini-1.5-flash".to_string(),
        }
    }
}

impl ModelSelector {
    /// A fallback attempt only makes sense when it names a different model.
    pub fn can_fall_back(&self) -> bool {
        self.primary != self.fallback
    }
}

/// Caller-selected throughput mode. Controls how many chunks run per round
/// and how long the scheduler pauses between rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeedMode {
    Conservative,
    #[default]
    Aggressive,
}

impl SpeedMode {
    pub fn concurrency(self) -> usize {
        match self {
            SpeedMode::Conservative => 2,
            SpeedMode::Aggressive => 3,
        }
    }

    pub fn inter_round_delay(self) -> Duration {
        match self {
            SpeedMode::Conservative => Duration::from_millis(1500),
            SpeedMode::Aggressive => Duration::from_millis(300),
        }
    }
}

/// Run configuration. Plain knobs, no hidden physics.
#[derive(Debug, Clone)]
pub struct ScreenConfig {
    /// Base URL of the generateContent API.
    pub endpoint: String,
    pub models: ModelSelector,
    /// Items per upstream request.
    pub chunk_size: usize,
    pub mode: SpeedMode,
    /// Minimum risk level reported as a finding.
    pub significance: RiskLevel,
    /// Wait a random 0–2s before the first round to smooth thundering herds
    /// when many runs start simultaneously.
    pub start_jitter: bool,
    /// Optional sampling temperature forwarded to the API.
    pub temperature: Option<f32>,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            models: ModelSelector::default(),
            chunk_size: 30,
            mode: SpeedMode::default(),
            significance: RiskLevel::High,
            start_jitter: true,
            temperature: None,
        }
    }
}

/// Mutable run aggregate, owned by the orchestrator and published read-only
/// after each round. `processed` is monotonically non-decreasing in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunState {
    pub processed: u32,
    pub total: u32,
    /// Significant findings so far.
    pub found: u32,
    /// Items tagged `Error` so far.
    pub errors: u32,
    /// Credentials removed from the pool during this run.
    pub dead_credentials: u32,
    pub current_round: u32,
    pub total_rounds: u32,
    pub cancelled: bool,
}

/// Progress events emitted across a run.
#[derive(Debug, Clone)]
pub enum RunStatusEvent {
    Started { total_items: u32, total_rounds: u32 },
    RoundCompleted { state: RunState },
    Completed { state: RunState },
    /// The run cannot proceed; the caller must supply new credentials.
    FatallyStopped { state: RunState },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_totally_ordered_without_error() {
        assert!(RiskLevel::Critical.severity() > RiskLevel::High.severity());
        assert!(RiskLevel::High.severity() > RiskLevel::Medium.severity());
        assert!(RiskLevel::Medium.severity() > RiskLevel::Low.severity());
        assert_eq!(RiskLevel::Error.severity(), None);
    }

    #[test]
    fn meets_threshold() {
        assert!(RiskLevel::Critical.meets(RiskLevel::High));
        assert!(RiskLevel::High.meets(RiskLevel::High));
        assert!(!RiskLevel::Medium.meets(RiskLevel::High));
        assert!(!RiskLevel::Error.meets(RiskLevel::High));
        assert!(RiskLevel::Low.meets(RiskLevel::Low));
    }

    #[test]
    fn error_never_meets_any_threshold() {
        for threshold in [
            RiskLevel::Critical,
            RiskLevel::High,
            RiskLevel::Medium,
            RiskLevel::Low,
        ] {
            assert!(!RiskLevel::Error.meets(threshold));
        }
    }

    #[test]
    fn speed_mode_knobs() {
        assert_eq!(SpeedMode::Conservative.concurrency(), 2);
        assert_eq!(SpeedMode::Aggressive.concurrency(), 3);
        assert!(
            SpeedMode::Conservative.inter_round_delay() > SpeedMode::Aggressive.inter_round_delay()
        );
    }

    #[test]
    fn default_config_matches_service_defaults() {
        let config = ScreenConfig::default();
        assert_eq!(config.chunk_size, 30);
        assert_eq!(config.models.primary, "gemini-2.5-flash");
        assert_eq!(config.models.fallback, "gemini-1.5-flash");
        assert!(config.models.can_fall_back());
        assert_eq!(config.significance, RiskLevel::High);
    }

    #[test]
    fn same_primary_and_fallback_disables_fallback() {
        let models = ModelSelector {
            primary: "m".into(),
            fallback: "m".into(),
        };
        assert!(!models.can_fall_back());
    }
}
