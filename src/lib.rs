//! riskscreen — orchestration core for bulk listing-risk classification.
//!
//! Drives batched classification requests against a rate-limited
//! generateContent endpoint using a pool of interchangeable credentials and
//! a primary/fallback model pair. Callers supply an ordered backlog of
//! items (id + text + origin) and consume an id→outcome map plus a live
//! progress feed; file ingestion, settings persistence, and rendering live
//! outside this crate.

pub mod aggregate; // keyed merge, significance filter, CSV artifact
pub mod client; // transport seam + retry/backoff/fallback state machine
pub mod error;
pub mod extract; // JSON recovery from prose-wrapped model text
pub mod keypool; // credential pool with random rotation
pub mod label; // upstream label → canonical taxonomy
pub mod orchestrator; // round loop, cancellation, progress
pub mod planner; // chunk/round partitioning
pub mod probe; // per-key connectivity check
pub mod prompt;
pub mod refine; // second-pass expert appraisal
pub mod types;

pub use aggregate::{Finding, ResultAggregator};
pub use client::{BatchClassifier, ClassifyTransport, GeminiTransport, RetryDecision};
pub use error::ScreenError;
pub use keypool::{parse_key_text, CredentialPool, RandomSource, ThreadRngSource};
pub use orchestrator::{CancelFlag, Orchestrator};
pub use probe::{probe_credentials, KeyProbe, ProbeStatus};
pub use refine::{apply_refinements, refine_findings, Refinement};
pub use types::{
    ClassificationItem, ItemId, ModelSelector, Outcome, RiskLevel, RunState, RunStatusEvent,
    ScreenConfig, SpeedMode,
};
