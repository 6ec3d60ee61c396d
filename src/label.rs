//! Normalization of free-text risk labels onto the canonical taxonomy.
//!
//! The upstream model answers with whatever token it likes, including
//! localized synonyms. An explicit mapping table replaces ad-hoc substring
//! checks; anything unrecognized falls through to `Low`.

use crate::types::RiskLevel;

/// Known upstream tokens, compared case-insensitively after trimming.
const LABEL_TABLE: &[(&str, RiskLevel)] = &[
    ("critical", RiskLevel::Critical),
    ("危険", RiskLevel::Critical),
    ("high", RiskLevel::High),
    ("高", RiskLevel::High),
    ("medium", RiskLevel::Medium),
    ("中", RiskLevel::Medium),
    ("low", RiskLevel::Low),
    ("低", RiskLevel::Low),
];

/// Map a raw upstream label to a canonical risk level.
///
/// Absent or unrecognized labels default to `Low`. That mirrors the
/// service's behavior of treating unclassifiable rows as "no signal"; the
/// alternative of defaulting to `Error` would flood the error view with
/// cosmetic label variations.
pub fn normalize_label(raw: Option<&str>) -> RiskLevel {
    let Some(raw) = raw else {
        return RiskLevel::Low;
    };
    let token = raw.trim().to_lowercase();
    LABEL_TABLE
        .iter()
        .find(|(known, _)| *known == token)
        .map(|(_, level)| *level)
        .unwrap_or(RiskLevel::Low)
}
