//! Detail refinement pass: expert re-appraisal of significant findings.
//!
//! After a completed run the caller may re-check each flagged listing with a
//! single-item prompt. Refinements run in fixed-size concurrent waves with a
//! short pause between waves, reusing the client's credential-rotation and
//! fallback machinery. A failed refinement keeps the first-pass risk and
//! records why the appraisal was unavailable.

use std::time::Duration;

use futures_util::future::join_all;
use serde::Deserialize;

use crate::aggregate::{Finding, ResultAggregator};
use crate::client::BatchClassifier;
use crate::error::ScreenError;
use crate::extract::extract_json_array;
use crate::keypool::CredentialPool;
use crate::label::normalize_label;
use crate::orchestrator::CancelFlag;
use crate::prompt;
use crate::types::{ItemId, RiskLevel};

/// Findings re-appraised per wave.
pub const REFINE_CONCURRENCY: usize = 5;
/// Pause between waves.
pub const REFINE_WAVE_DELAY: Duration = Duration::from_millis(500);

/// Result of re-appraising one finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refinement {
    pub id: ItemId,
    pub risk: RiskLevel,
    pub detail: String,
}

#[derive(Debug, Deserialize)]
struct RawAppraisal {
    final_risk: Option<String>,
    detailed_analysis: Option<String>,
}

/// Re-appraise `findings` and return one refinement per finding processed.
/// Stops early on cancellation or pool exhaustion; findings not reached are
/// simply absent from the result.
pub async fn refine_findings(
    classifier: &BatchClassifier,
    pool: &CredentialPool,
    findings: &[Finding],
    cancel: &CancelFlag,
) -> Vec<Refinement> {
    let mut refinements = Vec::with_capacity(findings.len());

    for (wave_idx, wave) in findings.chunks(REFINE_CONCURRENCY).enumerate() {
        if cancel.is_cancelled() || pool.is_empty() {
            break;
        }

        tracing::debug!(wave = wave_idx + 1, size = wave.len(), "refinement wave");
        let results = join_all(
            wave.iter()
                .map(|finding| refine_one(classifier, pool, finding, cancel)),
        )
        .await;

        let mut stop = false;
        for (finding, result) in wave.iter().zip(results) {
            match result {
                Ok(refinement) => refinements.push(refinement),
                Err(ScreenError::PoolExhausted) | Err(ScreenError::Cancelled) => stop = true,
                Err(e) => {
                    // Non-fatal failures degrade into a kept first-pass risk.
                    refinements.push(Refinement {
                        id: finding.id,
                        risk: finding.risk,
                        detail: format!("appraisal unavailable: {e}"),
                    });
                }
            }
        }
        if stop {
            break;
        }

        tokio::time::sleep(REFINE_WAVE_DELAY).await;
    }

    refinements
}

/// Apply refinements to the aggregator, replacing keyed entries.
pub fn apply_refinements(aggregator: &mut ResultAggregator, refinements: &[Refinement]) {
    for r in refinements {
        aggregator.apply_refinement(r.id, r.risk, r.detail.clone());
    }
}

async fn refine_one(
    classifier: &BatchClassifier,
    pool: &CredentialPool,
    finding: &Finding,
    cancel: &CancelFlag,
) -> Result<Refinement, ScreenError> {
    let user_prompt = prompt::detail_prompt(finding);
    let text = classifier
        .exchange(&user_prompt, prompt::DETAIL_SYSTEM_INSTRUCTION, pool, cancel)
        .await?;

    let json = extract_json_array(&text)?;
    let mut entries: Vec<RawAppraisal> =
        serde_json::from_str(&json).map_err(|e| ScreenError::JsonParsing(e.to_string()))?;
    let appraisal = if entries.is_empty() {
        return Err(ScreenError::MalformedResponse("empty appraisal".into()));
    } else {
        entries.remove(0)
    };

    Ok(Refinement {
        id: finding.id,
        risk: normalize_label(appraisal.final_risk.as_deref()),
        detail: appraisal.detailed_analysis.unwrap_or_default(),
    })
}
