//! Prompt and system-instruction builders for the screening requests.
//!
//! The screening domain: spotting recalled replica-handgun listings in bulk
//! sales data. The first pass classifies a whole chunk in one request; the
//! refinement pass re-appraises a single flagged listing.

use crate::aggregate::Finding;
use crate::types::ClassificationItem;

/// Item text longer than this is truncated when building the batch prompt,
/// keeping request sizes bounded.
pub const MAX_ITEM_TEXT: usize = 500;

/// System instruction for the bulk screening pass.
pub const BULK_SYSTEM_INSTRUCTION: &str = "\
You are a replica-firearm safety screener reviewing past sales listings. \
Flag every listing that may match a recalled replica handgun; prefer false \
positives over misses.

Top-priority target: any listing mentioning \"REAL GIMMICK\", \"MINI \
REVOLVER\", \"YUMEYA\", or \"SOPEN\" is unconditionally Critical.

Structural red flags (rate High or Critical): revolvers with bored-through \
cylinders, self-loading pistols with working slides and strikers, \
over/under derringers, single-shot or pepperbox designs, and any import \
advertising full-metal construction or shell ejection.

Ratings:
- Critical: matches the priority target or the structural red flags exactly.
- High: revolver/derringer/automatic wording with unknown maker or import \
origin, or claims of alloy construction and realistic internals.
- Medium: product of a known certified domestic maker.
- Low: parts, accessories, anything that is not a gun.

Output only a JSON array:
[{\"id\": ID, \"risk_level\": \"Critical/High/Medium/Low\", \"reason\": \"short evidence\"}, ...]";

/// System instruction for the single-item refinement pass.
pub const DETAIL_SYSTEM_INSTRUCTION: &str = "\
You are an expert appraiser of replica-firearm construction and firearms \
regulations. Given one flagged listing and its first-pass rating, judge \
strictly whether it matches a recalled replica handgun type (bored-through \
revolver, self-loading, over/under, single-shot, pepperbox) or the \
priority target \"REAL GIMMICK MINI REVOLVER\". Products of certified \
domestic makers are out of scope.

Output only a JSON object:
{\"final_risk\": \"Critical/High/Medium/Low\", \"detailed_analysis\": \"your appraisal\"}";

/// Build the user prompt carrying one chunk of items, one line per item.
pub fn bulk_prompt(items: &[ClassificationItem]) -> String {
    let mut prompt = String::from(
        "Extract the dangerous firearm listings subject to recall from this sales list:\n",
    );
    for item in items {
        prompt.push_str("ID:");
        prompt.push_str(&item.id.to_string());
        prompt.push_str(" NAME:");
        prompt.push_str(&truncate_text(&item.text, MAX_ITEM_TEXT));
        prompt.push('\n');
    }
    prompt
}

/// Build the user prompt for re-appraising one finding.
pub fn detail_prompt(finding: &Finding) -> String {
    format!(
        "Listing: {}, first-pass rating: {}, reason: {}",
        finding.name,
        finding.risk.as_str(),
        finding.reason
    )
}

/// Truncate at a char boundary, appending `...` when anything was cut.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}...")
}
