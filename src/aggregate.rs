//! Result aggregation: keyed merge of round outcomes, significance
//! filtering, and the exported CSV artifact.
//!
//! The full outcome map is retained for audit; the findings view filters to
//! the caller's significance threshold, and `Error`-tagged items are
//! surfaced separately so "determined safe" and "could not be determined"
//! stay distinguishable.

use std::collections::HashMap;

use chrono::{DateTime, Local};

use crate::types::{ClassificationItem, ItemId, Outcome, RiskLevel};

/// One classified listing with its item metadata carried along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub id: ItemId,
    pub name: String,
    pub origin: String,
    pub risk: RiskLevel,
    pub reason: String,
    /// Second-pass expert appraisal, when the refinement pass ran.
    pub detail: Option<String>,
}

/// Streaming aggregator, safe to merge into after every round. Merging is
/// a keyed replace: re-merging the same outcomes is a no-op.
pub struct ResultAggregator {
    significance: RiskLevel,
    records: HashMap<ItemId, Finding>,
}

impl ResultAggregator {
    pub fn new(significance: RiskLevel) -> Self {
        Self {
            significance,
            records: HashMap::new(),
        }
    }

    /// Merge one chunk's outcomes. `items` supplies the name/origin metadata
    /// for ids in this chunk; ids without an outcome are skipped (the client
    /// never produces such maps).
    pub fn merge(&mut self, items: &[ClassificationItem], outcomes: &HashMap<ItemId, Outcome>) {
        for item in items {
            let Some(outcome) = outcomes.get(&item.id) else {
                continue;
            };
            // Keyed replace keeps a refinement detail only while the risk
            // it annotated still stands.
            let detail = self
                .records
                .get(&item.id)
                .filter(|f| f.risk == outcome.risk)
                .and_then(|f| f.detail.clone());
            self.records.insert(
                item.id,
                Finding {
                    id: item.id,
                    name: item.text.clone(),
                    origin: item.origin.clone(),
                    risk: outcome.risk,
                    reason: outcome.reason.clone(),
                    detail,
                },
            );
        }
    }

    /// Overwrite one finding's risk and attach the expert detail.
    pub fn apply_refinement(&mut self, id: ItemId, risk: RiskLevel, detail: String) {
        if let Some(finding) = self.records.get_mut(&id) {
            finding.risk = risk;
            finding.detail = Some(detail);
        }
    }

    /// Findings meeting the significance threshold, ordered by id.
    pub fn significant(&self) -> Vec<&Finding> {
        let mut found: Vec<&Finding> = self
            .records
            .values()
            .filter(|f| f.risk.meets(self.significance))
            .collect();
        found.sort_by_key(|f| f.id);
        found
    }

    /// Items whose classification could not be completed, ordered by id.
    pub fn errors(&self) -> Vec<&Finding> {
        let mut errs: Vec<&Finding> = self
            .records
            .values()
            .filter(|f| f.risk == RiskLevel::Error)
            .collect();
        errs.sort_by_key(|f| f.id);
        errs
    }

    /// Full audit view over everything merged so far.
    pub fn all(&self) -> &HashMap<ItemId, Finding> {
        &self.records
    }

    pub fn significant_count(&self) -> u32 {
        self.significant().len() as u32
    }

    pub fn error_count(&self) -> u32 {
        self.errors().len() as u32
    }

    /// UTF-8 CSV of the significant findings, prefixed with a byte-order
    /// mark so spreadsheet imports detect the encoding.
    pub fn export_csv(&self) -> String {
        self.export_csv_at(Local::now())
    }

    fn export_csv_at(&self, now: DateTime<Local>) -> String {
        let checked_at = now.format("%Y-%m-%d %H:%M:%S").to_string();
        let mut csv = String::from("\u{feff}");
        csv.push_str("name,risk_level,reason,detail,origin,checked_at\n");
        for finding in self.significant() {
            csv.push_str(&csv_quote(&finding.name));
            csv.push(',');
            csv.push_str(finding.risk.as_str());
            csv.push(',');
            csv.push_str(&csv_quote(&finding.reason));
            csv.push(',');
            csv.push_str(&csv_quote(finding.detail.as_deref().unwrap_or("")));
            csv.push(',');
            csv.push_str(&csv_quote(&finding.origin));
            csv.push(',');
            csv.push_str(&checked_at);
            csv.push('\n');
        }
        csv
    }
}

/// Quote a field, doubling internal quotes.
fn csv_quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(id: ItemId, name: &str) -> ClassificationItem {
        ClassificationItem::new(id, name, "list.csv")
    }

    fn outcome(id: ItemId, risk: RiskLevel, reason: &str) -> (ItemId, Outcome) {
        (
            id,
            Outcome {
                id,
                risk,
                reason: reason.to_string(),
            },
        )
    }

    fn sample() -> (Vec<ClassificationItem>, HashMap<ItemId, Outcome>) {
        let items = vec![item(0, "revolver"), item(1, "holster"), item(2, "broken")];
        let outcomes = HashMap::from([
            outcome(0, RiskLevel::Critical, "priority match"),
            outcome(1, RiskLevel::Low, "accessory"),
            outcome(2, RiskLevel::Error, "API error 500"),
        ]);
        (items, outcomes)
    }

    #[test]
    fn merge_partitions_significant_and_errors() {
        let mut agg = ResultAggregator::new(RiskLevel::High);
        let (items, outcomes) = sample();
        agg.merge(&items, &outcomes);

        assert_eq!(agg.significant_count(), 1);
        assert_eq!(agg.significant()[0].name, "revolver");
        assert_eq!(agg.error_count(), 1);
        assert_eq!(agg.errors()[0].id, 2);
        assert_eq!(agg.all().len(), 3);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut agg = ResultAggregator::new(RiskLevel::High);
        let (items, outcomes) = sample();
        agg.merge(&items, &outcomes);
        let first: Vec<Finding> = agg.significant().into_iter().cloned().collect();

        agg.merge(&items, &outcomes);
        let second: Vec<Finding> = agg.significant().into_iter().cloned().collect();

        assert_eq!(first, second);
        assert_eq!(agg.all().len(), 3);
    }

    #[test]
    fn remerge_replaces_keyed_entry() {
        let mut agg = ResultAggregator::new(RiskLevel::High);
        let items = vec![item(0, "revolver")];
        agg.merge(
            &items,
            &HashMap::from([outcome(0, RiskLevel::Error, "transient")]),
        );
        assert_eq!(agg.error_count(), 1);

        agg.merge(
            &items,
            &HashMap::from([outcome(0, RiskLevel::High, "import revolver")]),
        );
        assert_eq!(agg.error_count(), 0);
        assert_eq!(agg.significant_count(), 1);
    }

    #[test]
    fn lower_threshold_widens_findings() {
        let mut agg = ResultAggregator::new(RiskLevel::Low);
        let (items, outcomes) = sample();
        agg.merge(&items, &outcomes);
        // Low threshold admits everything except Error
        assert_eq!(agg.significant_count(), 2);
    }

    #[test]
    fn refinement_overwrites_risk_and_detail() {
        let mut agg = ResultAggregator::new(RiskLevel::High);
        let items = vec![item(0, "revolver")];
        agg.merge(
            &items,
            &HashMap::from([outcome(0, RiskLevel::High, "suspicious")]),
        );

        agg.apply_refinement(0, RiskLevel::Critical, "bored-through cylinder".into());

        let found = agg.significant();
        assert_eq!(found[0].risk, RiskLevel::Critical);
        assert_eq!(found[0].detail.as_deref(), Some("bored-through cylinder"));
    }

    #[test]
    fn refinement_detail_dropped_when_risk_changes_on_remerge() {
        let mut agg = ResultAggregator::new(RiskLevel::High);
        let items = vec![item(0, "revolver")];
        agg.merge(
            &items,
            &HashMap::from([outcome(0, RiskLevel::High, "suspicious")]),
        );
        agg.apply_refinement(0, RiskLevel::High, "appraised".into());

        // A fresh first-pass outcome at a different level invalidates the detail.
        agg.merge(
            &items,
            &HashMap::from([outcome(0, RiskLevel::Critical, "rescreened")]),
        );
        assert_eq!(agg.all()[&0].detail, None);
    }

    #[test]
    fn csv_starts_with_bom_and_header() {
        let mut agg = ResultAggregator::new(RiskLevel::High);
        let (items, outcomes) = sample();
        agg.merge(&items, &outcomes);

        let csv = agg.export_csv();
        assert!(csv.starts_with('\u{feff}'));
        let header = csv.trim_start_matches('\u{feff}').lines().next().unwrap();
        assert_eq!(header, "name,risk_level,reason,detail,origin,checked_at");
    }

    #[test]
    fn csv_quotes_and_doubles_internal_quotes() {
        let mut agg = ResultAggregator::new(RiskLevel::High);
        let items = vec![item(0, r#"REAL "GIMMICK" mini"#)];
        agg.merge(
            &items,
            &HashMap::from([outcome(0, RiskLevel::Critical, "name, with comma")]),
        );

        let now = Local.with_ymd_and_hms(2026, 8, 29, 12, 0, 0).unwrap();
        let csv = agg.export_csv_at(now);
        let row = csv.trim_start_matches('\u{feff}').lines().nth(1).unwrap();
        assert_eq!(
            row,
            r#""REAL ""GIMMICK"" mini",Critical,"name, with comma","","list.csv",2026-08-29 12:00:00"#
        );
    }

    #[test]
    fn csv_contains_only_significant_rows() {
        let mut agg = ResultAggregator::new(RiskLevel::High);
        let (items, outcomes) = sample();
        agg.merge(&items, &outcomes);

        let csv = agg.export_csv();
        assert!(csv.contains("revolver"));
        assert!(!csv.contains("holster"));
        assert!(!csv.contains("broken"));
    }
}
