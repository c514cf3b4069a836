//! Analytic distribution parsing.
//!
//! Source lines carry their analytic distribution either as a structured
//! `account -> weight` map or as serialized text. Both are normalized here to
//! fractional shares per analytic account before anything else looks at them.

use crate::error::DataQualityIssue;
use crate::schema::{AnalyticAccountId, RawDistribution, RecordId, RecordLine};
use log::warn;
use serde_json::Value;
use std::collections::BTreeMap;

const FRACTION_TOLERANCE: f64 = 1e-9;

/// Fractional shares per analytic account. Shares are non-negative and sum to
/// at most 1; anything short of 1 is unattributed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedDistribution {
    shares: BTreeMap<AnalyticAccountId, f64>,
}

impl ResolvedDistribution {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AnalyticAccountId, f64)> + '_ {
        self.shares.iter().map(|(account, share)| (*account, *share))
    }

    pub fn share_of(&self, account: AnalyticAccountId) -> f64 {
        self.shares.get(&account).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, account: AnalyticAccountId) -> bool {
        self.shares.contains_key(&account)
    }

    pub fn total_share(&self) -> f64 {
        self.shares.values().sum()
    }

    pub fn unattributed_share(&self) -> f64 {
        (1.0 - self.total_share()).max(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct DistributionResolver {
    percentage_threshold: f64,
}

impl DistributionResolver {
    pub fn new(percentage_threshold: f64) -> Self {
        Self {
            percentage_threshold,
        }
    }

    /// Resolves the distribution of one line. A line without a distribution
    /// resolves to an empty set of shares; an unreadable one is an issue and
    /// the caller treats it exactly like a missing distribution.
    pub fn resolve_line(
        &self,
        record_id: RecordId,
        line: &RecordLine,
    ) -> std::result::Result<ResolvedDistribution, DataQualityIssue> {
        let Some(raw) = &line.analytic_distribution else {
            return Ok(ResolvedDistribution::empty());
        };

        self.resolve(raw).map_err(|details| {
            let issue = DataQualityIssue::MalformedDistribution {
                record_id,
                line_id: line.id,
                details,
            };
            warn!("{}", issue);
            issue
        })
    }

    pub fn resolve(
        &self,
        raw: &RawDistribution,
    ) -> std::result::Result<ResolvedDistribution, String> {
        let entries = match raw {
            RawDistribution::Structured(map) => map.clone(),
            RawDistribution::Text(text) => parse_text(text)?,
        };

        let mut weights: BTreeMap<AnalyticAccountId, f64> = BTreeMap::new();
        for (key, value) in &entries {
            let Ok(account) = key.trim().parse::<AnalyticAccountId>() else {
                warn!("Skipping analytic distribution entry with key '{}'", key);
                continue;
            };
            let Some(weight) = weight_of(value) else {
                warn!(
                    "Skipping analytic distribution entry {} with non-numeric weight {}",
                    account, value
                );
                continue;
            };
            if !weight.is_finite() || weight < 0.0 {
                warn!(
                    "Skipping analytic distribution entry {} with weight {}",
                    account, weight
                );
                continue;
            }
            *weights.entry(account).or_insert(0.0) += weight;
        }

        let weight_sum: f64 = weights.values().sum();
        let divisor = if weight_sum > self.percentage_threshold {
            100.0
        } else {
            1.0
        };

        let mut shares: BTreeMap<AnalyticAccountId, f64> = weights
            .into_iter()
            .map(|(account, weight)| (account, weight / divisor))
            .filter(|(_, share)| *share > 0.0)
            .collect();

        let share_sum: f64 = shares.values().sum();
        if share_sum > 1.0 + FRACTION_TOLERANCE {
            warn!(
                "Analytic distribution allocates {:.2}% of the line, scaling down to 100%",
                share_sum * 100.0
            );
            for share in shares.values_mut() {
                *share /= share_sum;
            }
        }

        Ok(ResolvedDistribution { shares })
    }
}

fn parse_text(text: &str) -> std::result::Result<BTreeMap<String, Value>, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(BTreeMap::new());
    }

    match serde_json::from_str::<BTreeMap<String, Value>>(trimmed) {
        Ok(map) => Ok(map),
        // single-quoted dict literals
        Err(first) => serde_json::from_str(&trimmed.replace('\'', "\""))
            .map_err(|_| format!("unparseable distribution text '{}': {}", trimmed, first)),
    }
}

fn weight_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> DistributionResolver {
        DistributionResolver::new(1.01)
    }

    fn text(s: &str) -> RawDistribution {
        RawDistribution::Text(s.to_string())
    }

    #[test]
    fn test_percentages_are_divided_by_100() {
        let dist = resolver().resolve(&text(r#"{"10": 30, "20": 70}"#)).unwrap();
        assert!((dist.share_of(10) - 0.3).abs() < 1e-9);
        assert!((dist.share_of(20) - 0.7).abs() < 1e-9);
        assert!(dist.unattributed_share() < 1e-9);
    }

    #[test]
    fn test_fractions_are_used_directly() {
        let dist = resolver().resolve(&text(r#"{"10": 0.25, "20": 0.5}"#)).unwrap();
        assert!((dist.share_of(10) - 0.25).abs() < 1e-9);
        assert!((dist.unattributed_share() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_single_quoted_text_is_accepted() {
        let dist = resolver().resolve(&text("{'10': 100.0}")).unwrap();
        assert!((dist.share_of(10) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_structured_map_with_string_weights() {
        let mut map = BTreeMap::new();
        map.insert("5".to_string(), Value::String("50".to_string()));
        map.insert("6".to_string(), serde_json::json!(50));
        let dist = resolver().resolve(&RawDistribution::Structured(map)).unwrap();
        assert!((dist.share_of(5) - 0.5).abs() < 1e-9);
        assert!((dist.share_of(6) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_bad_entries_are_dropped() {
        let dist = resolver()
            .resolve(&text(r#"{"abc": 50, "10": "n/a", "11": -5, "12": 50}"#))
            .unwrap();
        assert!(!dist.contains(10));
        assert!(!dist.contains(11));
        assert!((dist.share_of(12) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_over_allocation_is_scaled_down() {
        let dist = resolver().resolve(&text(r#"{"1": 90, "2": 60}"#)).unwrap();
        assert!((dist.total_share() - 1.0).abs() < 1e-9);
        assert!((dist.share_of(1) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_garbage_text_is_an_issue() {
        let line = RecordLine {
            id: 3,
            description: None,
            subtotal: 10.0,
            analytic_distribution: Some(text("not a mapping")),
            sale_order_id: None,
        };
        let issue = resolver().resolve_line(9, &line).unwrap_err();
        assert!(matches!(
            issue,
            DataQualityIssue::MalformedDistribution { record_id: 9, line_id: 3, .. }
        ));
    }

    #[test]
    fn test_missing_distribution_is_empty() {
        let line = RecordLine {
            id: 1,
            description: None,
            subtotal: 10.0,
            analytic_distribution: None,
            sale_order_id: None,
        };
        assert!(resolver().resolve_line(1, &line).unwrap().is_empty());
    }
}
