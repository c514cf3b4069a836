//! Request-scoped accumulation of converted, classified amounts.

use crate::breakdown::{BreakdownBuilder, BreakdownEntry};
use crate::classifier::{Classification, Region, RegionAmounts};
use crate::error::{DataQualityIssue, Result};
use crate::period::{DateWindow, PeriodKind, ReportingPeriod};
use crate::utils::month_index;
use chrono::NaiveDate;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Sales,
    Revenue,
    Expenses,
    CashIn,
    CashOut,
}

const BUCKET_REGIONS: [Region; 3] = [Region::Local, Region::Export, Region::Other];

/// Running sums keyed by (metric, region, month slot). Created fresh for every
/// report request; nothing in here outlives it.
#[derive(Debug)]
pub struct PeriodAccumulator {
    year: i32,
    window: DateWindow,
    buckets: BTreeMap<(Metric, Region), [f64; 12]>,
    /// Calendar-month windows of the period; each maps to its month slot.
    slots: Vec<DateWindow>,
    breakdowns: Option<BTreeMap<(Metric, usize), BreakdownBuilder>>,
    issues: Vec<DataQualityIssue>,
}

impl PeriodAccumulator {
    /// Per-project breakdowns are only tracked for trend periods.
    pub fn new(period: &ReportingPeriod) -> Result<Self> {
        let breakdowns = match period.kind {
            PeriodKind::Trend => Some(BTreeMap::new()),
            _ => None,
        };

        Ok(Self {
            year: period.year,
            window: period.window()?,
            slots: period.month_windows()?,
            buckets: BTreeMap::new(),
            breakdowns,
            issues: Vec::new(),
        })
    }

    pub fn window(&self) -> DateWindow {
        self.window
    }

    /// Month slot whose own window holds `date`.
    fn slot_of(&self, date: NaiveDate) -> Option<usize> {
        self.slots
            .iter()
            .find(|window| window.contains(date))
            .map(|window| month_index(window.start))
    }

    /// Adds an amount to the slot of its own date. Dates outside the period
    /// are ignored.
    pub fn add(&mut self, metric: Metric, date: NaiveDate, region: Region, amount: f64) -> bool {
        let Some(slot) = self.slot_of(date) else {
            return false;
        };
        let slots = self
            .buckets
            .entry((metric, region.bucket()))
            .or_insert([0.0; 12]);
        slots[slot] += amount;
        true
    }

    /// Posts every allocation of a classification, already converted by
    /// `factor` into the reporting currency.
    pub fn add_classified(
        &mut self,
        metric: Metric,
        date: NaiveDate,
        classification: &Classification,
        factor: f64,
        project_name: impl Fn(u64) -> Option<String>,
    ) {
        let Some(slot) = self.slot_of(date) else {
            return;
        };
        for allocation in &classification.allocations {
            let amount = allocation.amount * factor;
            self.add(metric, date, allocation.region, amount);

            if let Some(breakdowns) = self.breakdowns.as_mut() {
                let name = allocation.project_id.and_then(&project_name);
                breakdowns
                    .entry((metric, slot))
                    .or_default()
                    .add(allocation.project_id, name.as_deref(), amount);
            }
        }
    }

    pub fn record_issue(&mut self, issue: DataQualityIssue) {
        self.issues.push(issue);
    }

    pub fn extend_issues(&mut self, issues: impl IntoIterator<Item = DataQualityIssue>) {
        self.issues.extend(issues);
    }

    /// Keeps the successes, collects the failures as issues.
    pub fn fold<T>(
        &mut self,
        results: impl IntoIterator<Item = std::result::Result<T, DataQualityIssue>>,
    ) -> Vec<T> {
        let mut ok = Vec::new();
        for result in results {
            match result {
                Ok(value) => ok.push(value),
                Err(issue) => self.issues.push(issue),
            }
        }
        ok
    }

    pub fn monthly(&self, metric: Metric, region: Region) -> [f64; 12] {
        self.buckets
            .get(&(metric, region.bucket()))
            .copied()
            .unwrap_or([0.0; 12])
    }

    pub fn monthly_total(&self, metric: Metric) -> [f64; 12] {
        let mut totals = [0.0; 12];
        for region in BUCKET_REGIONS {
            for (slot, value) in self.monthly(metric, region).iter().enumerate() {
                totals[slot] += value;
            }
        }
        totals
    }

    pub fn total(&self, metric: Metric, region: Region) -> f64 {
        self.monthly(metric, region).iter().sum()
    }

    pub fn split(&self, metric: Metric) -> RegionAmounts {
        RegionAmounts {
            local: self.total(metric, Region::Local),
            export: self.total(metric, Region::Export),
            other: self.total(metric, Region::Other),
        }
    }

    pub fn breakdown(&self, metric: Metric, slot: usize) -> Vec<BreakdownEntry> {
        self.breakdowns
            .as_ref()
            .and_then(|b| b.get(&(metric, slot)))
            .map(|builder| builder.finish())
            .unwrap_or_default()
    }

    pub fn issues(&self) -> &[DataQualityIssue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<DataQualityIssue> {
        debug!(
            "Accumulator for {} closed with {} bucket(s) and {} issue(s)",
            self.year,
            self.buckets.len(),
            self.issues.len()
        );
        self.issues
    }
}
