//! Metric calculators. Each one issues its own batch queries against the
//! record store and reduces the results through classification and currency
//! conversion.

pub mod cashflow;
pub mod financials;
pub mod headcount;
pub mod projects;
pub mod register;
pub mod sales;

use crate::aggregator::{Metric, PeriodAccumulator};
use crate::classifier::{Classification, RegionClassifier, RegionIndex};
use crate::config::ReportConfig;
use crate::currency::CurrencyNormalizer;
use crate::error::DataQualityIssue;
use crate::schema::{CommercialRecord, CompanyId, ProjectId, RecordId};
use crate::store::RecordStore;
use chrono::NaiveDate;

/// Everything a calculator needs for one request.
pub struct MetricContext<'a> {
    pub store: &'a dyn RecordStore,
    pub classifier: &'a RegionClassifier<'a>,
    pub currency: &'a CurrencyNormalizer<'a>,
    pub config: &'a ReportConfig,
    pub company_id: CompanyId,
    /// "Today" for aging.
    pub as_of: NaiveDate,
}

/// A classified record together with the factor that converts its document
/// currency into the reporting currency.
#[derive(Debug, Clone)]
pub struct Converted {
    pub classification: Classification,
    pub factor: f64,
}

impl Converted {
    pub fn amount(&self) -> f64 {
        self.classification.total() * self.factor
    }
}

impl<'a> MetricContext<'a> {
    pub fn index(&self) -> &RegionIndex {
        self.classifier.index()
    }

    pub fn project_name(&self, project_id: ProjectId) -> Option<String> {
        self.index().project(project_id).map(|p| p.name.clone())
    }

    /// Conversion is linear, so one factor per record is enough.
    pub fn conversion_factor(
        &self,
        record_id: RecordId,
        currency: &str,
        date: NaiveDate,
    ) -> std::result::Result<f64, DataQualityIssue> {
        self.currency.to_reporting(record_id, 1.0, currency, date)
    }

    /// Classifies and converts a record. A missing rate makes the whole record
    /// count as zero.
    pub fn convert(
        &self,
        record: &CommercialRecord,
    ) -> (
        Classification,
        std::result::Result<f64, DataQualityIssue>,
    ) {
        let classification = self.classifier.classify(record);
        let factor = self.conversion_factor(record.id, &record.currency, record.date);
        (classification, factor)
    }

    /// Classifies, converts and posts a record into `metric` on `posting_date`
    /// (the record date, or the payment date for cash flow).
    pub fn post(
        &self,
        acc: &mut PeriodAccumulator,
        metric: Metric,
        record: &CommercialRecord,
        posting_date: NaiveDate,
    ) -> Option<Converted> {
        let (classification, factor) = self.convert(record);
        acc.extend_issues(classification.issues.iter().cloned());

        let factor = acc.fold(std::iter::once(factor)).pop()?;
        acc.add_classified(metric, posting_date, &classification, factor, |id| {
            self.project_name(id)
        });

        Some(Converted {
            classification,
            factor,
        })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Shared builders for calculator tests.

    use super::MetricContext;
    use crate::classifier::{RegionClassifier, RegionIndex};
    use crate::config::ReportConfig;
    use crate::currency::{CurrencyNormalizer, RateTable};
    use crate::schema::{
        CommercialRecord, PaymentState, Project, RawDistribution, RecordKind, RecordLine,
        RecordState, Tag,
    };
    use crate::store::InMemoryStore;
    use chrono::NaiveDate;

    pub const LOCAL_AA: u64 = 501;
    pub const EXPORT_AA: u64 = 502;

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub fn store() -> InMemoryStore {
        InMemoryStore {
            tags: vec![
                Tag { id: 1, name: "Local".to_string() },
                Tag { id: 2, name: "Export".to_string() },
            ],
            projects: vec![
                Project {
                    id: 1,
                    name: "Local Works".to_string(),
                    tags: vec!["Local".to_string()],
                    analytic_account_id: Some(LOCAL_AA),
                    customer: Some("City Council".to_string()),
                    date_start: None,
                    date_end: None,
                },
                Project {
                    id: 2,
                    name: "Export Works".to_string(),
                    tags: vec!["Export".to_string()],
                    analytic_account_id: Some(EXPORT_AA),
                    customer: Some("Harbour Corp".to_string()),
                    date_start: None,
                    date_end: None,
                },
            ],
            ..Default::default()
        }
    }

    /// Runs `f` against a context reporting in EUR as of 2024-12-31.
    pub fn with_context<R>(
        store: &InMemoryStore,
        config: &ReportConfig,
        rates: &RateTable,
        f: impl FnOnce(&MetricContext) -> R,
    ) -> R {
        let index = RegionIndex::load(store, config).unwrap();
        let classifier = RegionClassifier::new(&index, config);
        let currency = CurrencyNormalizer::new(rates, "EUR");
        let ctx = MetricContext {
            store,
            classifier: &classifier,
            currency: &currency,
            config,
            company_id: 1,
            as_of: date(2024, 12, 31),
        };
        f(&ctx)
    }

    pub fn line(id: u64, subtotal: f64, distribution: Option<&str>) -> RecordLine {
        RecordLine {
            id,
            description: None,
            subtotal,
            analytic_distribution: distribution.map(|d| RawDistribution::Text(d.to_string())),
            sale_order_id: None,
        }
    }

    pub fn record(
        id: u64,
        kind: RecordKind,
        on: NaiveDate,
        currency: &str,
        lines: Vec<RecordLine>,
    ) -> CommercialRecord {
        let amount = lines.iter().map(|l| l.subtotal).sum();
        CommercialRecord {
            id,
            name: format!("DOC/{}", id),
            kind,
            state: match kind {
                RecordKind::SaleOrder => RecordState::Sale,
                _ => RecordState::Posted,
            },
            date: on,
            currency: currency.to_string(),
            company_id: 1,
            partner: Some("Partner".to_string()),
            salesperson: None,
            origin: None,
            payment_state: PaymentState::NotPaid,
            amount_untaxed: amount,
            project_ids: vec![],
            lines,
        }
    }

    pub fn local_line(id: u64, subtotal: f64) -> RecordLine {
        line(id, subtotal, Some(&format!("{{\"{}\": 100}}", LOCAL_AA)))
    }

    pub fn export_line(id: u64, subtotal: f64) -> RecordLine {
        line(id, subtotal, Some(&format!("{{\"{}\": 100}}", EXPORT_AA)))
    }
}
