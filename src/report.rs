//! Request handling: validate the request, build the per-request region index
//! and accumulator, run the calculators the variant needs and assemble one
//! payload.

use crate::aggregator::{Metric, PeriodAccumulator};
use crate::breakdown::BreakdownEntry;
use crate::classifier::{Region, RegionClassifier, RegionFilter, RegionIndex};
use crate::config::ReportConfig;
use crate::currency::{CurrencyNormalizer, CurrencyRateProvider};
use crate::error::{DataQualityIssue, ReportError, Result};
use crate::metrics::cashflow::{self, CashflowSection};
use crate::metrics::financials::{self, FinancialSection};
use crate::metrics::headcount::{self, HeadcountSection};
use crate::metrics::projects::{self, ProjectDetail, ProjectsSection};
use crate::metrics::register::{self, RegisterCategory, RegisterSection};
use crate::metrics::sales::{self, SalesSection};
use crate::metrics::MetricContext;
use crate::period::{PeriodKind, PeriodSelector, Quarter, ReportingPeriod, ResolvedPeriod};
use crate::schema::{CompanyId, ProjectId};
use crate::store::{ProjectDirectory, RecordStore};
use crate::utils::{month_abbrev, round2};
use chrono::{DateTime, Local, NaiveDate, Utc};
use log::{debug, error, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const COUNTRY_NOT_SET: &str = "Not Set";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportVariant {
    /// Period KPIs with regional splits.
    #[default]
    Overview,
    /// Twelve monthly buckets per metric with drill-down breakdowns.
    Trend,
    Register { category: RegisterCategory },
    Projects,
    ProjectDetail { project_id: ProjectId },
    Headcount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReportRequest {
    pub company_id: CompanyId,
    pub year: i32,

    #[serde(default)]
    #[schemars(description = "Month 1-12. Ignored when a quarter is given.")]
    pub month: Option<u32>,

    #[serde(default)]
    pub quarter: Option<Quarter>,

    #[serde(default)]
    #[schemars(description = "Restricts the row-level variants (projects, register).")]
    pub region: RegionFilter,

    #[serde(default)]
    pub variant: ReportVariant,

    #[serde(default)]
    #[schemars(description = "The date aging is measured against. Defaults to today.")]
    pub as_of: Option<NaiveDate>,
}

impl ReportRequest {
    pub fn new(company_id: CompanyId, year: i32, variant: ReportVariant) -> Self {
        Self {
            company_id,
            year,
            month: None,
            quarter: None,
            region: RegionFilter::All,
            variant,
            as_of: None,
        }
    }

    pub fn with_month(mut self, month: u32) -> Self {
        self.month = Some(month);
        self
    }

    pub fn with_quarter(mut self, quarter: Quarter) -> Self {
        self.quarter = Some(quarter);
        self
    }

    pub fn with_region(mut self, region: RegionFilter) -> Self {
        self.region = region;
        self
    }

    pub fn as_of(mut self, date: NaiveDate) -> Self {
        self.as_of = Some(date);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ReportRequest)
    }
}

/// The selectors as they were applied. A month cleared by a quarter echoes
/// as 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiltersEcho {
    pub year: i32,
    pub month: u32,
    pub month_name: String,
    pub quarter: Option<Quarter>,
    pub region: String,
    pub date_range: String,
}

impl FiltersEcho {
    fn new(resolved: &ResolvedPeriod, region: RegionFilter) -> Self {
        Self {
            year: resolved.period.year,
            month: resolved.month.unwrap_or(0),
            month_name: resolved.month_name().to_string(),
            quarter: resolved.quarter,
            region: region.as_str().to_string(),
            date_range: resolved.window.describe(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyInfo {
    pub id: CompanyId,
    pub name: String,
    pub currency: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthAmount {
    pub month: u32,
    pub label: String,
    pub total: f64,
    pub local: f64,
    pub export: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewSection {
    pub sales: SalesSection,
    pub financials: FinancialSection,
    pub cashflow: CashflowSection,
    /// Sales of every month of the year, whatever the selected period.
    pub monthly_sales: Vec<MonthAmount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendMonth {
    #[serde(flatten)]
    pub amounts: MonthAmount,
    pub breakdown: Vec<BreakdownEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSection {
    pub sales: Vec<TrendMonth>,
    pub revenue: Vec<TrendMonth>,
    pub expenses: Vec<TrendMonth>,
    pub cash_in: Vec<TrendMonth>,
    pub cash_out: Vec<TrendMonth>,
}

impl TrendSection {
    fn series(&self) -> [&Vec<TrendMonth>; 5] {
        [
            &self.sales,
            &self.revenue,
            &self.expenses,
            &self.cash_in,
            &self.cash_out,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportPayload {
    pub filters: FiltersEcho,
    pub company: CompanyInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<OverviewSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<TrendSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register: Option<RegisterSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projects: Option<ProjectsSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_detail: Option<ProjectDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headcount: Option<HeadcountSection>,
    /// Largest monthly value across the charted series.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_max: Option<f64>,
    pub last_update: DateTime<Utc>,
    pub data_quality: Vec<DataQualityIssue>,
}

impl ReportPayload {
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn month_amounts(acc: &PeriodAccumulator, metric: Metric) -> Vec<MonthAmount> {
    let total = acc.monthly_total(metric);
    let local = acc.monthly(metric, Region::Local);
    let export = acc.monthly(metric, Region::Export);

    (0..12)
        .map(|slot| MonthAmount {
            month: slot as u32 + 1,
            label: month_abbrev(slot as u32 + 1).to_string(),
            total: round2(total[slot]),
            local: round2(local[slot]),
            export: round2(export[slot]),
        })
        .collect()
}

fn trend_months(acc: &PeriodAccumulator, metric: Metric) -> Vec<TrendMonth> {
    month_amounts(acc, metric)
        .into_iter()
        .enumerate()
        .map(|(slot, amounts)| TrendMonth {
            amounts,
            breakdown: acc.breakdown(metric, slot),
        })
        .collect()
}

/// Keeps the first occurrence of every issue.
fn dedup_issues(issues: Vec<DataQualityIssue>) -> Vec<DataQualityIssue> {
    let mut seen = HashSet::new();
    issues
        .into_iter()
        .filter(|issue| seen.insert(issue.to_string()))
        .collect()
}

/// Turns a report request into a payload. Every call allocates its own
/// accumulator; nothing is cached between requests.
pub struct ReportBuilder;

impl ReportBuilder {
    pub fn build(
        request: &ReportRequest,
        store: &dyn RecordStore,
        directory: &dyn ProjectDirectory,
        rates: &dyn CurrencyRateProvider,
        config: &ReportConfig,
    ) -> Result<ReportPayload> {
        config.validate()?;
        let resolved = PeriodSelector {
            month: request.month,
            quarter: request.quarter,
        }
        .resolve(request.year, config)?;
        // Trend always covers the whole year.
        let resolved = match request.variant {
            ReportVariant::Trend => {
                let period = ReportingPeriod::trend(request.year);
                ResolvedPeriod {
                    window: period.window()?,
                    period,
                    month: None,
                    quarter: None,
                }
            }
            _ => resolved,
        };

        info!(
            "Building {:?} report for company {} ({})",
            request.variant,
            request.company_id,
            resolved.window.describe()
        );

        let company = store
            .company(request.company_id)?
            .ok_or(ReportError::UnknownCompany(request.company_id))?;
        let index = RegionIndex::load(directory, config)?;
        let classifier = RegionClassifier::new(&index, config);
        let currency = CurrencyNormalizer::new(rates, &company.currency);

        let ctx = MetricContext {
            store,
            classifier: &classifier,
            currency: &currency,
            config,
            company_id: company.id,
            as_of: request.as_of.unwrap_or_else(|| Local::now().date_naive()),
        };

        let mut payload = ReportPayload {
            filters: FiltersEcho::new(&resolved, request.region),
            company: CompanyInfo {
                id: company.id,
                name: company.name.clone(),
                currency: company.currency.clone(),
                country: company
                    .country
                    .clone()
                    .unwrap_or_else(|| COUNTRY_NOT_SET.to_string()),
            },
            overview: None,
            trend: None,
            register: None,
            projects: None,
            project_detail: None,
            headcount: None,
            global_max: None,
            last_update: Utc::now(),
            data_quality: index.missing_tag_issues(),
        };

        let mut acc = PeriodAccumulator::new(&resolved.period)?;
        match request.variant {
            ReportVariant::Overview => {
                let overview =
                    Self::overview(&ctx, &mut acc, request.year, &mut payload.data_quality)?;
                payload.global_max = Some(
                    overview
                        .monthly_sales
                        .iter()
                        .fold(0.0, |max: f64, m| max.max(m.total)),
                );
                payload.overview = Some(overview);
            }
            ReportVariant::Trend => {
                let trend = Self::trend(&ctx, &mut acc)?;
                payload.global_max = Some(
                    trend
                        .series()
                        .iter()
                        .flat_map(|series| series.iter())
                        .fold(0.0, |max: f64, m| max.max(m.amounts.total)),
                );
                payload.trend = Some(trend);
            }
            ReportVariant::Register { category } => {
                let section = register::register(&ctx, &mut acc, category, request.region)?;
                payload.register = Some(section);
            }
            ReportVariant::Projects => {
                let section = projects::projects_section(&ctx, &mut acc, request.region)?;
                payload.projects = Some(section);
            }
            ReportVariant::ProjectDetail { project_id } => {
                let detail = projects::project_detail(&ctx, &mut acc, project_id)?;
                payload.project_detail = Some(detail);
            }
            ReportVariant::Headcount => {
                payload.headcount = Some(headcount::headcount(&ctx)?);
            }
        }

        payload.data_quality.extend(acc.into_issues());
        payload.data_quality = dedup_issues(std::mem::take(&mut payload.data_quality));
        debug!(
            "Report ready with {} data quality issue(s)",
            payload.data_quality.len()
        );
        Ok(payload)
    }

    fn overview(
        ctx: &MetricContext,
        acc: &mut PeriodAccumulator,
        year: i32,
        issues: &mut Vec<DataQualityIssue>,
    ) -> Result<OverviewSection> {
        let window = acc.window();

        let order_count = sales::post_sales(ctx, acc)?;
        financials::post_revenue(ctx, acc)?;
        financials::post_vendor_bills(ctx, acc)?;
        cashflow::post_cashflow(ctx, acc)?;

        let targets = sales::load_targets(ctx, year)?;
        let ledger = financials::ledger_figures(ctx, window)?;

        let mut year_acc = PeriodAccumulator::new(&ReportingPeriod {
            year,
            kind: PeriodKind::FullYear,
        })?;
        sales::post_sales(ctx, &mut year_acc)?;
        issues.extend(year_acc.issues().iter().cloned());

        Ok(OverviewSection {
            sales: sales::summarize(acc, order_count, &targets),
            financials: financials::summarize(acc, &ledger),
            cashflow: cashflow::summarize(acc),
            monthly_sales: month_amounts(&year_acc, Metric::Sales),
        })
    }

    fn trend(ctx: &MetricContext, acc: &mut PeriodAccumulator) -> Result<TrendSection> {
        sales::post_sales(ctx, acc)?;
        financials::post_revenue(ctx, acc)?;
        financials::post_vendor_bills(ctx, acc)?;
        cashflow::post_cashflow(ctx, acc)?;

        Ok(TrendSection {
            sales: trend_months(acc, Metric::Sales),
            revenue: trend_months(acc, Metric::Revenue),
            expenses: trend_months(acc, Metric::Expenses),
            cash_in: trend_months(acc, Metric::CashIn),
            cash_out: trend_months(acc, Metric::CashOut),
        })
    }
}

pub fn build_report(
    request: &ReportRequest,
    store: &dyn RecordStore,
    directory: &dyn ProjectDirectory,
    rates: &dyn CurrencyRateProvider,
    config: &ReportConfig,
) -> Result<ReportPayload> {
    ReportBuilder::build(request, store, directory, rates, config).map_err(|e| {
        if !e.is_input_error() && !e.is_configuration_error() {
            error!("Report for company {} failed: {}", request.company_id, e);
        }
        e
    })
}
