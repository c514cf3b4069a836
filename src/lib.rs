//! # Region Report Builder
//!
//! A library for turning ERP sales, accounting, HR and project records into
//! period-scoped KPIs, split by the "Local" and "Export" business regions.
//!
//! ## Core Concepts
//!
//! - **Region**: every order, invoice and bill is attributed to Local, Export,
//!   Other, Mixed or Unclassified through the projects it touches
//! - **Resolution chain**: direct project link first, then the lines' analytic
//!   distributions (split proportionally), then the whole amount unclassified
//! - **Reporting currency**: amounts are converted at their transaction date;
//!   a missing rate counts as zero and is reported, never guessed
//! - **Request scope**: each report gets its own accumulator and region index;
//!   nothing is cached between requests
//!
//! ## Example
//!
//! ```rust,ignore
//! use region_report_builder::*;
//!
//! let store = InMemoryStore::from_path("snapshot.json")?;
//! let rates = RateTable::new();
//! let config = ReportConfig::default();
//!
//! let request = ReportRequest::new(1, 2024, ReportVariant::Overview).with_quarter(Quarter::Q3);
//! let payload = ReportBuilder::build(&request, &store, &store, &rates, &config)?;
//! println!("{}", payload.to_json_string()?);
//! ```

pub mod aggregator;
pub mod breakdown;
pub mod classifier;
pub mod config;
pub mod currency;
pub mod distribution;
pub mod error;
pub mod metrics;
pub mod period;
pub mod report;
pub mod schema;
pub mod store;
pub mod utils;

pub use aggregator::{Metric, PeriodAccumulator};
pub use breakdown::{BreakdownBuilder, BreakdownEntry};
pub use classifier::{
    Allocation, Classification, ProjectResolver, Region, RegionAmounts, RegionClassifier,
    RegionFilter, RegionIndex,
};
pub use config::{BalanceSnapshot, DualTagPolicy, ReportConfig};
pub use currency::{CurrencyNormalizer, CurrencyRateProvider, DatedRate, RateTable};
pub use distribution::{DistributionResolver, ResolvedDistribution};
pub use error::{DataQualityIssue, ReportError, Result};
pub use metrics::register::RegisterCategory;
pub use period::{DateWindow, PeriodKind, PeriodSelector, Quarter, ReportingPeriod, ResolvedPeriod};
pub use report::{build_report, ReportBuilder, ReportPayload, ReportRequest, ReportVariant};
pub use schema::*;
pub use store::{
    InMemoryStore, LedgerFilter, PaymentFilter, ProjectDirectory, RecordFilter, RecordStore,
    TimesheetFilter,
};
pub use utils::*;
