use crate::error::{ReportError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How receivable/payable balances are scoped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum BalanceSnapshot {
    #[schemars(
        description = "Point-in-time balance: every posted entry up to the period end date."
    )]
    #[default]
    AsOfEnd,

    #[schemars(description = "Only entries dated inside the reporting window.")]
    WithinPeriod,
}

/// Resolution for a project that carries both the local and the export tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum DualTagPolicy {
    #[default]
    PreferLocal,
    PreferExport,
    #[schemars(description = "Label the project Mixed. Aggregates fold Mixed amounts into Other.")]
    Mixed,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ReportConfig {
    #[schemars(description = "Project tag name marking Local projects.")]
    pub local_tag: String,

    #[schemars(description = "Project tag name marking Export projects.")]
    pub export_tag: String,

    #[schemars(
        description = "If the weights of an analytic distribution sum above this value they are read as percentages (divided by 100), otherwise as direct fractional shares."
    )]
    pub percentage_threshold: f64,

    pub balance_snapshot: BalanceSnapshot,

    pub dual_tag_policy: DualTagPolicy,

    #[schemars(description = "Yearly sales target used when no target records exist for the year.")]
    pub default_sales_target: Option<f64>,

    pub min_year: i32,

    pub max_year: i32,

    #[schemars(description = "Employee category names left out of the headcount category split.")]
    pub excluded_employee_categories: Vec<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            local_tag: "Local".to_string(),
            export_tag: "Export".to_string(),
            percentage_threshold: 1.01,
            balance_snapshot: BalanceSnapshot::AsOfEnd,
            dual_tag_policy: DualTagPolicy::PreferLocal,
            default_sales_target: None,
            min_year: 1990,
            max_year: 9999,
            excluded_employee_categories: vec!["Male".to_string(), "Female".to_string()],
        }
    }
}

impl ReportConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.local_tag.trim().is_empty() || self.export_tag.trim().is_empty() {
            return Err(ReportError::InvalidConfig(
                "region tag names must not be empty".to_string(),
            ));
        }

        if self.local_tag == self.export_tag {
            return Err(ReportError::InvalidConfig(format!(
                "local and export tags must differ (both are '{}')",
                self.local_tag
            )));
        }

        if !self.percentage_threshold.is_finite() || self.percentage_threshold <= 0.0 {
            return Err(ReportError::InvalidConfig(format!(
                "percentage_threshold must be a positive number, got {}",
                self.percentage_threshold
            )));
        }

        if self.min_year > self.max_year {
            return Err(ReportError::InvalidConfig(format!(
                "min_year {} is after max_year {}",
                self.min_year, self.max_year
            )));
        }

        if let Some(target) = self.default_sales_target {
            if target < 0.0 {
                return Err(ReportError::InvalidConfig(format!(
                    "default_sales_target must not be negative, got {}",
                    target
                )));
            }
        }

        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ReportConfig)
    }
}
