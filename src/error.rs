use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Invalid year {year}: must be between {min} and {max}")]
    InvalidYear { year: i32, min: i32, max: i32 },

    #[error("Invalid month {0}: must be between 1 and 12")]
    InvalidMonth(u32),

    #[error("Invalid quarter '{0}': expected Q1, Q2, Q3 or Q4")]
    InvalidQuarter(String),

    #[error("Unknown project id {0}")]
    UnknownProject(u64),

    #[error("Unknown company id {0}")]
    UnknownCompany(u64),

    #[error("Project tag '{0}' not found in the project directory")]
    MissingRegionTag(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Record store query failed: {0}")]
    Store(String),

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ReportError {
    /// Input errors are rejected before any store query is issued.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidYear { .. }
                | Self::InvalidMonth(_)
                | Self::InvalidQuarter(_)
                | Self::UnknownProject(_)
                | Self::UnknownCompany(_)
        )
    }

    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::MissingRegionTag(_) | Self::InvalidConfig(_))
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;

/// A recoverable per-record problem. Never aborts a report: the affected
/// amount contributes zero (or lands in "Other") and the issue is echoed in
/// the payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityIssue {
    MalformedDistribution {
        record_id: u64,
        line_id: u64,
        details: String,
    },
    MissingRate {
        record_id: u64,
        from: String,
        to: String,
        date: NaiveDate,
    },
    MissingTagConfiguration {
        tag: String,
    },
}

impl fmt::Display for DataQualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedDistribution {
                record_id,
                line_id,
                details,
            } => write!(
                f,
                "record {record_id}, line {line_id}: malformed analytic distribution ({details})"
            ),
            Self::MissingRate {
                record_id,
                from,
                to,
                date,
            } => write!(
                f,
                "record {record_id}: no {from}->{to} rate in effect on {date}"
            ),
            Self::MissingTagConfiguration { tag } => {
                write!(f, "project tag '{tag}' is not configured")
            }
        }
    }
}
