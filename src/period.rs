use crate::config::ReportConfig;
use crate::error::{ReportError, Result};
use crate::utils::{first_day_of_month, format_date_range, last_day_of_month, month_name};
use chrono::{Datelike, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub fn first_month(&self) -> u32 {
        match self {
            Quarter::Q1 => 1,
            Quarter::Q2 => 4,
            Quarter::Q3 => 7,
            Quarter::Q4 => 10,
        }
    }

    pub fn last_month(&self) -> u32 {
        self.first_month() + 2
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quarter::Q1 => "Q1",
            Quarter::Q2 => "Q2",
            Quarter::Q3 => "Q3",
            Quarter::Q4 => "Q4",
        }
    }
}

impl FromStr for Quarter {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "Q1" => Ok(Quarter::Q1),
            "Q2" => Ok(Quarter::Q2),
            "Q3" => Ok(Quarter::Q3),
            "Q4" => Ok(Quarter::Q4),
            _ => Err(ReportError::InvalidQuarter(s.to_string())),
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn month(year: i32, month: u32) -> Result<Self> {
        Ok(Self {
            start: first_day_of_month(year, month)?,
            end: last_day_of_month(year, month)?,
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn describe(&self) -> String {
        format_date_range(self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodKind {
    FullYear,
    Quarter(Quarter),
    Month(u32),
    /// Twelve independent month windows of the year.
    Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportingPeriod {
    pub year: i32,
    pub kind: PeriodKind,
}

impl ReportingPeriod {
    pub fn full_year(year: i32) -> Self {
        Self {
            year,
            kind: PeriodKind::FullYear,
        }
    }

    pub fn trend(year: i32) -> Self {
        Self {
            year,
            kind: PeriodKind::Trend,
        }
    }

    pub fn window(&self) -> Result<DateWindow> {
        let (first, last) = match self.kind {
            PeriodKind::FullYear | PeriodKind::Trend => (1, 12),
            PeriodKind::Quarter(q) => (q.first_month(), q.last_month()),
            PeriodKind::Month(m) => {
                if !(1..=12).contains(&m) {
                    return Err(ReportError::InvalidMonth(m));
                }
                (m, m)
            }
        };

        Ok(DateWindow {
            start: first_day_of_month(self.year, first)?,
            end: last_day_of_month(self.year, last)?,
        })
    }

    /// The calendar-month windows making up the period, each computed on its
    /// own rather than sliced out of the enclosing window.
    pub fn month_windows(&self) -> Result<Vec<DateWindow>> {
        let window = self.window()?;
        (window.start.month()..=window.end.month())
            .map(|m| DateWindow::month(self.year, m))
            .collect()
    }
}

/// What the caller asked for, before precedence is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodSelector {
    pub month: Option<u32>,
    pub quarter: Option<Quarter>,
}

/// The period after precedence, plus the selector values as they are echoed
/// back in the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPeriod {
    pub period: ReportingPeriod,
    pub window: DateWindow,
    pub month: Option<u32>,
    pub quarter: Option<Quarter>,
}

impl PeriodSelector {
    /// Quarter overrides month; neither means the full year. Invalid input is
    /// rejected here, before any store query runs.
    pub fn resolve(&self, year: i32, config: &ReportConfig) -> Result<ResolvedPeriod> {
        validate_year(year, config)?;

        let (kind, month, quarter) = match (self.quarter, self.month) {
            (Some(q), _) => (PeriodKind::Quarter(q), None, Some(q)),
            (None, Some(m)) => {
                if !(1..=12).contains(&m) {
                    return Err(ReportError::InvalidMonth(m));
                }
                (PeriodKind::Month(m), Some(m), None)
            }
            (None, None) => (PeriodKind::FullYear, None, None),
        };

        let period = ReportingPeriod { year, kind };
        Ok(ResolvedPeriod {
            window: period.window()?,
            period,
            month,
            quarter,
        })
    }
}

impl ResolvedPeriod {
    pub fn month_name(&self) -> &'static str {
        self.month.map(month_name).unwrap_or("")
    }
}

pub fn validate_year(year: i32, config: &ReportConfig) -> Result<()> {
    if year < config.min_year || year > config.max_year {
        return Err(ReportError::InvalidYear {
            year,
            min: config.min_year,
            max: config.max_year,
        });
    }
    Ok(())
}
