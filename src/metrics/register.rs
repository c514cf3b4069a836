//! Row-level listings. Unlike the aggregate sections these keep `Mixed` as
//! its own label and drop records nothing links to a project.

use super::cashflow::reconciled_movements;
use super::{Converted, MetricContext};
use crate::aggregator::{Metric, PeriodAccumulator};
use crate::classifier::{Region, RegionAmounts, RegionFilter};
use crate::error::Result;
use crate::schema::{CommercialRecord, RecordKind};
use crate::store::RecordFilter;
use crate::utils::round2;
use chrono::NaiveDate;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RegisterCategory {
    Sales,
    Revenue,
    Expense,
    Cashflow,
}

impl RegisterCategory {
    /// Document kinds listed directly. Cash flow rows come from payments.
    fn document_kinds(&self) -> Option<&'static [RecordKind]> {
        match self {
            RegisterCategory::Sales => Some(&[RecordKind::SaleOrder]),
            RegisterCategory::Revenue => {
                Some(&[RecordKind::CustomerInvoice, RecordKind::CustomerRefund])
            }
            RegisterCategory::Expense => Some(&[RecordKind::VendorBill, RecordKind::VendorRefund]),
            RegisterCategory::Cashflow => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterRow {
    pub seq: usize,
    pub date: NaiveDate,
    pub document: String,
    /// The invoice or bill a payment row settles.
    pub reference: Option<String>,
    pub region: String,
    pub tags: Vec<String>,
    pub partner: String,
    pub salesperson: String,
    pub project: String,
    /// Signed amount in document currency.
    pub amount: f64,
    pub currency: String,
    pub converted_amount: f64,
    pub status: String,
}

impl RegisterRow {
    fn new(record: &CommercialRecord, converted: &Converted) -> Self {
        let classification = &converted.classification;
        let status = match record.kind {
            RecordKind::SaleOrder => record.state.as_str(),
            _ => record.payment_state.as_str(),
        };

        Self {
            seq: 0,
            date: record.date,
            document: record.name.clone(),
            reference: None,
            region: classification.region.label().to_string(),
            tags: classification.tags.clone(),
            partner: record.partner.clone().unwrap_or_default(),
            salesperson: record.salesperson.clone().unwrap_or_default(),
            project: classification.project_name.clone().unwrap_or_default(),
            amount: round2(classification.total()),
            currency: record.currency.clone(),
            converted_amount: round2(converted.amount()),
            status: status.to_string(),
        }
    }
}

/// Inflow and outflow of a cash flow register.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CashTotals {
    pub inflow: RegionAmounts,
    pub outflow: RegionAmounts,
    pub net: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterSection {
    pub category: RegisterCategory,
    pub count: usize,
    pub rows: Vec<RegisterRow>,
    pub totals: RegionAmounts,
    pub total: f64,
    pub cash: Option<CashTotals>,
}

fn admitted(
    ctx: &MetricContext,
    acc: &mut PeriodAccumulator,
    record: &CommercialRecord,
    filter: RegionFilter,
) -> Option<Converted> {
    let (classification, factor) = ctx.convert(record);
    acc.extend_issues(classification.issues.iter().cloned());
    if classification.region == Region::Unclassified || !filter.admits(classification.region) {
        return None;
    }
    let factor = acc.fold(std::iter::once(factor)).pop()?;
    Some(Converted {
        classification,
        factor,
    })
}

fn finish(
    category: RegisterCategory,
    mut rows: Vec<RegisterRow>,
    totals: RegionAmounts,
    cash: Option<CashTotals>,
) -> RegisterSection {
    rows.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.document.cmp(&b.document)));
    for (i, row) in rows.iter_mut().enumerate() {
        row.seq = i + 1;
    }

    RegisterSection {
        category,
        count: rows.len(),
        rows,
        totals: totals.rounded(),
        total: round2(totals.total()),
        cash,
    }
}

pub fn register(
    ctx: &MetricContext,
    acc: &mut PeriodAccumulator,
    category: RegisterCategory,
    filter: RegionFilter,
) -> Result<RegisterSection> {
    let Some(kinds) = category.document_kinds() else {
        return cash_register(ctx, acc, filter);
    };
    if category == RegisterCategory::Expense {
        ctx.index().require_tags()?;
    }

    let window = acc.window();
    let records = ctx.store.commercial_records(
        &RecordFilter::new(ctx.company_id, kinds).between(window.start, window.end),
    )?;

    let mut rows = Vec::new();
    let mut totals = RegionAmounts::default();
    for record in &records {
        let Some(converted) = admitted(ctx, acc, record, filter) else {
            continue;
        };
        totals.merge(&converted.classification.split().scaled(converted.factor));
        rows.push(RegisterRow::new(record, &converted));
    }

    debug!(
        "Register {:?}: {} of {} record(s) listed",
        category,
        rows.len(),
        records.len()
    );
    Ok(finish(category, rows, totals, None))
}

fn cash_register(
    ctx: &MetricContext,
    acc: &mut PeriodAccumulator,
    filter: RegionFilter,
) -> Result<RegisterSection> {
    let movements = reconciled_movements(ctx, acc.window())?;

    let mut rows = Vec::new();
    let mut totals = RegionAmounts::default();
    let mut cash = CashTotals::default();
    for movement in &movements {
        let Some(converted) = admitted(ctx, acc, &movement.document, filter) else {
            continue;
        };
        let split = converted.classification.split().scaled(converted.factor);
        let (status, signed) = match movement.metric() {
            Metric::CashOut => {
                cash.outflow.merge(&split);
                ("outflow", split.scaled(-1.0))
            }
            _ => {
                cash.inflow.merge(&split);
                ("inflow", split)
            }
        };
        totals.merge(&signed);

        let mut row = RegisterRow::new(&movement.document, &converted);
        row.date = movement.payment.date;
        row.document = movement.payment.name.clone();
        row.reference = Some(movement.document.name.clone());
        row.status = status.to_string();
        rows.push(row);
    }

    cash.net = round2(cash.inflow.total() - cash.outflow.total());
    cash.inflow = cash.inflow.rounded();
    cash.outflow = cash.outflow.rounded();
    debug!("Cash register: {} of {} movement(s) listed", rows.len(), movements.len());
    Ok(finish(RegisterCategory::Cashflow, rows, totals, Some(cash)))
}
