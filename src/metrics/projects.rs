//! Project profitability: what was ordered, invoiced and collected against
//! what was billed by vendors and spent on payroll.
//!
//! A project is reached through the confirmed sale orders of the window. The
//! invoices and bills of the same window are then attributed to the reached
//! projects line by line: a direct project link takes the whole document, an
//! invoice line raised from one of the project's orders counts in proportion to
//! the project's share of that order, and any other line counts by the share
//! its analytic distribution gives the project's account.

use super::MetricContext;
use crate::aggregator::PeriodAccumulator;
use crate::classifier::{Region, RegionFilter};
use crate::error::{ReportError, Result};
use crate::schema::{CommercialRecord, EmployeeId, ProjectId, RecordId, RecordKind, TimesheetLine};
use crate::store::{RecordFilter, TimesheetFilter};
use crate::utils::round2;
use chrono::NaiveDate;
use log::debug;
use serde::Serialize;
use std::collections::HashMap;

pub const NO_CUSTOMER: &str = "No Customer";

/// One invoice or bill as seen from a single project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Milestone {
    pub record_id: RecordId,
    pub name: String,
    pub date: NaiveDate,
    pub partner: String,
    pub amount: f64,
    pub paid: bool,
    pub pending: f64,
    pub aging_days: i64,
}

impl Milestone {
    fn new(record: &CommercialRecord, amount: f64, as_of: NaiveDate) -> Self {
        let paid = record.payment_state.is_settled();
        Self {
            record_id: record.id,
            name: record.name.clone(),
            date: record.date,
            partner: record.partner.clone().unwrap_or_default(),
            amount,
            paid,
            pending: if paid { 0.0 } else { amount },
            aging_days: if paid { 0 } else { (as_of - record.date).num_days().max(0) },
        }
    }

    fn rounded(mut self) -> Self {
        self.amount = round2(self.amount);
        self.pending = round2(self.pending);
        self
    }
}

/// Days outstanding, weighted by each unpaid milestone's pending amount.
pub fn weighted_aging(milestones: &[Milestone]) -> f64 {
    let (weighted, pending) = milestones
        .iter()
        .filter(|m| m.pending > 0.0)
        .fold((0.0, 0.0), |(w, p), m| {
            (w + m.pending * m.aging_days as f64, p + m.pending)
        });
    if pending > 0.0 {
        weighted / pending
    } else {
        0.0
    }
}

/// Cost of one timesheet line. The employee's hourly cost wins, then the
/// line's own unit cost, then the negated analytic amount.
pub fn payroll_cost(line: &TimesheetLine, hourly_costs: &HashMap<EmployeeId, f64>) -> f64 {
    if let Some(rate) = line
        .employee_id
        .and_then(|id| hourly_costs.get(&id))
        .filter(|rate| **rate > 0.0)
    {
        return rate * line.hours;
    }
    if let Some(unit) = line.unit_cost.filter(|unit| *unit > 0.0) {
        return unit * line.hours;
    }
    -line.amount
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectRow {
    pub project_id: ProjectId,
    pub project: String,
    pub customer: String,
    pub region: String,
    pub tags: Vec<String>,
    /// Date of the earliest order of the window.
    pub date: Option<NaiveDate>,
    pub po_value: f64,
    pub invoiced: f64,
    pub collected: f64,
    pub pending_collection: f64,
    pub outstanding_aging: f64,
    pub vendor_invoice: f64,
    pub payment_made: f64,
    pub payment_to_be_made: f64,
    pub payroll_cost: f64,
    pub total_outgoing: f64,
    pub total_margin: f64,
    pub margin_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectSummary {
    pub project_count: usize,
    pub total_po_value: f64,
    pub total_invoiced: f64,
    pub total_collected: f64,
    pub total_pending_collection: f64,
    pub total_vendor_invoice: f64,
    pub total_payment_made: f64,
    pub total_payment_to_be_made: f64,
    pub total_payroll_cost: f64,
    pub total_outgoing: f64,
    pub total_margin: f64,
    pub avg_margin_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectsSection {
    pub rows: Vec<ProjectRow>,
    pub summary: ProjectSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub row: ProjectRow,
    pub hours: f64,
    pub customer_milestones: Vec<Milestone>,
    pub vendor_milestones: Vec<Milestone>,
}

#[derive(Debug)]
struct ProjectWork {
    project_id: ProjectId,
    first_order: Option<NaiveDate>,
    po_value: f64,
    customer: Vec<Milestone>,
    vendor: Vec<Milestone>,
    payroll: f64,
    hours: f64,
}

impl ProjectWork {
    fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            first_order: None,
            po_value: 0.0,
            customer: Vec::new(),
            vendor: Vec::new(),
            payroll: 0.0,
            hours: 0.0,
        }
    }

    fn row(&self, ctx: &MetricContext) -> ProjectRow {
        let index = ctx.index();
        let project = index.project(self.project_id);

        let sum = |ms: &[Milestone], paid_only: bool| -> f64 {
            ms.iter()
                .filter(|m| !paid_only || m.paid)
                .map(|m| m.amount)
                .sum()
        };
        let invoiced = sum(&self.customer, false);
        let collected = sum(&self.customer, true);
        let vendor_invoice = sum(&self.vendor, false);
        let payment_made = sum(&self.vendor, true);

        let total_outgoing = vendor_invoice + self.payroll;
        let total_margin = self.po_value - total_outgoing;
        let margin_percent = if self.po_value > 0.0 {
            total_margin / self.po_value * 100.0
        } else {
            0.0
        };

        ProjectRow {
            project_id: self.project_id,
            project: project
                .map(|p| p.name.clone())
                .unwrap_or_else(|| format!("Project {}", self.project_id)),
            customer: project
                .and_then(|p| p.customer.clone())
                .unwrap_or_else(|| NO_CUSTOMER.to_string()),
            region: index.region_of(self.project_id).label().to_string(),
            tags: index.region_tags(self.project_id),
            date: self.first_order,
            po_value: round2(self.po_value),
            invoiced: round2(invoiced),
            collected: round2(collected),
            pending_collection: round2(invoiced - collected),
            outstanding_aging: round2(weighted_aging(&self.customer)),
            vendor_invoice: round2(vendor_invoice),
            payment_made: round2(payment_made),
            payment_to_be_made: round2(vendor_invoice - payment_made),
            payroll_cost: round2(self.payroll),
            total_outgoing: round2(total_outgoing),
            total_margin: round2(total_margin),
            margin_percent: round2(margin_percent),
        }
    }
}

/// The projects reached in one window, in the order they were first seen.
#[derive(Debug, Default)]
struct ProjectBook {
    works: Vec<ProjectWork>,
    slots: HashMap<ProjectId, usize>,
    /// Each order's share per reached project.
    order_shares: HashMap<RecordId, Vec<(usize, f64)>>,
}

impl ProjectBook {
    fn slot_for(&mut self, project_id: ProjectId) -> usize {
        if let Some(slot) = self.slots.get(&project_id) {
            return *slot;
        }
        self.works.push(ProjectWork::new(project_id));
        let slot = self.works.len() - 1;
        self.slots.insert(project_id, slot);
        slot
    }

    fn project_ids(&self) -> Vec<ProjectId> {
        self.works.iter().map(|w| w.project_id).collect()
    }
}

fn add_share(shares: &mut Vec<(usize, f64)>, slot: usize, amount: f64) {
    match shares.iter_mut().find(|(s, _)| *s == slot) {
        Some(entry) => entry.1 += amount,
        None => shares.push((slot, amount)),
    }
}

fn tally_orders(
    ctx: &MetricContext,
    acc: &mut PeriodAccumulator,
    admit: impl Fn(ProjectId) -> bool,
) -> Result<ProjectBook> {
    let window = acc.window();
    let orders = ctx.store.commercial_records(
        &RecordFilter::new(ctx.company_id, &[RecordKind::SaleOrder])
            .between(window.start, window.end),
    )?;
    debug!("Projects: {} confirmed order(s) in {}", orders.len(), window.describe());

    let mut book = ProjectBook::default();
    for order in &orders {
        let (classification, factor) = ctx.convert(order);
        acc.extend_issues(classification.issues.iter().cloned());
        let Some(factor) = acc.fold(std::iter::once(factor)).pop() else {
            continue;
        };

        let order_total = classification.total();
        for allocation in &classification.allocations {
            let Some(project_id) = allocation.project_id else {
                continue;
            };
            if !admit(project_id) {
                continue;
            }

            let slot = book.slot_for(project_id);
            let work = &mut book.works[slot];
            work.po_value += allocation.amount * factor;
            work.first_order = Some(work.first_order.map_or(order.date, |d| d.min(order.date)));

            if order_total != 0.0 {
                let shares = book.order_shares.entry(order.id).or_default();
                add_share(shares, slot, allocation.amount / order_total);
            }
        }
    }
    Ok(book)
}

/// Amounts of one document per reached project, in document currency and
/// carrying the refund sign.
fn document_shares(
    ctx: &MetricContext,
    acc: &mut PeriodAccumulator,
    book: &ProjectBook,
    document: &CommercialRecord,
) -> Vec<(usize, f64)> {
    let mut shares = Vec::new();

    if let Some(project_id) = document.project_ids.first() {
        if let Some(slot) = book.slots.get(project_id) {
            add_share(&mut shares, *slot, document.signed_untaxed_total());
        }
        return shares;
    }

    let sign = document.kind.sign();
    for line in &document.lines {
        let amount = line.subtotal * sign;

        if let Some(linked) = line.sale_order_id.and_then(|id| book.order_shares.get(&id)) {
            for (slot, share) in linked {
                add_share(&mut shares, *slot, amount * share);
            }
            continue;
        }

        let distribution = match ctx.classifier.distributions().resolve_line(document.id, line) {
            Ok(distribution) => distribution,
            Err(issue) => {
                acc.record_issue(issue);
                continue;
            }
        };
        for (account, share) in distribution.iter() {
            let slot = ctx
                .index()
                .project_for_account(account)
                .and_then(|project| book.slots.get(&project.id));
            if let Some(slot) = slot {
                add_share(&mut shares, *slot, amount * share);
            }
        }
    }
    shares
}

fn attach_documents(
    ctx: &MetricContext,
    acc: &mut PeriodAccumulator,
    book: &mut ProjectBook,
) -> Result<()> {
    if book.works.is_empty() {
        return Ok(());
    }

    let window = acc.window();
    let documents = ctx.store.commercial_records(
        &RecordFilter::new(
            ctx.company_id,
            &[
                RecordKind::CustomerInvoice,
                RecordKind::CustomerRefund,
                RecordKind::VendorBill,
                RecordKind::VendorRefund,
            ],
        )
        .between(window.start, window.end),
    )?;
    debug!("Projects: {} invoice(s)/bill(s) to attribute", documents.len());

    for document in &documents {
        let shares = document_shares(ctx, acc, book, document);
        if shares.is_empty() {
            continue;
        }
        let factor = ctx.conversion_factor(document.id, &document.currency, document.date);
        let Some(factor) = acc.fold(std::iter::once(factor)).pop() else {
            continue;
        };

        for (slot, amount) in shares {
            let milestone = Milestone::new(document, amount * factor, ctx.as_of);
            let work = &mut book.works[slot];
            if document.kind.is_customer_side() {
                work.customer.push(milestone);
            } else {
                work.vendor.push(milestone);
            }
        }
    }
    Ok(())
}

fn attach_payroll(
    ctx: &MetricContext,
    acc: &PeriodAccumulator,
    book: &mut ProjectBook,
) -> Result<()> {
    if book.works.is_empty() {
        return Ok(());
    }

    let window = acc.window();
    let lines = ctx.store.timesheets(
        &TimesheetFilter::for_projects(book.project_ids()).between(window.start, window.end),
    )?;
    let hourly_costs: HashMap<EmployeeId, f64> = ctx
        .store
        .employees(ctx.company_id)?
        .into_iter()
        .filter_map(|e| e.hourly_cost.map(|cost| (e.id, cost)))
        .collect();
    debug!("Projects: {} timesheet line(s)", lines.len());

    for line in &lines {
        if let Some(slot) = book.slots.get(&line.project_id) {
            let work = &mut book.works[*slot];
            work.payroll += payroll_cost(line, &hourly_costs);
            work.hours += line.hours;
        }
    }
    Ok(())
}

/// One row per tagged project reached by the window's orders and admitted by
/// `filter`. Untagged projects never appear.
pub fn projects_section(
    ctx: &MetricContext,
    acc: &mut PeriodAccumulator,
    filter: RegionFilter,
) -> Result<ProjectsSection> {
    let index = ctx.index();
    let mut book = tally_orders(ctx, acc, |project_id| {
        let region = index.region_of(project_id);
        matches!(region, Region::Local | Region::Export | Region::Mixed) && filter.admits(region)
    })?;
    attach_documents(ctx, acc, &mut book)?;
    attach_payroll(ctx, acc, &mut book)?;

    let rows: Vec<ProjectRow> = book.works.iter().map(|w| w.row(ctx)).collect();

    let total = |f: fn(&ProjectRow) -> f64| round2(rows.iter().map(f).sum());
    let total_po_value = total(|r| r.po_value);
    let total_margin = total(|r| r.total_margin);
    let summary = ProjectSummary {
        project_count: rows.len(),
        total_po_value,
        total_invoiced: total(|r| r.invoiced),
        total_collected: total(|r| r.collected),
        total_pending_collection: total(|r| r.pending_collection),
        total_vendor_invoice: total(|r| r.vendor_invoice),
        total_payment_made: total(|r| r.payment_made),
        total_payment_to_be_made: total(|r| r.payment_to_be_made),
        total_payroll_cost: total(|r| r.payroll_cost),
        total_outgoing: total(|r| r.total_outgoing),
        total_margin,
        avg_margin_percent: if total_po_value > 0.0 {
            round2(total_margin / total_po_value * 100.0)
        } else {
            0.0
        },
    };

    Ok(ProjectsSection { rows, summary })
}

/// Milestones, totals and payroll of a single project. The project does not
/// need a region tag.
pub fn project_detail(
    ctx: &MetricContext,
    acc: &mut PeriodAccumulator,
    project_id: ProjectId,
) -> Result<ProjectDetail> {
    if ctx.index().project(project_id).is_none() {
        return Err(ReportError::UnknownProject(project_id));
    }

    let mut book = tally_orders(ctx, acc, |id| id == project_id)?;
    book.slot_for(project_id);
    attach_documents(ctx, acc, &mut book)?;
    attach_payroll(ctx, acc, &mut book)?;

    let work = book
        .works
        .into_iter()
        .find(|w| w.project_id == project_id)
        .ok_or(ReportError::UnknownProject(project_id))?;

    Ok(ProjectDetail {
        row: work.row(ctx),
        hours: round2(work.hours),
        customer_milestones: work.customer.into_iter().map(Milestone::rounded).collect(),
        vendor_milestones: work.vendor.into_iter().map(Milestone::rounded).collect(),
    })
}
