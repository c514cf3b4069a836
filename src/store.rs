//! Read-only access to the ERP data the reports are built from.
//!
//! Every trait method is one batch query. Implementations must apply the
//! filter predicates themselves; calculators never issue per-record lookups.

use crate::error::Result;
use crate::schema::{
    AccountKind, AnalyticAccountId, CommercialRecord, Company, CompanyId, Employee, LedgerEntry,
    Payment, PaymentDirection, Project, ProjectId, RecordId, RecordKind, RecordState, SalesTarget,
    Tag, TagId, TimesheetLine,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn in_range(date: NaiveDate, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
    from.map_or(true, |f| date >= f) && to.map_or(true, |t| date <= t)
}

/// Orders, invoices and bills. Only confirmed/posted records ever match.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFilter {
    pub company_id: CompanyId,
    pub kinds: Vec<RecordKind>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub ids: Option<Vec<RecordId>>,
}

impl RecordFilter {
    pub fn new(company_id: CompanyId, kinds: &[RecordKind]) -> Self {
        Self {
            company_id,
            kinds: kinds.to_vec(),
            date_from: None,
            date_to: None,
            ids: None,
        }
    }

    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.date_from = Some(from);
        self.date_to = Some(to);
        self
    }

    pub fn with_ids(mut self, ids: Vec<RecordId>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn matches(&self, record: &CommercialRecord) -> bool {
        record.company_id == self.company_id
            && record.state.participates()
            && self.kinds.contains(&record.kind)
            && in_range(record.date, self.date_from, self.date_to)
            && self.ids.as_ref().map_or(true, |ids| ids.contains(&record.id))
    }
}

/// Posted payments only.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentFilter {
    pub company_id: CompanyId,
    pub direction: Option<PaymentDirection>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl PaymentFilter {
    pub fn new(company_id: CompanyId) -> Self {
        Self {
            company_id,
            direction: None,
            date_from: None,
            date_to: None,
        }
    }

    pub fn direction(mut self, direction: PaymentDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.date_from = Some(from);
        self.date_to = Some(to);
        self
    }

    pub fn matches(&self, payment: &Payment) -> bool {
        payment.company_id == self.company_id
            && payment.state == RecordState::Posted
            && self.direction.map_or(true, |d| d == payment.direction)
            && in_range(payment.date, self.date_from, self.date_to)
    }
}

/// Posted journal items of the given account kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerFilter {
    pub company_id: CompanyId,
    pub account_kinds: Vec<AccountKind>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub include_non_trade: bool,
}

impl LedgerFilter {
    pub fn new(company_id: CompanyId, account_kinds: &[AccountKind]) -> Self {
        Self {
            company_id,
            account_kinds: account_kinds.to_vec(),
            date_from: None,
            date_to: None,
            include_non_trade: true,
        }
    }

    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.date_from = Some(from);
        self.date_to = Some(to);
        self
    }

    pub fn up_to(mut self, to: NaiveDate) -> Self {
        self.date_from = None;
        self.date_to = Some(to);
        self
    }

    pub fn trade_only(mut self) -> Self {
        self.include_non_trade = false;
        self
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        entry.company_id == self.company_id
            && entry.state == RecordState::Posted
            && self.account_kinds.contains(&entry.account_kind)
            && (self.include_non_trade || !entry.non_trade)
            && in_range(entry.date, self.date_from, self.date_to)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimesheetFilter {
    pub project_ids: Vec<ProjectId>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl TimesheetFilter {
    pub fn for_projects(project_ids: Vec<ProjectId>) -> Self {
        Self {
            project_ids,
            date_from: None,
            date_to: None,
        }
    }

    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.date_from = Some(from);
        self.date_to = Some(to);
        self
    }

    pub fn matches(&self, line: &TimesheetLine) -> bool {
        self.project_ids.contains(&line.project_id)
            && in_range(line.date, self.date_from, self.date_to)
    }
}

pub trait RecordStore {
    fn commercial_records(&self, filter: &RecordFilter) -> Result<Vec<CommercialRecord>>;

    fn payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>>;

    fn ledger_entries(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntry>>;

    fn timesheets(&self, filter: &TimesheetFilter) -> Result<Vec<TimesheetLine>>;

    fn employees(&self, company_id: CompanyId) -> Result<Vec<Employee>>;

    fn sales_targets(&self, company_id: CompanyId, year: i32) -> Result<Vec<SalesTarget>>;

    fn company(&self, company_id: CompanyId) -> Result<Option<Company>>;
}

pub trait ProjectDirectory {
    fn find_tag(&self, name: &str) -> Result<Option<TagId>>;

    fn projects_with_tag(&self, tag: TagId) -> Result<Vec<Project>>;

    fn project(&self, project_id: ProjectId) -> Result<Option<Project>>;

    fn projects(&self) -> Result<Vec<Project>>;

    fn analytic_account_of(&self, project: &Project) -> Option<AnalyticAccountId> {
        project.analytic_account_id
    }
}

/// A JSON-loadable snapshot of every collection the reports read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryStore {
    pub companies: Vec<Company>,
    pub records: Vec<CommercialRecord>,
    pub payments: Vec<Payment>,
    pub ledger: Vec<LedgerEntry>,
    pub timesheets: Vec<TimesheetLine>,
    pub employees: Vec<Employee>,
    pub sales_targets: Vec<SalesTarget>,
    pub tags: Vec<Tag>,
    pub projects: Vec<Project>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

impl RecordStore for InMemoryStore {
    fn commercial_records(&self, filter: &RecordFilter) -> Result<Vec<CommercialRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    fn payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>> {
        Ok(self
            .payments
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    fn ledger_entries(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .ledger
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }

    fn timesheets(&self, filter: &TimesheetFilter) -> Result<Vec<TimesheetLine>> {
        Ok(self
            .timesheets
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    fn employees(&self, company_id: CompanyId) -> Result<Vec<Employee>> {
        Ok(self
            .employees
            .iter()
            .filter(|e| e.company_id == company_id)
            .cloned()
            .collect())
    }

    fn sales_targets(&self, company_id: CompanyId, year: i32) -> Result<Vec<SalesTarget>> {
        Ok(self
            .sales_targets
            .iter()
            .filter(|t| t.company_id == company_id && t.year == year)
            .cloned()
            .collect())
    }

    fn company(&self, company_id: CompanyId) -> Result<Option<Company>> {
        Ok(self.companies.iter().find(|c| c.id == company_id).cloned())
    }
}

impl ProjectDirectory for InMemoryStore {
    fn find_tag(&self, name: &str) -> Result<Option<TagId>> {
        Ok(self.tags.iter().find(|t| t.name == name).map(|t| t.id))
    }

    fn projects_with_tag(&self, tag: TagId) -> Result<Vec<Project>> {
        let Some(tag) = self.tags.iter().find(|t| t.id == tag) else {
            return Ok(Vec::new());
        };
        Ok(self
            .projects
            .iter()
            .filter(|p| p.has_tag(&tag.name))
            .cloned()
            .collect())
    }

    fn project(&self, project_id: ProjectId) -> Result<Option<Project>> {
        Ok(self.projects.iter().find(|p| p.id == project_id).cloned())
    }

    fn projects(&self) -> Result<Vec<Project>> {
        Ok(self.projects.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PaymentState;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn invoice(id: RecordId, state: RecordState, on: NaiveDate) -> CommercialRecord {
        CommercialRecord {
            id,
            name: format!("INV/{}", id),
            kind: RecordKind::CustomerInvoice,
            state,
            date: on,
            currency: "EUR".to_string(),
            company_id: 1,
            partner: None,
            salesperson: None,
            origin: None,
            payment_state: PaymentState::NotPaid,
            amount_untaxed: 100.0,
            project_ids: vec![],
            lines: vec![],
        }
    }

    #[test]
    fn test_record_filter_excludes_drafts_and_out_of_window() {
        let store = InMemoryStore {
            records: vec![
                invoice(1, RecordState::Posted, date(2024, 3, 1)),
                invoice(2, RecordState::Draft, date(2024, 3, 1)),
                invoice(3, RecordState::Cancelled, date(2024, 3, 1)),
                invoice(4, RecordState::Posted, date(2025, 1, 1)),
            ],
            ..Default::default()
        };

        let filter = RecordFilter::new(1, &[RecordKind::CustomerInvoice])
            .between(date(2024, 1, 1), date(2024, 12, 31));
        let found = store.commercial_records(&filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 1);
    }

    #[test]
    fn test_record_filter_by_ids() {
        let store = InMemoryStore {
            records: vec![
                invoice(1, RecordState::Posted, date(2024, 3, 1)),
                invoice(2, RecordState::Posted, date(2024, 3, 1)),
            ],
            ..Default::default()
        };
        let filter = RecordFilter::new(1, &[RecordKind::CustomerInvoice]).with_ids(vec![2]);
        let found = store.commercial_records(&filter).unwrap();
        assert_eq!(found.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_projects_by_tag() {
        let store = InMemoryStore {
            tags: vec![
                Tag { id: 10, name: "Local".to_string() },
                Tag { id: 11, name: "Export".to_string() },
            ],
            projects: vec![Project {
                id: 1,
                name: "Harbour".to_string(),
                tags: vec!["Export".to_string()],
                analytic_account_id: Some(501),
                customer: None,
                date_start: None,
                date_end: None,
            }],
            ..Default::default()
        };

        assert_eq!(store.find_tag("Export").unwrap(), Some(11));
        assert_eq!(store.find_tag("Internal").unwrap(), None);
        assert!(store.projects_with_tag(10).unwrap().is_empty());
        let export = store.projects_with_tag(11).unwrap();
        assert_eq!(export.len(), 1);
        assert_eq!(store.analytic_account_of(&export[0]), Some(501));
    }

    #[test]
    fn test_load_snapshot_from_json() {
        let json = r#"{
            "companies": [{"id": 1, "name": "Acme", "currency": "EUR"}],
            "tags": [{"id": 1, "name": "Local"}]
        }"#;
        let store = InMemoryStore::from_json_str(json).unwrap();
        let company = store.company(1).unwrap().unwrap();
        assert_eq!(company.name, "Acme");
        assert!(company.country.is_none());
        assert!(store.records.is_empty());
    }
}
