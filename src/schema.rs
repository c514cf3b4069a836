use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type RecordId = u64;
pub type LineId = u64;
pub type ProjectId = u64;
pub type AnalyticAccountId = u64;
pub type CompanyId = u64;
pub type EmployeeId = u64;
pub type TagId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    SaleOrder,
    CustomerInvoice,
    CustomerRefund,
    VendorBill,
    VendorRefund,
}

impl RecordKind {
    /// Refunds reduce the metric their invoice counterpart feeds.
    pub fn sign(&self) -> f64 {
        match self {
            Self::CustomerRefund | Self::VendorRefund => -1.0,
            _ => 1.0,
        }
    }

    pub fn is_customer_side(&self) -> bool {
        matches!(
            self,
            Self::SaleOrder | Self::CustomerInvoice | Self::CustomerRefund
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Draft,
    Sent,
    /// A confirmed sale order.
    Sale,
    Done,
    Posted,
    Cancelled,
}

impl RecordState {
    /// Only confirmed or posted documents ever feed an aggregate.
    pub fn participates(&self) -> bool {
        matches!(self, Self::Sale | Self::Done | Self::Posted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Sale => "sale",
            Self::Done => "done",
            Self::Posted => "posted",
            Self::Cancelled => "cancel",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    #[default]
    NotPaid,
    Partial,
    InPayment,
    Paid,
    Reversed,
}

impl PaymentState {
    /// Collected (customer side) or paid (vendor side).
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Paid | Self::InPayment)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotPaid => "not_paid",
            Self::Partial => "partial",
            Self::InPayment => "in_payment",
            Self::Paid => "paid",
            Self::Reversed => "reversed",
        }
    }
}

/// An analytic distribution exactly as the source system hands it over:
/// either an already structured account→weight map or serialized text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawDistribution {
    Structured(BTreeMap<String, serde_json::Value>),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordLine {
    pub id: LineId,
    #[serde(default)]
    pub description: Option<String>,
    pub subtotal: f64,
    #[serde(default)]
    pub analytic_distribution: Option<RawDistribution>,
    /// Sale order this invoice line was invoiced from, if any.
    #[serde(default)]
    pub sale_order_id: Option<RecordId>,
}

/// Sale order, customer invoice/refund or vendor bill/refund.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommercialRecord {
    pub id: RecordId,
    pub name: String,
    pub kind: RecordKind,
    pub state: RecordState,
    pub date: NaiveDate,
    pub currency: String,
    pub company_id: CompanyId,
    #[serde(default)]
    pub partner: Option<String>,
    #[serde(default)]
    pub salesperson: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub payment_state: PaymentState,
    pub amount_untaxed: f64,
    #[serde(default)]
    pub project_ids: Vec<ProjectId>,
    #[serde(default)]
    pub lines: Vec<RecordLine>,
}

impl CommercialRecord {
    /// Untaxed amount in document currency, before the refund sign.
    /// Line subtotals win; the header amount is the fallback when lines are
    /// missing or sum to zero.
    pub fn untaxed_total(&self) -> f64 {
        let lines_total: f64 = self.lines.iter().map(|l| l.subtotal).sum();
        if lines_total == 0.0 {
            self.amount_untaxed
        } else {
            lines_total
        }
    }

    pub fn signed_untaxed_total(&self) -> f64 {
        self.untaxed_total() * self.kind.sign()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: RecordId,
    pub name: String,
    pub date: NaiveDate,
    pub direction: PaymentDirection,
    pub state: RecordState,
    pub company_id: CompanyId,
    pub amount: f64,
    pub currency: String,
    /// Invoices (inbound) or bills (outbound) this payment is reconciled with.
    #[serde(default)]
    pub reconciled_document_ids: Vec<RecordId>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Income,
    DirectCost,
    Expense,
    Receivable,
    Payable,
    Cash,
    Other,
}

/// A journal item. Amounts are already in company currency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub id: u64,
    pub date: NaiveDate,
    pub company_id: CompanyId,
    pub account_kind: AccountKind,
    #[serde(default)]
    pub non_trade: bool,
    pub state: RecordState,
    pub debit: f64,
    pub credit: f64,
}

impl LedgerEntry {
    pub fn balance(&self) -> f64 {
        self.debit - self.credit
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    /// Tag names, e.g. "Local" or "Export".
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub analytic_account_id: Option<AnalyticAccountId>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub date_start: Option<NaiveDate>,
    #[serde(default)]
    pub date_end: Option<NaiveDate>,
}

impl Project {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimesheetLine {
    pub id: u64,
    pub date: NaiveDate,
    pub project_id: ProjectId,
    #[serde(default)]
    pub employee_id: Option<EmployeeId>,
    pub hours: f64,
    #[serde(default)]
    pub unit_cost: Option<f64>,
    /// Signed analytic amount; costs are negative.
    #[serde(default)]
    pub amount: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Employee {
    pub id: EmployeeId,
    pub name: String,
    pub company_id: CompanyId,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub hourly_cost: Option<f64>,
}

fn default_true() -> bool {
    true
}

/// Yearly sales target for one project tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SalesTarget {
    pub tag: String,
    pub year: i32,
    pub company_id: CompanyId,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub currency: String,
    #[serde(default)]
    pub country: Option<String>,
}
