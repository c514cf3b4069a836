use super::MetricContext;
use crate::aggregator::{Metric, PeriodAccumulator};
use crate::classifier::RegionAmounts;
use crate::config::BalanceSnapshot;
use crate::error::Result;
use crate::period::DateWindow;
use crate::schema::{AccountKind, RecordKind};
use crate::store::{LedgerFilter, RecordFilter};
use crate::utils::round2;
use log::debug;
use serde::Serialize;

/// Posts customer invoices minus customer refunds of the window as revenue.
pub fn post_revenue(ctx: &MetricContext, acc: &mut PeriodAccumulator) -> Result<usize> {
    let window = acc.window();
    let invoices = ctx.store.commercial_records(
        &RecordFilter::new(
            ctx.company_id,
            &[RecordKind::CustomerInvoice, RecordKind::CustomerRefund],
        )
        .between(window.start, window.end),
    )?;
    debug!("Revenue: {} invoice(s)/refund(s)", invoices.len());

    for invoice in &invoices {
        ctx.post(acc, Metric::Revenue, invoice, invoice.date);
    }
    Ok(invoices.len())
}

/// Posts vendor bills minus vendor refunds as regional expenses. Needs both
/// region tags configured.
pub fn post_vendor_bills(ctx: &MetricContext, acc: &mut PeriodAccumulator) -> Result<usize> {
    ctx.index().require_tags()?;

    let window = acc.window();
    let bills = ctx.store.commercial_records(
        &RecordFilter::new(ctx.company_id, &[RecordKind::VendorBill, RecordKind::VendorRefund])
            .between(window.start, window.end),
    )?;
    debug!("Expenses: {} bill(s)/refund(s)", bills.len());

    for bill in &bills {
        ctx.post(acc, Metric::Expenses, bill, bill.date);
    }
    Ok(bills.len())
}

/// Figures read straight from posted journal items, already in company
/// currency.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LedgerFigures {
    pub cost_of_revenue: f64,
    pub expenses: f64,
    pub receivable: f64,
    pub payable: f64,
}

pub fn ledger_figures(ctx: &MetricContext, window: DateWindow) -> Result<LedgerFigures> {
    let balance_of = |filter: LedgerFilter| -> Result<f64> {
        Ok(ctx
            .store
            .ledger_entries(&filter)?
            .iter()
            .map(|e| e.balance())
            .sum())
    };

    let cost_of_revenue = balance_of(
        LedgerFilter::new(ctx.company_id, &[AccountKind::DirectCost])
            .between(window.start, window.end),
    )?;
    let expenses = balance_of(
        LedgerFilter::new(ctx.company_id, &[AccountKind::Expense])
            .between(window.start, window.end),
    )?;

    let scoped = |filter: LedgerFilter| match ctx.config.balance_snapshot {
        BalanceSnapshot::AsOfEnd => filter.up_to(window.end),
        BalanceSnapshot::WithinPeriod => filter.between(window.start, window.end),
    };
    let receivable = balance_of(scoped(
        LedgerFilter::new(ctx.company_id, &[AccountKind::Receivable]).trade_only(),
    ))?;
    let payable = balance_of(scoped(LedgerFilter::new(
        ctx.company_id,
        &[AccountKind::Payable],
    )))?;

    Ok(LedgerFigures {
        cost_of_revenue,
        expenses: expenses.max(0.0),
        receivable: receivable.max(0.0),
        payable: payable.abs(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialSection {
    pub revenue: f64,
    pub cost_of_revenue: f64,
    pub gross_profit: f64,
    pub gross_profit_margin: f64,
    pub expenses: f64,
    pub net_profit: f64,
    pub net_profit_margin: f64,
    pub accounts_receivable: f64,
    pub accounts_payable: f64,
    pub net_position: f64,
    pub revenue_split: RegionAmounts,
    /// Vendor bills by region.
    pub expense_split: RegionAmounts,
}

pub fn summarize(acc: &PeriodAccumulator, ledger: &LedgerFigures) -> FinancialSection {
    let revenue_split = acc.split(Metric::Revenue);
    let revenue = revenue_split.total();

    let gross_profit = revenue - ledger.cost_of_revenue;
    let net_profit = gross_profit - ledger.expenses;
    let margin = |profit: f64| if revenue != 0.0 { profit / revenue * 100.0 } else { 0.0 };

    FinancialSection {
        revenue: round2(revenue),
        cost_of_revenue: round2(ledger.cost_of_revenue),
        gross_profit: round2(gross_profit),
        gross_profit_margin: round2(margin(gross_profit)),
        expenses: round2(ledger.expenses),
        net_profit: round2(net_profit),
        net_profit_margin: round2(margin(net_profit)),
        accounts_receivable: round2(ledger.receivable),
        accounts_payable: round2(ledger.payable),
        net_position: round2(ledger.receivable - ledger.payable),
        revenue_split: revenue_split.rounded(),
        expense_split: acc.split(Metric::Expenses).rounded(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReportConfig;
    use crate::currency::RateTable;
    use crate::error::ReportError;
    use crate::metrics::fixtures::*;
    use crate::period::ReportingPeriod;
    use crate::schema::{LedgerEntry, RecordState};

    fn entry(
        id: u64,
        on: (i32, u32, u32),
        kind: AccountKind,
        debit: f64,
        credit: f64,
    ) -> LedgerEntry {
        LedgerEntry {
            id,
            date: date(on.0, on.1, on.2),
            company_id: 1,
            account_kind: kind,
            non_trade: false,
            state: RecordState::Posted,
            debit,
            credit,
        }
    }

    #[test]
    fn test_usd_invoice_converted_to_export_revenue() {
        let mut store = store();
        store.records = vec![record(
            1,
            RecordKind::CustomerInvoice,
            date(2024, 3, 15),
            "USD",
            vec![export_line(1, 10000.0)],
        )];
        let rates = RateTable::new().with_rate("USD", "EUR", date(2024, 3, 15), 0.90);

        let acc = with_context(&store, &ReportConfig::default(), &rates, |ctx| {
            let mut acc = PeriodAccumulator::new(&ReportingPeriod::trend(2024)).unwrap();
            post_revenue(ctx, &mut acc).unwrap();
            acc
        });

        let split = acc.split(Metric::Revenue);
        assert!((split.export - 9000.0).abs() < 0.01);
        assert_eq!(split.local, 0.0);
        let monthly = acc.monthly(Metric::Revenue, crate::classifier::Region::Export);
        for (slot, value) in monthly.iter().enumerate() {
            if slot == 2 {
                assert!((value - 9000.0).abs() < 0.01);
            } else {
                assert_eq!(*value, 0.0);
            }
        }
    }

    #[test]
    fn test_bill_split_thirty_seventy() {
        let mut store = store();
        store.records = vec![record(
            1,
            RecordKind::VendorBill,
            date(2024, 6, 1),
            "EUR",
            vec![line(
                1,
                1000.0,
                Some(&format!(r#"{{"{}": 30, "{}": 70}}"#, LOCAL_AA, EXPORT_AA)),
            )],
        )];

        let acc = with_context(&store, &ReportConfig::default(), &RateTable::new(), |ctx| {
            let mut acc = PeriodAccumulator::new(&ReportingPeriod::full_year(2024)).unwrap();
            post_vendor_bills(ctx, &mut acc).unwrap();
            acc
        });

        let split = acc.split(Metric::Expenses);
        assert!((split.local - 300.0).abs() < 0.01);
        assert!((split.export - 700.0).abs() < 0.01);
    }

    #[test]
    fn test_refund_reduces_revenue() {
        let mut store = store();
        store.records = vec![
            record(
                1,
                RecordKind::CustomerInvoice,
                date(2024, 2, 1),
                "EUR",
                vec![local_line(1, 1000.0)],
            ),
            record(
                2,
                RecordKind::CustomerRefund,
                date(2024, 2, 5),
                "EUR",
                vec![local_line(2, 250.0)],
            ),
        ];

        let acc = with_context(&store, &ReportConfig::default(), &RateTable::new(), |ctx| {
            let mut acc = PeriodAccumulator::new(&ReportingPeriod::full_year(2024)).unwrap();
            post_revenue(ctx, &mut acc).unwrap();
            acc
        });
        assert!((acc.split(Metric::Revenue).local - 750.0).abs() < 0.01);
    }

    #[test]
    fn test_expense_split_requires_tags() {
        let mut store = store();
        store.tags.clear();

        let err = with_context(&store, &ReportConfig::default(), &RateTable::new(), |ctx| {
            let mut acc = PeriodAccumulator::new(&ReportingPeriod::full_year(2024)).unwrap();
            post_vendor_bills(ctx, &mut acc).unwrap_err()
        });
        assert!(matches!(err, ReportError::MissingRegionTag(_)));
    }

    #[test]
    fn test_profit_and_balances() {
        let mut store = store();
        store.records = vec![record(
            1,
            RecordKind::CustomerInvoice,
            date(2024, 4, 1),
            "EUR",
            vec![local_line(1, 10000.0)],
        )];
        store.ledger = vec![
            entry(1, (2024, 4, 2), AccountKind::DirectCost, 4000.0, 0.0),
            entry(2, (2024, 4, 3), AccountKind::Expense, 1000.0, 0.0),
            entry(3, (2023, 12, 1), AccountKind::Receivable, 500.0, 0.0),
            entry(4, (2024, 4, 1), AccountKind::Receivable, 10000.0, 0.0),
            entry(5, (2024, 4, 1), AccountKind::Payable, 0.0, 4000.0),
            entry(6, (2025, 1, 1), AccountKind::Receivable, 999.0, 0.0),
        ];

        let config = ReportConfig::default();
        let section = with_context(&store, &config, &RateTable::new(), |ctx| {
            let mut acc = PeriodAccumulator::new(&ReportingPeriod::full_year(2024)).unwrap();
            post_revenue(ctx, &mut acc).unwrap();
            let ledger = ledger_figures(ctx, acc.window()).unwrap();
            summarize(&acc, &ledger)
        });

        assert!((section.gross_profit - 6000.0).abs() < 0.01);
        assert!((section.gross_profit_margin - 60.0).abs() < 0.01);
        assert!((section.net_profit - 5000.0).abs() < 0.01);
        assert!((section.net_profit_margin - 50.0).abs() < 0.01);
        // point-in-time: includes the 2023 entry, excludes 2025
        assert!((section.accounts_receivable - 10500.0).abs() < 0.01);
        assert!((section.accounts_payable - 4000.0).abs() < 0.01);
        assert!((section.net_position - 6500.0).abs() < 0.01);
    }

    #[test]
    fn test_within_period_balances() {
        let mut store = store();
        store.ledger = vec![
            entry(1, (2023, 12, 1), AccountKind::Receivable, 500.0, 0.0),
            entry(2, (2024, 4, 1), AccountKind::Receivable, 100.0, 0.0),
        ];
        let config = ReportConfig {
            balance_snapshot: BalanceSnapshot::WithinPeriod,
            ..Default::default()
        };

        let figures = with_context(&store, &config, &RateTable::new(), |ctx| {
            let window = ReportingPeriod::full_year(2024).window().unwrap();
            ledger_figures(ctx, window).unwrap()
        });
        assert!((figures.receivable - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_zero_revenue_margins() {
        let acc = PeriodAccumulator::new(&ReportingPeriod::full_year(2024)).unwrap();
        let section = summarize(
            &acc,
            &LedgerFigures {
                cost_of_revenue: 100.0,
                ..Default::default()
            },
        );
        assert_eq!(section.gross_profit_margin, 0.0);
        assert_eq!(section.net_profit_margin, 0.0);
        assert!((section.gross_profit + 100.0).abs() < 0.01);
    }
}
