use super::MetricContext;
use crate::aggregator::{Metric, PeriodAccumulator};
use crate::error::Result;
use crate::schema::RecordKind;
use crate::store::RecordFilter;
use crate::utils::{percentage_of, round2};
use log::debug;
use serde::Serialize;

/// Yearly targets, overall and for the two region tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SalesTargets {
    pub total: f64,
    pub local: f64,
    pub export: f64,
}

pub fn load_targets(ctx: &MetricContext, year: i32) -> Result<SalesTargets> {
    let records = ctx.store.sales_targets(ctx.company_id, year)?;
    if records.is_empty() {
        return Ok(SalesTargets {
            total: ctx.config.default_sales_target.unwrap_or(0.0),
            ..Default::default()
        });
    }

    let sum_for = |tag: &str| -> f64 {
        records
            .iter()
            .filter(|t| t.tag == tag)
            .map(|t| t.amount)
            .sum()
    };

    Ok(SalesTargets {
        total: records.iter().map(|t| t.amount).sum(),
        local: sum_for(&ctx.config.local_tag),
        export: sum_for(&ctx.config.export_tag),
    })
}

/// Posts confirmed sale orders of the accumulator's window. Returns the number
/// of orders found.
pub fn post_sales(ctx: &MetricContext, acc: &mut PeriodAccumulator) -> Result<usize> {
    let window = acc.window();
    let orders = ctx.store.commercial_records(
        &RecordFilter::new(ctx.company_id, &[RecordKind::SaleOrder])
            .between(window.start, window.end),
    )?;
    debug!("Sales: {} confirmed order(s) in {}", orders.len(), window.describe());

    for order in orders.iter().filter(|o| o.state.participates()) {
        ctx.post(acc, Metric::Sales, order, order.date);
    }
    Ok(orders.len())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionSales {
    pub amount: f64,
    pub target: f64,
    pub achievement: f64,
}

impl RegionSales {
    fn new(amount: f64, target: f64) -> Self {
        Self {
            amount: round2(amount),
            target: round2(target),
            achievement: round2(percentage_of(amount, target)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesSection {
    pub order_count: usize,
    pub sales_amount: f64,
    pub sales_target: f64,
    pub target_achievement: f64,
    pub local: RegionSales,
    pub export: RegionSales,
    pub other_amount: f64,
}

pub fn summarize(
    acc: &PeriodAccumulator,
    order_count: usize,
    targets: &SalesTargets,
) -> SalesSection {
    let split = acc.split(Metric::Sales);
    let amount = split.total();

    SalesSection {
        order_count,
        sales_amount: round2(amount),
        sales_target: round2(targets.total),
        target_achievement: round2(percentage_of(amount, targets.total)),
        local: RegionSales::new(split.local, targets.local),
        export: RegionSales::new(split.export, targets.export),
        other_amount: round2(split.other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReportConfig;
    use crate::currency::RateTable;
    use crate::metrics::fixtures::*;
    use crate::period::ReportingPeriod;
    use crate::schema::{RecordState, SalesTarget};

    fn target(tag: &str, amount: f64) -> SalesTarget {
        SalesTarget {
            tag: tag.to_string(),
            year: 2024,
            company_id: 1,
            amount,
        }
    }

    #[test]
    fn test_sales_split_and_targets() {
        let mut store = store();
        store.records = vec![
            record(1, RecordKind::SaleOrder, date(2024, 1, 10), "EUR", vec![local_line(1, 4000.0)]),
            record(
                2,
                RecordKind::SaleOrder,
                date(2024, 2, 10),
                "EUR",
                vec![export_line(2, 6000.0)],
            ),
        ];
        let mut draft = record(
            3,
            RecordKind::SaleOrder,
            date(2024, 2, 11),
            "EUR",
            vec![local_line(3, 999.0)],
        );
        draft.state = RecordState::Draft;
        store.records.push(draft);
        store.sales_targets = vec![target("Local", 8000.0), target("Export", 12000.0)];

        let section = with_context(&store, &ReportConfig::default(), &RateTable::new(), |ctx| {
            let mut acc = PeriodAccumulator::new(&ReportingPeriod::full_year(2024)).unwrap();
            let count = post_sales(ctx, &mut acc).unwrap();
            summarize(&acc, count, &load_targets(ctx, 2024).unwrap())
        });

        assert_eq!(section.order_count, 2);
        assert!((section.sales_amount - 10000.0).abs() < 0.01);
        assert!((section.sales_target - 20000.0).abs() < 0.01);
        assert!((section.target_achievement - 50.0).abs() < 0.01);
        assert!((section.local.achievement - 50.0).abs() < 0.01);
        assert!((section.export.amount - 6000.0).abs() < 0.01);
    }

    #[test]
    fn test_zero_target_means_zero_achievement() {
        let mut store = store();
        store.records = vec![record(
            1,
            RecordKind::SaleOrder,
            date(2024, 1, 10),
            "EUR",
            vec![local_line(1, 500.0)],
        )];
        store.sales_targets = vec![target("Local", 0.0)];

        let section = with_context(&store, &ReportConfig::default(), &RateTable::new(), |ctx| {
            let mut acc = PeriodAccumulator::new(&ReportingPeriod::full_year(2024)).unwrap();
            let count = post_sales(ctx, &mut acc).unwrap();
            summarize(&acc, count, &load_targets(ctx, 2024).unwrap())
        });
        assert_eq!(section.target_achievement, 0.0);
        assert!(section.target_achievement.is_finite());
    }

    #[test]
    fn test_default_target_when_none_recorded() {
        let store = store();
        let config = ReportConfig {
            default_sales_target: Some(1000.0),
            ..Default::default()
        };
        let targets = with_context(&store, &config, &RateTable::new(), |ctx| {
            load_targets(ctx, 2024).unwrap()
        });
        assert!((targets.total - 1000.0).abs() < 1e-9);
        assert_eq!(targets.local, 0.0);
    }
}
