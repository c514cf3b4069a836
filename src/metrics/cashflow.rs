use super::MetricContext;
use crate::aggregator::{Metric, PeriodAccumulator};
use crate::classifier::RegionAmounts;
use crate::error::Result;
use crate::period::DateWindow;
use crate::schema::{CommercialRecord, Payment, PaymentDirection, RecordId, RecordKind};
use crate::store::{PaymentFilter, RecordFilter};
use crate::utils::round2;
use log::debug;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// A posted payment paired with one of the posted documents it settles.
#[derive(Debug, Clone)]
pub struct CashMovement {
    pub payment: Payment,
    pub document: CommercialRecord,
}

impl CashMovement {
    pub fn metric(&self) -> Metric {
        match self.payment.direction {
            PaymentDirection::Inbound => Metric::CashIn,
            PaymentDirection::Outbound => Metric::CashOut,
        }
    }
}

/// Payments of the window matched to the invoices (inbound) or bills
/// (outbound) they are reconciled with. Documents are loaded in one batch per
/// direction; payments without a posted document yield nothing.
pub fn reconciled_movements(ctx: &MetricContext, window: DateWindow) -> Result<Vec<CashMovement>> {
    let mut movements = Vec::new();

    for (direction, kind) in [
        (PaymentDirection::Inbound, RecordKind::CustomerInvoice),
        (PaymentDirection::Outbound, RecordKind::VendorBill),
    ] {
        let payments = ctx.store.payments(
            &PaymentFilter::new(ctx.company_id)
                .direction(direction)
                .between(window.start, window.end),
        )?;

        let ids: BTreeSet<RecordId> = payments
            .iter()
            .flat_map(|p| p.reconciled_document_ids.iter().copied())
            .collect();
        if ids.is_empty() {
            continue;
        }

        let documents: HashMap<RecordId, CommercialRecord> = ctx
            .store
            .commercial_records(
                &RecordFilter::new(ctx.company_id, &[kind]).with_ids(ids.into_iter().collect()),
            )?
            .into_iter()
            .map(|d| (d.id, d))
            .collect();

        debug!(
            "Cash flow {:?}: {} payment(s), {} reconciled document(s)",
            direction,
            payments.len(),
            documents.len()
        );

        for payment in payments {
            for id in &payment.reconciled_document_ids {
                if let Some(document) = documents.get(id) {
                    movements.push(CashMovement {
                        payment: payment.clone(),
                        document: document.clone(),
                    });
                }
            }
        }
    }

    Ok(movements)
}

/// Buckets each movement by payment date. The document's untaxed amount is
/// what counts, classified and converted at the document date.
pub fn post_cashflow(ctx: &MetricContext, acc: &mut PeriodAccumulator) -> Result<usize> {
    let movements = reconciled_movements(ctx, acc.window())?;
    for movement in &movements {
        ctx.post(acc, movement.metric(), &movement.document, movement.payment.date);
    }
    Ok(movements.len())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashflowSection {
    pub inflow: RegionAmounts,
    pub outflow: RegionAmounts,
    pub net: RegionAmounts,
    pub total_inflow: f64,
    pub total_outflow: f64,
    pub net_total: f64,
}

pub fn summarize(acc: &PeriodAccumulator) -> CashflowSection {
    let inflow = acc.split(Metric::CashIn);
    let outflow = acc.split(Metric::CashOut);
    let mut net = inflow;
    net.merge(&outflow.scaled(-1.0));

    CashflowSection {
        inflow: inflow.rounded(),
        outflow: outflow.rounded(),
        net: net.rounded(),
        total_inflow: round2(inflow.total()),
        total_outflow: round2(outflow.total()),
        net_total: round2(net.total()),
    }
}
