//! Event handlers: one entry point per real-world trigger that perturbs a
//! loan's balance or schedule.

pub mod deferral;
pub mod failure;
pub mod modification;
pub mod payment;

use std::slice;

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::config::EngineConfig;
use crate::decimal::Money;
use crate::errors::{Result, ScheduleError};
use crate::events::{EventStore, ScheduleEvent};
use crate::ledger::LedgerStore;
use crate::schedule::{
    Breakdown, PaymentFrequency, ReconcileOutcome, RecalculationParams, RowError, ScheduleReconciler,
    ScheduleRecalculator,
};
use crate::state::{Loan, LoanUpdate, ScheduledPayment};
use crate::types::{LoanId, PaymentId};

pub use deferral::{DeferralMode, FeeCharge, FeePolicy};
pub use modification::{ModificationTerms, ScheduleOverride};

/// outcome of a handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalculationResult {
    pub loan_id: LoanId,
    pub new_remaining_balance: Money,
    pub updated_count: usize,
    pub inserted_count: usize,
    pub cancelled_count: usize,
    /// `None` when the handler did not recalculate
    pub breakdown: Option<Breakdown>,
    pub errors: Vec<RowError>,
    /// row created or rewritten by the handler itself
    pub affected_payment: Option<PaymentId>,
}

impl RecalculationResult {
    fn reconciled(
        loan_id: LoanId,
        new_remaining_balance: Money,
        breakdown: Breakdown,
        outcome: ReconcileOutcome,
        affected_payment: Option<PaymentId>,
    ) -> Self {
        Self {
            loan_id,
            new_remaining_balance,
            updated_count: outcome.updated_count,
            inserted_count: outcome.inserted_count,
            cancelled_count: outcome.cancelled_count,
            breakdown: Some(breakdown),
            errors: outcome.errors,
            affected_payment,
        }
    }

    /// no row write failed
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    /// balance change stands but the future schedule needs a repair run
    pub fn is_partial_failure(&self) -> bool {
        !self.errors.is_empty()
    }

    /// false when the recalculated schedule hit the period cap
    pub fn fully_amortizing(&self) -> bool {
        self.breakdown.as_ref().map(|b| b.converged).unwrap_or(true)
    }
}

/// loan payment schedule engine
#[derive(Debug, Clone)]
pub struct ScheduleEngine {
    config: EngineConfig,
}

impl ScheduleEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn recalculator(&self) -> ScheduleRecalculator<'_> {
        ScheduleRecalculator::new(&self.config.calendar)
    }

    fn load_active_loan<S: LedgerStore>(&self, store: &S, loan_id: LoanId) -> Result<Loan> {
        let loan = store.get_loan(loan_id)?;
        if !loan.is_active() {
            return Err(ScheduleError::LoanNotActive {
                loan_id,
                status: loan.status,
            });
        }
        Ok(loan)
    }

    /// recalculate from `first_payment_date` with the loan's current balance
    /// and contracted terms, then reconcile rows due on or after `effective_from`
    #[allow(clippy::too_many_arguments)]
    fn rebuild_schedule<S: LedgerStore>(
        &self,
        store: &mut S,
        loan: &Loan,
        first_payment_date: NaiveDate,
        effective_from: NaiveDate,
        max_periods: u32,
        reason: &str,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<(Breakdown, ReconcileOutcome)> {
        let breakdown = self.recalculator().recalculate(&RecalculationParams {
            starting_balance: loan.remaining_balance,
            payment_amount: loan.terms.payment_amount,
            frequency: loan.terms.frequency,
            annual_rate: loan.annual_rate,
            first_payment_date,
            max_periods,
        })?;

        self.reconcile(store, loan.id, breakdown, effective_from, reason, time_provider, events)
    }

    #[allow(clippy::too_many_arguments)]
    fn reconcile<S: LedgerStore>(
        &self,
        store: &mut S,
        loan_id: LoanId,
        breakdown: Breakdown,
        effective_from: NaiveDate,
        reason: &str,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<(Breakdown, ReconcileOutcome)> {
        if !breakdown.converged {
            events.emit(ScheduleEvent::NonConvergentSchedule {
                loan_id,
                periods: breakdown.len(),
                remaining_balance: breakdown.final_balance(),
            });
        }

        let outcome =
            ScheduleReconciler::reconcile(store, loan_id, &breakdown, effective_from, reason, time_provider)?;

        events.emit(ScheduleEvent::ScheduleReconciled {
            loan_id,
            updated_count: outcome.updated_count,
            inserted_count: outcome.inserted_count,
            cancelled_count: outcome.cancelled_count,
            error_count: outcome.errors.len(),
            reason: reason.to_string(),
        });

        if !outcome.is_clean() {
            warn!(
                %loan_id,
                errors = outcome.errors.len(),
                "schedule left inconsistent, balance change kept; re-run reconciliation to repair"
            );
        }

        Ok((breakdown, outcome))
    }

    /// write the rows paired with an already-applied loan update, restoring
    /// the loan record if the write fails
    fn write_rows_or_revert<S: LedgerStore>(
        &self,
        store: &mut S,
        loan_before: &Loan,
        rows: &[ScheduledPayment],
        events: &mut EventStore,
    ) -> Result<()> {
        let err = match store.upsert_schedule_entries(loan_before.id, rows) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        let loan_id = loan_before.id;
        warn!(%loan_id, error = %err, "paired schedule write failed, reverting loan balance");
        let revert = LoanUpdate::balance(loan_before.remaining_balance)
            .with_status(loan_before.status)
            .with_unapplied_charges(loan_before.unapplied_charges);

        match store.update_loan(loan_id, revert) {
            Ok(_) => {
                events.emit(ScheduleEvent::BalanceReverted {
                    loan_id,
                    restored_balance: loan_before.remaining_balance,
                    reason: err.to_string(),
                });
                Err(ScheduleError::persistence(format!("{}; loan balance reverted", err)))
            }
            Err(revert_err) => {
                error!(%loan_id, error = %revert_err, "loan balance revert failed");
                Err(ScheduleError::persistence(format!(
                    "{}; revert of loan balance also failed: {}",
                    err, revert_err
                )))
            }
        }
    }

    fn write_row_or_revert<S: LedgerStore>(
        &self,
        store: &mut S,
        loan_before: &Loan,
        row: &ScheduledPayment,
        events: &mut EventStore,
    ) -> Result<()> {
        self.write_rows_or_revert(store, loan_before, slice::from_ref(row), events)
    }
}

/// due date of the first pending row due on or after `from`, falling back to
/// one period after `anchor` when nothing is pending
fn next_due_date(
    entries: &[ScheduledPayment],
    from: NaiveDate,
    anchor: NaiveDate,
    frequency: PaymentFrequency,
) -> Result<NaiveDate> {
    entries
        .iter()
        .filter(|e| e.is_pending() && e.due_date >= from)
        .map(|e| e.due_date)
        .min()
        .or_else(|| frequency.advance(anchor))
        .ok_or_else(|| ScheduleError::InvalidDate {
            date: anchor,
            reason: "next due date is outside the supported date range".to_string(),
        })
}

fn day_after(date: NaiveDate) -> Result<NaiveDate> {
    date.succ_opt().ok_or_else(|| ScheduleError::InvalidDate {
        date,
        reason: "no following day".to_string(),
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::types::PaymentStatus;

    #[test]
    fn test_next_due_date_prefers_pending_rows() {
        let engine = engine();
        let (ledger, loan_id) = seeded(&engine);
        let rows = ledger.entries(loan_id);

        let next = next_due_date(&rows, date(2024, 2, 2), date(2024, 2, 1), PaymentFrequency::Monthly).unwrap();
        assert_eq!(next, date(2024, 3, 1));

        let none_pending: Vec<_> = rows
            .into_iter()
            .map(|mut r| {
                r.status = PaymentStatus::Paid;
                r
            })
            .collect();
        let next =
            next_due_date(&none_pending, date(2024, 2, 2), date(2024, 2, 1), PaymentFrequency::Monthly).unwrap();
        assert_eq!(next, date(2024, 3, 1));
    }

    #[test]
    fn test_engine_rejects_invalid_config() {
        let config = EngineConfig {
            max_periods: 0,
            ..EngineConfig::default()
        };
        assert!(ScheduleEngine::new(config).is_err());
    }
}
