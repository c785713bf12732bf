use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::decimal::Money;
use crate::errors::{Result, ScheduleError};
use crate::events::{EventStore, ScheduleEvent};
use crate::handlers::{next_due_date, RecalculationResult, ScheduleEngine};
use crate::ledger::LedgerStore;
use crate::schedule::{Breakdown, PaymentFrequency, RecalculationParams, RowError};
use crate::state::{LoanTerms, LoanUpdate};
use crate::types::{LoanId, LoanStatus, PaymentStatus};

/// operator-edited date and amount for one computed period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleOverride {
    pub due_date: NaiveDate,
    pub amount: Money,
}

/// new contracted terms for a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModificationTerms {
    pub payment_amount: Money,
    pub frequency: PaymentFrequency,
    pub number_of_periods: u32,
    /// defaults to the next pending due date
    #[serde(default)]
    pub first_payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub override_schedule: Vec<ScheduleOverride>,
}

impl ModificationTerms {
    fn validate(&self) -> Result<()> {
        if !self.payment_amount.is_positive() {
            return Err(ScheduleError::InvalidAmount {
                amount: self.payment_amount,
                reason: "payment amount must be positive".to_string(),
            });
        }
        if self.number_of_periods == 0 {
            return Err(ScheduleError::InvalidConfiguration {
                message: "number_of_periods must be at least 1".to_string(),
            });
        }
        if let Some(o) = self.override_schedule.iter().find(|o| o.amount.is_negative()) {
            return Err(ScheduleError::InvalidAmount {
                amount: o.amount,
                reason: format!("override for {} cannot be negative", o.due_date),
            });
        }
        Ok(())
    }
}

/// lay operator overrides over the computed entries, keeping interest and principal
fn apply_overrides(breakdown: &mut Breakdown, overrides: &[ScheduleOverride]) {
    if overrides.len() > breakdown.len() {
        warn!(
            overrides = overrides.len(),
            periods = breakdown.len(),
            "more overrides than computed periods, extras ignored"
        );
    }
    for (entry, o) in breakdown.entries.iter_mut().zip(overrides) {
        entry.due_date = o.due_date;
        entry.amount = o.amount;
    }
}

impl ScheduleEngine {
    /// re-term a loan and rebuild its future schedule
    pub fn modify_loan<S: LedgerStore>(
        &self,
        store: &mut S,
        loan_id: LoanId,
        terms: ModificationTerms,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<RecalculationResult> {
        let loan = self.load_active_loan(store, loan_id)?;
        terms.validate()?;

        let today = time_provider.now().date_naive();
        let entries = store.list_schedule_entries(loan_id)?;
        let first_payment_date = match terms.first_payment_date {
            Some(date) if date < today => {
                return Err(ScheduleError::InvalidDate {
                    date,
                    reason: "first payment date is in the past".to_string(),
                })
            }
            Some(date) => date,
            None => next_due_date(&entries, today, today, terms.frequency)?,
        };

        let adjusted_balance = loan.outstanding();
        let max_periods = terms.number_of_periods.min(self.config.max_periods);

        let mut breakdown = self.recalculator().recalculate(&RecalculationParams {
            starting_balance: adjusted_balance,
            payment_amount: terms.payment_amount,
            frequency: terms.frequency,
            annual_rate: loan.annual_rate,
            first_payment_date,
            max_periods,
        })?;
        apply_overrides(&mut breakdown, &terms.override_schedule);

        let new_terms = LoanTerms {
            payment_amount: terms.payment_amount,
            frequency: terms.frequency,
            number_of_periods: terms.number_of_periods,
        };
        let mut update = LoanUpdate::balance(adjusted_balance)
            .with_terms(new_terms)
            .with_unapplied_charges(Money::ZERO);
        if adjusted_balance.is_zero() {
            update = update.with_status(LoanStatus::Completed);
        }
        store.update_loan(loan_id, update)?;

        let (breakdown, outcome) =
            self.reconcile(store, loan_id, breakdown, today, "loan modification", time_provider, events)?;

        events.emit(ScheduleEvent::LoanModified {
            loan_id,
            payment_amount: terms.payment_amount,
            frequency: terms.frequency,
            number_of_periods: terms.number_of_periods,
            adjusted_balance,
        });
        info!(
            %loan_id,
            payment_amount = %terms.payment_amount,
            frequency = %terms.frequency,
            periods = breakdown.len(),
            %adjusted_balance,
            converged = breakdown.converged,
            "loan modified"
        );

        Ok(RecalculationResult::reconciled(loan_id, adjusted_balance, breakdown, outcome, None))
    }

    /// cancel every future pending or unresolved failed row, no recalculation
    pub fn stop_collection<S: LedgerStore>(
        &self,
        store: &mut S,
        loan_id: LoanId,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<RecalculationResult> {
        let loan = self.load_active_loan(store, loan_id)?;
        let now = time_provider.now();
        let today = now.date_naive();

        let targets: Vec<_> = store
            .list_schedule_entries(loan_id)?
            .into_iter()
            .filter(|e| {
                matches!(e.status, PaymentStatus::Pending | PaymentStatus::Failed) && e.due_date >= today
            })
            .collect();

        let mut cancelled_count = 0;
        let mut errors = Vec::new();
        for mut row in targets {
            row.status = PaymentStatus::Cancelled;
            row.append_note(now, "collection stopped");
            match store.upsert_schedule_entries(loan_id, std::slice::from_ref(&row)) {
                Ok(()) => {
                    debug!(%loan_id, sequence = row.sequence_number, "row cancelled");
                    cancelled_count += 1;
                }
                Err(e) => {
                    warn!(%loan_id, sequence = row.sequence_number, error = %e, "cancellation failed");
                    errors.push(RowError {
                        sequence_number: row.sequence_number,
                        message: e.to_string(),
                    });
                }
            }
        }

        events.emit(ScheduleEvent::CollectionStopped {
            loan_id,
            cancelled_count,
            timestamp: now,
        });
        info!(%loan_id, cancelled_count, errors = errors.len(), "collection stopped");

        Ok(RecalculationResult {
            loan_id,
            new_remaining_balance: loan.remaining_balance,
            updated_count: 0,
            inserted_count: 0,
            cancelled_count,
            breakdown: None,
            errors,
            affected_payment: None,
        })
    }
}
