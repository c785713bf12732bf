use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use tracing::info;

use crate::config::PrincipalCreditPolicy;
use crate::decimal::Money;
use crate::errors::{Result, ScheduleError};
use crate::events::{EventStore, ScheduleEvent};
use crate::handlers::{day_after, next_due_date, RecalculationResult, ScheduleEngine};
use crate::ledger::LedgerStore;
use crate::schedule::{next_sequence_number, AmortizationCalculator};
use crate::state::{Loan, LoanUpdate, ScheduledPayment};
use crate::types::{LoanId, LoanStatus, PaymentStatus};

/// how an out-of-band amount splits against the current balance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrincipalCredit {
    pub interest: Money,
    pub principal: Money,
}

impl PrincipalCredit {
    pub fn compute(loan: &Loan, amount: Money, policy: PrincipalCreditPolicy) -> Self {
        match policy {
            PrincipalCreditPolicy::InterestFirst => {
                let calculator = AmortizationCalculator::new(loan.annual_rate, loan.terms.frequency);
                let interest = calculator.period_interest(loan.remaining_balance).min(amount);
                Self {
                    interest,
                    principal: (amount - interest).floor_zero(),
                }
            }
            PrincipalCreditPolicy::FullAmount => Self {
                interest: Money::ZERO,
                principal: amount,
            },
        }
    }
}

impl ScheduleEngine {
    /// post a borrower payment made outside the schedule
    ///
    /// Under `PrincipalCreditPolicy::InterestFirst` one period of interest is
    /// taken first, so a payment equal to the balance leaves that interest
    /// outstanding and the loan stays active.
    pub fn post_manual_payment<S: LedgerStore>(
        &self,
        store: &mut S,
        loan_id: LoanId,
        amount: Money,
        payment_date: NaiveDate,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<RecalculationResult> {
        self.post_out_of_band(store, loan_id, amount, payment_date, PaymentStatus::Manual, time_provider, events)
    }

    /// post a voluntary extra payment
    pub fn post_rebate<S: LedgerStore>(
        &self,
        store: &mut S,
        loan_id: LoanId,
        amount: Money,
        payment_date: NaiveDate,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<RecalculationResult> {
        self.post_out_of_band(store, loan_id, amount, payment_date, PaymentStatus::Rebate, time_provider, events)
    }

    #[allow(clippy::too_many_arguments)]
    fn post_out_of_band<S: LedgerStore>(
        &self,
        store: &mut S,
        loan_id: LoanId,
        amount: Money,
        payment_date: NaiveDate,
        status: PaymentStatus,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<RecalculationResult> {
        let loan = self.load_active_loan(store, loan_id)?;

        if !amount.is_positive() {
            return Err(ScheduleError::InvalidAmount {
                amount,
                reason: format!("{} payment must be positive", status),
            });
        }
        if amount > loan.remaining_balance {
            return Err(ScheduleError::InvalidAmount {
                amount,
                reason: format!("exceeds remaining balance {}", loan.remaining_balance),
            });
        }
        let effective_from = day_after(payment_date)?;

        let credit = PrincipalCredit::compute(&loan, amount, self.config.principal_credit);
        // charges waiting on the loan are rolled in with the rebuild
        let new_balance = (loan.remaining_balance - credit.principal).floor_zero() + loan.unapplied_charges;
        let entries = store.list_schedule_entries(loan_id)?;

        let mut update = LoanUpdate::balance(new_balance).with_unapplied_charges(Money::ZERO);
        if new_balance.is_zero() {
            update = update.with_status(LoanStatus::Completed);
        }
        let updated = store.update_loan(loan_id, update)?;

        let now = time_provider.now();
        let mut row = ScheduledPayment::new(loan_id, next_sequence_number(&entries), payment_date, status);
        row.amount = amount;
        row.interest = credit.interest;
        row.principal = credit.principal;
        row.remaining_balance = new_balance;
        row.append_note(now, format!("{} payment of {} posted", status, amount));
        self.write_row_or_revert(store, &loan, &row, events)?;

        let posted = match status {
            PaymentStatus::Rebate => ScheduleEvent::RebatePosted {
                loan_id,
                payment_id: row.id,
                amount,
                principal_credit: credit.principal,
                new_balance,
                payment_date,
            },
            _ => ScheduleEvent::ManualPaymentPosted {
                loan_id,
                payment_id: row.id,
                amount,
                principal_credit: credit.principal,
                new_balance,
                payment_date,
            },
        };
        events.emit(posted);

        let first_payment_date = next_due_date(&entries, effective_from, payment_date, loan.terms.frequency)?;
        let reason = format!("{} payment on {}", status, payment_date);
        let (breakdown, outcome) = self.rebuild_schedule(
            store,
            &updated,
            first_payment_date,
            effective_from,
            self.config.max_periods,
            &reason,
            time_provider,
            events,
        )?;

        info!(
            %loan_id,
            %status,
            %amount,
            principal_credit = %credit.principal,
            %new_balance,
            periods = breakdown.len(),
            "out-of-band payment applied"
        );

        Ok(RecalculationResult::reconciled(loan_id, new_balance, breakdown, outcome, Some(row.id)))
    }
}
