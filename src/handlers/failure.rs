use hourglass_rs::SafeTimeProvider;
use tracing::info;

use crate::decimal::Money;
use crate::errors::{Result, ScheduleError};
use crate::events::{EventStore, ScheduleEvent};
use crate::handlers::{day_after, next_due_date, RecalculationResult, ScheduleEngine};
use crate::ledger::LedgerStore;
use crate::state::LoanUpdate;
use crate::types::{LoanId, PaymentId, PaymentStatus};

impl ScheduleEngine {
    /// record that a pending collection bounced
    ///
    /// The period's interest and the failure fee are rolled into the balance
    /// along with any unapplied charges. The row becomes a `failed` adjustment
    /// with a negative principal and the schedule is recalculated from the
    /// next due date. `fee` falls back to
    /// the configured failed-payment fee.
    pub fn simulate_failed_payment<S: LedgerStore>(
        &self,
        store: &mut S,
        loan_id: LoanId,
        payment_id: PaymentId,
        fee: Option<Money>,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<RecalculationResult> {
        let loan = self.load_active_loan(store, loan_id)?;
        let mut row = store.get_schedule_entry(loan_id, payment_id)?;
        if !row.is_pending() {
            return Err(ScheduleError::InvalidEntryStatus {
                payment_id,
                status: row.status,
                expected: PaymentStatus::Pending,
            });
        }

        let fee = fee.unwrap_or(self.config.failed_payment_fee);
        if fee.is_negative() {
            return Err(ScheduleError::InvalidAmount {
                amount: fee,
                reason: "failed payment fee cannot be negative".to_string(),
            });
        }
        let failed_due = row.due_date;
        let effective_from = day_after(failed_due)?;

        let interest = row.interest;
        let new_principal = loan.outstanding() + interest + fee;
        let entries = store.list_schedule_entries(loan_id)?;

        let updated = store.update_loan(
            loan_id,
            LoanUpdate::balance(new_principal).with_unapplied_charges(Money::ZERO),
        )?;

        let error_code = self.config.nsf_error_code.clone();
        row.zero_out();
        row.principal = -(interest + fee);
        row.remaining_balance = new_principal;
        row.status = PaymentStatus::Failed;
        row.error_code = Some(error_code.clone());
        row.append_note(
            time_provider.now(),
            format!("payment failed ({}): interest {} and fee {} added to balance", error_code, interest, fee),
        );
        self.write_row_or_revert(store, &loan, &row, events)?;

        events.emit(ScheduleEvent::PaymentFailed {
            loan_id,
            payment_id,
            interest,
            fee,
            new_balance: new_principal,
            error_code,
        });

        let first_payment_date = next_due_date(&entries, effective_from, failed_due, loan.terms.frequency)?;
        let reason = format!("failed payment #{}", row.sequence_number);
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
            sequence = row.sequence_number,
            %interest,
            %fee,
            %new_principal,
            "failed payment applied"
        );

        Ok(RecalculationResult::reconciled(loan_id, new_principal, breakdown, outcome, Some(payment_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::*;
    use crate::ledger::InMemoryLedger;
    use crate::state::ScheduledPayment;
    use crate::types::LoanStatus;

    fn money(s: &str) -> Money {
        Money::from_str_exact(s).unwrap()
    }

    /// first collection paid, loan at 1029.00, second row carrying 50.00 of interest
    fn after_first_payment(ledger: &mut InMemoryLedger, loan_id: LoanId) -> ScheduledPayment {
        let mut rows = ledger.entries(loan_id);
        rows[0].status = PaymentStatus::Paid;
        rows[1].interest = money("50.00");
        let target = rows[1].clone();
        ledger.insert_entries(loan_id, rows);
        ledger
            .update_loan(loan_id, LoanUpdate::balance(money("1029.00")))
            .unwrap();
        target
    }

    #[test]
    fn test_failed_payment_rolls_interest_and_fee_into_balance() {
        let engine = engine();
        let (mut ledger, loan_id) = seeded(&engine);
        let target = after_first_payment(&mut ledger, loan_id);
        let mut events = EventStore::new();

        let result = engine
            .simulate_failed_payment(&mut ledger, loan_id, target.id, None, &clock(), &mut events)
            .unwrap();

        assert_eq!(result.new_remaining_balance, money("1134.00"));
        assert_eq!(ledger.get_loan(loan_id).unwrap().remaining_balance, money("1134.00"));

        let failed = ledger.get_schedule_entry(loan_id, target.id).unwrap();
        assert_eq!(failed.status, PaymentStatus::Failed);
        assert_eq!(failed.amount, Money::ZERO);
        assert_eq!(failed.interest, Money::ZERO);
        assert_eq!(failed.principal, money("-105.00"));
        assert_eq!(failed.remaining_balance, money("1134.00"));
        assert_eq!(failed.error_code.as_deref(), Some("NSF"));
        assert_eq!(failed.due_date, target.due_date);

        // recalculated from the next due date with the larger balance
        let breakdown = result.breakdown.as_ref().unwrap();
        assert_eq!(breakdown.entries[0].due_date, date(2024, 4, 1));
        assert_eq!(breakdown.entries[0].interest, money("27.41"));
        assert_eq!(breakdown.entries[0].remaining_balance, money("961.41"));
        assert_eq!(breakdown.len(), 7);
        assert_eq!(result.updated_count, 5);
        assert_eq!(result.inserted_count, 2);
        assert!(result.success());

        let rows = ledger.entries(loan_id);
        assert_eq!(rows.len(), 9);
        assert_eq!(rows[0].status, PaymentStatus::Paid);
        assert_eq!(rows.last().unwrap().remaining_balance, Money::ZERO);

        assert!(matches!(
            events.events()[0],
            ScheduleEvent::PaymentFailed { fee, .. } if fee == money("55.00")
        ));
    }

    #[test]
    fn test_explicit_fee_overrides_config() {
        let engine = engine();
        let (mut ledger, loan_id) = seeded(&engine);
        let target = after_first_payment(&mut ledger, loan_id);

        let result = engine
            .simulate_failed_payment(&mut ledger, loan_id, target.id, Some(Money::ZERO), &clock(), &mut EventStore::new())
            .unwrap();
        assert_eq!(result.new_remaining_balance, money("1079.00"));
        let failed = ledger.get_schedule_entry(loan_id, target.id).unwrap();
        assert_eq!(failed.principal, money("-50.00"));
    }

    #[test]
    fn test_unapplied_charges_roll_into_failure_balance() {
        let engine = engine();
        let (mut ledger, loan_id) = seeded(&engine);
        let target = after_first_payment(&mut ledger, loan_id);
        ledger
            .update_loan(
                loan_id,
                LoanUpdate::balance(money("1029.00")).with_unapplied_charges(money("25.00")),
            )
            .unwrap();

        let result = engine
            .simulate_failed_payment(&mut ledger, loan_id, target.id, None, &clock(), &mut EventStore::new())
            .unwrap();

        // 1029.00 + 25.00 + 50.00 + 55.00
        assert_eq!(result.new_remaining_balance, money("1159.00"));
        let loan = ledger.get_loan(loan_id).unwrap();
        assert!(loan.unapplied_charges.is_zero());
        let failed = ledger.get_schedule_entry(loan_id, target.id).unwrap();
        assert_eq!(failed.principal, money("-105.00"));
        assert_eq!(failed.remaining_balance, money("1159.00"));
    }

    #[test]
    fn test_only_pending_rows_can_fail() {
        let engine = engine();
        let (mut ledger, loan_id) = seeded(&engine);
        after_first_payment(&mut ledger, loan_id);
        let paid = ledger.entries(loan_id)[0].clone();

        let err = engine
            .simulate_failed_payment(&mut ledger, loan_id, paid.id, None, &clock(), &mut EventStore::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::InvalidEntryStatus { status: PaymentStatus::Paid, .. }
        ));
        assert_eq!(ledger.get_loan(loan_id).unwrap().remaining_balance, money("1029.00"));
    }

    #[test]
    fn test_unknown_payment() {
        let engine = engine();
        let (mut ledger, loan_id) = seeded(&engine);
        let err = engine
            .simulate_failed_payment(&mut ledger, loan_id, uuid::Uuid::new_v4(), None, &clock(), &mut EventStore::new())
            .unwrap_err();
        assert!(matches!(err, ScheduleError::PaymentNotFound { .. }));
    }

    #[test]
    fn test_reconcile_row_failure_keeps_balance() {
        let engine = engine();
        let (mut ledger, loan_id) = seeded(&engine);
        let target = after_first_payment(&mut ledger, loan_id);
        ledger.fail_upserts_for(5);
        let mut events = EventStore::new();

        let result = engine
            .simulate_failed_payment(&mut ledger, loan_id, target.id, None, &clock(), &mut events)
            .unwrap();

        assert!(result.is_partial_failure());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].sequence_number, 5);
        let loan = ledger.get_loan(loan_id).unwrap();
        assert_eq!(loan.remaining_balance, money("1134.00"));
        assert_eq!(loan.status, LoanStatus::Active);

        // a repair run converges the schedule
        ledger.clear_failures();
        let breakdown = result.breakdown.unwrap();
        let repaired = crate::schedule::ScheduleReconciler::reconcile(
            &mut ledger,
            loan_id,
            &breakdown,
            date(2024, 3, 2),
            "repair",
            &clock(),
        )
        .unwrap();
        assert!(repaired.is_clean());
        assert_eq!(repaired.updated_count, 1);
    }
}
