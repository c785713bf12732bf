use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::decimal::Money;
use crate::errors::{Result, ScheduleError};
use crate::events::{EventStore, ScheduleEvent};
use crate::handlers::{RecalculationResult, ScheduleEngine};
use crate::ledger::LedgerStore;
use crate::schedule::{next_sequence_number, PaymentFrequency, RowError};
use crate::state::{Loan, LoanUpdate, ScheduledPayment};
use crate::types::{LoanId, PaymentId, PaymentStatus};

/// where a move-to-end deferral fee lands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeePolicy {
    /// charged on the relocated payment as interest and held on the loan as
    /// an unapplied charge until the next rebuild
    #[default]
    AddToPayment,
    /// added to the loan balance and collected as principal
    AddToBalance,
}

/// when a reschedule fee is collected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeCharge {
    /// on the rescheduled payment itself
    #[default]
    Immediate,
    /// as a separate payment after the last scheduled one
    TrailingEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DeferralMode {
    /// skip the payment now and collect it after the last scheduled one
    MoveToEnd {
        #[serde(default)]
        fee: Money,
        #[serde(default)]
        fee_policy: FeePolicy,
    },
    /// move the payment to another date
    Reschedule {
        new_date: NaiveDate,
        #[serde(default)]
        fee: Money,
        #[serde(default)]
        fee_charge: FeeCharge,
    },
}

impl DeferralMode {
    pub fn fee(&self) -> Money {
        match self {
            DeferralMode::MoveToEnd { fee, .. } | DeferralMode::Reschedule { fee, .. } => *fee,
        }
    }
}

impl ScheduleEngine {
    /// defer a pending payment
    pub fn defer_payment<S: LedgerStore>(
        &self,
        store: &mut S,
        loan_id: LoanId,
        payment_id: PaymentId,
        mode: DeferralMode,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<RecalculationResult> {
        let loan = self.load_active_loan(store, loan_id)?;
        let row = store.get_schedule_entry(loan_id, payment_id)?;
        if !row.is_pending() {
            return Err(ScheduleError::InvalidEntryStatus {
                payment_id,
                status: row.status,
                expected: PaymentStatus::Pending,
            });
        }
        let fee = mode.fee();
        if fee.is_negative() {
            return Err(ScheduleError::InvalidAmount {
                amount: fee,
                reason: "deferral fee cannot be negative".to_string(),
            });
        }

        match mode {
            DeferralMode::MoveToEnd { fee, fee_policy } => {
                self.move_to_end(store, &loan, row, fee, fee_policy, time_provider, events)
            }
            DeferralMode::Reschedule {
                new_date,
                fee,
                fee_charge,
            } => self.reschedule(store, &loan, row, new_date, fee, fee_charge, time_provider, events),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn move_to_end<S: LedgerStore>(
        &self,
        store: &mut S,
        loan: &Loan,
        original: ScheduledPayment,
        fee: Money,
        fee_policy: FeePolicy,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<RecalculationResult> {
        let loan_id = loan.id;
        let sequence = original.sequence_number;
        let now = time_provider.now();
        let entries = store.list_schedule_entries(loan_id)?;

        let mut deferred = original.clone();
        deferred.zero_out();
        deferred.remaining_balance = original.remaining_balance + original.principal;
        deferred.status = PaymentStatus::Deferred;
        deferred.append_note(now, "deferred to the end of the schedule");

        // later snapshots keep carrying the principal until the relocated row collects it
        let shifted: Vec<ScheduledPayment> = if original.principal.is_zero() {
            Vec::new()
        } else {
            entries
                .iter()
                .filter(|e| e.is_pending() && e.sequence_number > sequence)
                .cloned()
                .map(|mut e| {
                    e.remaining_balance = e.remaining_balance + original.principal;
                    e.append_note(now, format!("balance snapshot shifted by deferral of #{}", sequence));
                    e
                })
                .collect()
        };

        let current: Vec<ScheduledPayment> = entries
            .iter()
            .map(|e| {
                if e.id == deferred.id {
                    deferred.clone()
                } else {
                    shifted
                        .iter()
                        .find(|s| s.id == e.id)
                        .cloned()
                        .unwrap_or_else(|| e.clone())
                }
            })
            .collect();
        let tail = schedule_tail(&current).unwrap_or(&deferred);
        let due_date = self.date_after(tail.due_date, loan.terms.frequency)?;

        let balance_fee = match fee_policy {
            FeePolicy::AddToPayment => Money::ZERO,
            FeePolicy::AddToBalance => fee,
        };
        let mut relocated = ScheduledPayment::new(loan_id, next_sequence_number(&entries), due_date, PaymentStatus::Pending);
        relocated.amount = original.amount + fee;
        relocated.interest = original.interest + (fee - balance_fee);
        relocated.principal = original.principal + balance_fee;
        relocated.remaining_balance = (tail.remaining_balance - relocated.principal).floor_zero();
        relocated.append_note(now, format!("relocated from #{} due {}", sequence, original.due_date));

        let primary = [deferred, relocated.clone()];
        let new_balance = loan.remaining_balance + balance_fee;
        self.write_with_fee(store, loan, new_balance, fee - balance_fee, &primary, events)?;

        let mut errors = Vec::new();
        let mut updated_count = 1;
        for row in &shifted {
            match store.upsert_schedule_entries(loan_id, std::slice::from_ref(row)) {
                Ok(()) => {
                    debug!(%loan_id, sequence = row.sequence_number, "balance snapshot shifted");
                    updated_count += 1;
                }
                Err(e) => {
                    warn!(%loan_id, sequence = row.sequence_number, error = %e, "balance snapshot shift failed");
                    errors.push(RowError {
                        sequence_number: row.sequence_number,
                        message: e.to_string(),
                    });
                }
            }
        }

        events.emit(ScheduleEvent::PaymentDeferred {
            loan_id,
            payment_id: original.id,
            relocated_to: relocated.id,
            relocated_due_date: relocated.due_date,
            fee,
        });
        info!(
            %loan_id,
            sequence,
            relocated_sequence = relocated.sequence_number,
            relocated_due = %relocated.due_date,
            %fee,
            ?fee_policy,
            "payment moved to end of schedule"
        );

        Ok(RecalculationResult {
            loan_id,
            new_remaining_balance: new_balance,
            updated_count,
            inserted_count: 1,
            cancelled_count: 0,
            breakdown: None,
            errors,
            affected_payment: Some(relocated.id),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn reschedule<S: LedgerStore>(
        &self,
        store: &mut S,
        loan: &Loan,
        original: ScheduledPayment,
        new_date: NaiveDate,
        fee: Money,
        fee_charge: FeeCharge,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<RecalculationResult> {
        let loan_id = loan.id;
        let now = time_provider.now();
        if new_date < now.date_naive() {
            return Err(ScheduleError::InvalidDate {
                date: new_date,
                reason: "cannot reschedule into the past".to_string(),
            });
        }
        let entries = store.list_schedule_entries(loan_id)?;

        let old_due_date = original.due_date;
        let mut moved = original;
        moved.due_date = self.config.calendar.next_business_day(new_date);
        moved.append_note(now, format!("rescheduled from {} to {}", old_due_date, moved.due_date));

        let mut rows = Vec::with_capacity(2);
        match fee_charge {
            FeeCharge::Immediate if fee.is_positive() => {
                moved.amount = moved.amount + fee;
                moved.interest = moved.interest + fee;
                moved.append_note(now, format!("reschedule fee {} added", fee));
            }
            FeeCharge::TrailingEntry if fee.is_positive() => {
                let current: Vec<ScheduledPayment> = entries
                    .iter()
                    .map(|e| if e.id == moved.id { moved.clone() } else { e.clone() })
                    .collect();
                let tail = schedule_tail(&current).unwrap_or(&moved);
                let due_date = self.date_after(tail.due_date, loan.terms.frequency)?;

                let mut trailing =
                    ScheduledPayment::new(loan_id, next_sequence_number(&entries), due_date, PaymentStatus::Pending);
                trailing.amount = fee;
                trailing.interest = fee;
                trailing.remaining_balance = tail.remaining_balance;
                trailing.append_note(now, format!("reschedule fee for #{}", moved.sequence_number));
                rows.push(trailing);
            }
            _ => {}
        }
        rows.insert(0, moved.clone());

        self.write_with_fee(store, loan, loan.remaining_balance, fee, &rows, events)?;

        events.emit(ScheduleEvent::PaymentRescheduled {
            loan_id,
            payment_id: moved.id,
            old_due_date,
            new_due_date: moved.due_date,
            fee,
        });
        info!(
            %loan_id,
            sequence = moved.sequence_number,
            %old_due_date,
            new_due_date = %moved.due_date,
            %fee,
            "payment rescheduled"
        );

        Ok(RecalculationResult {
            loan_id,
            new_remaining_balance: loan.remaining_balance,
            updated_count: 1,
            inserted_count: rows.len() - 1,
            cancelled_count: 0,
            breakdown: None,
            errors: Vec::new(),
            affected_payment: Some(moved.id),
        })
    }

    /// write deferral rows, recording any fee first so a later rebuild of
    /// the schedule cannot drop it
    ///
    /// `charged_fee` is the part of the fee collected on a row rather than
    /// through the balance; it is held in `Loan::unapplied_charges`.
    fn write_with_fee<S: LedgerStore>(
        &self,
        store: &mut S,
        loan: &Loan,
        new_balance: Money,
        charged_fee: Money,
        rows: &[ScheduledPayment],
        events: &mut EventStore,
    ) -> Result<()> {
        if new_balance == loan.remaining_balance && charged_fee.is_zero() {
            return store.upsert_schedule_entries(loan.id, rows);
        }
        let update =
            LoanUpdate::balance(new_balance).with_unapplied_charges(loan.unapplied_charges + charged_fee);
        store.update_loan(loan.id, update)?;
        self.write_rows_or_revert(store, loan, rows, events)
    }

    /// business-adjusted date one period after `date`
    fn date_after(&self, date: NaiveDate, frequency: PaymentFrequency) -> Result<NaiveDate> {
        frequency
            .advance(date)
            .map(|d| self.config.calendar.next_business_day(d))
            .ok_or_else(|| ScheduleError::InvalidDate {
                date,
                reason: "next due date is outside the supported date range".to_string(),
            })
    }
}

/// latest-dated live row
fn schedule_tail(entries: &[ScheduledPayment]) -> Option<&ScheduledPayment> {
    entries
        .iter()
        .filter(|e| !e.is_cancelled())
        .max_by_key(|e| (e.due_date, e.sequence_number))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::*;

    fn money(s: &str) -> Money {
        Money::from_str_exact(s).unwrap()
    }

    fn move_to_end(fee: &str, fee_policy: FeePolicy) -> DeferralMode {
        DeferralMode::MoveToEnd {
            fee: money(fee),
            fee_policy,
        }
    }

    #[test]
    fn test_move_to_end_fee_on_payment() {
        let engine = engine();
        let (mut ledger, loan_id) = seeded(&engine);
        let target = ledger.entries(loan_id)[1].clone();
        let mut events = EventStore::new();

        let result = engine
            .defer_payment(
                &mut ledger,
                loan_id,
                target.id,
                move_to_end("25.00", FeePolicy::AddToPayment),
                &clock(),
                &mut events,
            )
            .unwrap();

        assert_eq!(result.new_remaining_balance, Money::from_major(1200));
        assert_eq!(result.inserted_count, 1);
        assert_eq!(result.updated_count, 6);
        assert!(result.success());
        let loan = ledger.get_loan(loan_id).unwrap();
        assert_eq!(loan.remaining_balance, Money::from_major(1200));
        assert_eq!(loan.unapplied_charges, money("25.00"));

        let rows = ledger.entries(loan_id);
        let deferred = &rows[1];
        assert_eq!(deferred.status, PaymentStatus::Deferred);
        assert!(deferred.amount.is_zero() && deferred.interest.is_zero() && deferred.principal.is_zero());
        assert_eq!(deferred.remaining_balance, money("1029.00"));

        // later snapshots carry the deferred 175.13
        assert_eq!(rows[2].remaining_balance, money("849.64"));
        assert_eq!(rows[6].remaining_balance, money("175.13"));

        let relocated = rows.last().unwrap();
        assert_eq!(relocated.sequence_number, 8);
        // 2024-09-01 is a sunday
        assert_eq!(relocated.due_date, date(2024, 9, 2));
        assert_eq!(relocated.amount, money("225.00"));
        assert_eq!(relocated.interest, money("49.87"));
        assert_eq!(relocated.principal, money("175.13"));
        assert_eq!(relocated.remaining_balance, Money::ZERO);
        assert_eq!(relocated.amount, relocated.interest + relocated.principal);

        assert!(matches!(
            events.events(),
            [ScheduleEvent::PaymentDeferred { relocated_to, .. }] if *relocated_to == relocated.id
        ));
    }

    #[test]
    fn test_move_to_end_fee_on_balance() {
        let engine = engine();
        let (mut ledger, loan_id) = seeded(&engine);
        let target = ledger.entries(loan_id)[1].clone();

        let result = engine
            .defer_payment(
                &mut ledger,
                loan_id,
                target.id,
                move_to_end("25.00", FeePolicy::AddToBalance),
                &clock(),
                &mut EventStore::new(),
            )
            .unwrap();

        assert_eq!(result.new_remaining_balance, money("1225.00"));
        let loan = ledger.get_loan(loan_id).unwrap();
        assert_eq!(loan.remaining_balance, money("1225.00"));
        assert!(loan.unapplied_charges.is_zero());

        let relocated = ledger.entries(loan_id).pop().unwrap();
        assert_eq!(relocated.amount, money("225.00"));
        assert_eq!(relocated.interest, money("24.87"));
        assert_eq!(relocated.principal, money("200.13"));
        assert_eq!(relocated.remaining_balance, Money::ZERO);
    }

    #[test]
    fn test_move_to_end_reverts_balance_when_rows_fail() {
        let engine = engine();
        let (mut ledger, loan_id) = seeded(&engine);
        let target = ledger.entries(loan_id)[1].clone();
        ledger.fail_upserts_for(8);
        let mut events = EventStore::new();

        let err = engine
            .defer_payment(
                &mut ledger,
                loan_id,
                target.id,
                move_to_end("25.00", FeePolicy::AddToBalance),
                &clock(),
                &mut events,
            )
            .unwrap_err();

        assert!(matches!(err, ScheduleError::Persistence { .. }));
        assert_eq!(ledger.get_loan(loan_id).unwrap().remaining_balance, Money::from_major(1200));
        assert!(ledger.entries(loan_id)[1].is_pending());
        assert_eq!(ledger.entries(loan_id).len(), 7);
        assert!(matches!(events.events(), [ScheduleEvent::BalanceReverted { .. }]));
    }

    #[test]
    fn test_fee_on_payment_reverts_when_rows_fail() {
        let engine = engine();
        let (mut ledger, loan_id) = seeded(&engine);
        let target = ledger.entries(loan_id)[1].clone();
        ledger.fail_upserts_for(8);
        let mut events = EventStore::new();

        let err = engine
            .defer_payment(
                &mut ledger,
                loan_id,
                target.id,
                move_to_end("25.00", FeePolicy::AddToPayment),
                &clock(),
                &mut events,
            )
            .unwrap_err();

        assert!(matches!(err, ScheduleError::Persistence { .. }));
        assert!(ledger.get_loan(loan_id).unwrap().unapplied_charges.is_zero());
        assert!(matches!(events.events(), [ScheduleEvent::BalanceReverted { .. }]));
    }

    #[test]
    fn test_fee_on_payment_survives_later_manual_payment() {
        let engine = engine();
        let (mut ledger, loan_id) = seeded(&engine);
        let target = ledger.entries(loan_id)[1].clone();
        let time = clock();
        let mut events = EventStore::new();

        engine
            .defer_payment(
                &mut ledger,
                loan_id,
                target.id,
                move_to_end("25.00", FeePolicy::AddToPayment),
                &time,
                &mut events,
            )
            .unwrap();

        // 10.00 only covers interest, so no principal comes off
        let result = engine
            .post_manual_payment(&mut ledger, loan_id, money("10.00"), date(2024, 1, 20), &time, &mut events)
            .unwrap();

        // the rebuild wrote over the relocated row, the fee now sits in the balance
        assert_eq!(result.new_remaining_balance, money("1225.00"));
        let loan = ledger.get_loan(loan_id).unwrap();
        assert_eq!(loan.remaining_balance, money("1225.00"));
        assert!(loan.unapplied_charges.is_zero());

        let breakdown = result.breakdown.unwrap();
        let scheduled_principal = breakdown
            .entries
            .iter()
            .fold(Money::ZERO, |sum, e| sum + e.principal);
        assert_eq!(scheduled_principal, money("1225.00"));
        assert_eq!(breakdown.final_balance(), Money::ZERO);
    }

    #[test]
    fn test_deferring_last_row() {
        let engine = engine();
        let (mut ledger, loan_id) = seeded(&engine);
        let target = ledger.entries(loan_id)[6].clone();

        engine
            .defer_payment(
                &mut ledger,
                loan_id,
                target.id,
                move_to_end("0.00", FeePolicy::AddToPayment),
                &clock(),
                &mut EventStore::new(),
            )
            .unwrap();

        let rows = ledger.entries(loan_id);
        assert_eq!(rows[6].remaining_balance, money("109.98"));
        let relocated = rows.last().unwrap();
        assert_eq!(relocated.amount, money("112.64"));
        assert_eq!(relocated.principal, money("109.98"));
        assert_eq!(relocated.remaining_balance, Money::ZERO);
        assert_eq!(relocated.due_date, date(2024, 9, 2));
    }

    #[test]
    fn test_reschedule_with_immediate_fee() {
        let engine = engine();
        let (mut ledger, loan_id) = seeded(&engine);
        let target = ledger.entries(loan_id)[2].clone();
        let mut events = EventStore::new();

        let result = engine
            .defer_payment(
                &mut ledger,
                loan_id,
                target.id,
                DeferralMode::Reschedule {
                    // a saturday
                    new_date: date(2024, 4, 13),
                    fee: money("10.00"),
                    fee_charge: FeeCharge::Immediate,
                },
                &clock(),
                &mut events,
            )
            .unwrap();

        assert_eq!(result.updated_count, 1);
        assert_eq!(result.inserted_count, 0);
        let moved = ledger.get_schedule_entry(loan_id, target.id).unwrap();
        assert_eq!(moved.due_date, date(2024, 4, 15));
        assert!(moved.is_pending());
        assert_eq!(moved.amount, money("210.00"));
        assert_eq!(moved.interest, money("30.64"));
        assert_eq!(moved.principal, target.principal);
        assert_eq!(ledger.entries(loan_id).len(), 7);
        assert_eq!(ledger.get_loan(loan_id).unwrap().unapplied_charges, money("10.00"));
        assert!(matches!(
            events.events(),
            [ScheduleEvent::PaymentRescheduled { old_due_date, .. }] if *old_due_date == date(2024, 4, 1)
        ));
    }

    #[test]
    fn test_reschedule_with_trailing_fee_entry() {
        let engine = engine();
        let (mut ledger, loan_id) = seeded(&engine);
        let target = ledger.entries(loan_id)[2].clone();

        let result = engine
            .defer_payment(
                &mut ledger,
                loan_id,
                target.id,
                DeferralMode::Reschedule {
                    new_date: date(2024, 4, 15),
                    fee: money("10.00"),
                    fee_charge: FeeCharge::TrailingEntry,
                },
                &clock(),
                &mut EventStore::new(),
            )
            .unwrap();

        assert_eq!(result.inserted_count, 1);
        let moved = ledger.get_schedule_entry(loan_id, target.id).unwrap();
        assert_eq!(moved.amount, target.amount);

        let trailing = ledger.entries(loan_id).pop().unwrap();
        assert_eq!(trailing.sequence_number, 8);
        assert_eq!(trailing.due_date, date(2024, 9, 2));
        assert_eq!(trailing.amount, money("10.00"));
        assert_eq!(trailing.interest, money("10.00"));
        assert!(trailing.principal.is_zero());
        assert!(trailing.remaining_balance.is_zero());
        assert_eq!(ledger.get_loan(loan_id).unwrap().unapplied_charges, money("10.00"));
    }

    #[test]
    fn test_reschedule_into_the_past_is_rejected() {
        let engine = engine();
        let (mut ledger, loan_id) = seeded(&engine);
        let target = ledger.entries(loan_id)[2].clone();

        let err = engine
            .defer_payment(
                &mut ledger,
                loan_id,
                target.id,
                DeferralMode::Reschedule {
                    new_date: date(2024, 1, 5),
                    fee: Money::ZERO,
                    fee_charge: FeeCharge::Immediate,
                },
                &clock(),
                &mut EventStore::new(),
            )
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidDate { .. }));
    }

    #[test]
    fn test_only_pending_rows_can_be_deferred() {
        let engine = engine();
        let (mut ledger, loan_id) = seeded(&engine);
        let mut rows = ledger.entries(loan_id);
        rows[0].status = PaymentStatus::Confirmed;
        let confirmed = rows[0].clone();
        ledger.insert_entries(loan_id, rows);

        let err = engine
            .defer_payment(
                &mut ledger,
                loan_id,
                confirmed.id,
                move_to_end("0.00", FeePolicy::AddToPayment),
                &clock(),
                &mut EventStore::new(),
            )
            .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidEntryStatus { .. }));
        assert_eq!(ledger.upsert_calls(), 0);
    }

    #[test]
    fn test_deferral_mode_json() {
        let mode: DeferralMode =
            serde_json::from_str(r#"{"mode":"move_to_end","fee":"25.00","fee_policy":"add_to_balance"}"#).unwrap();
        assert_eq!(mode, move_to_end("25.00", FeePolicy::AddToBalance));

        let mode: DeferralMode = serde_json::from_str(r#"{"mode":"reschedule","new_date":"2024-04-15"}"#).unwrap();
        assert_eq!(mode.fee(), Money::ZERO);
    }
}
