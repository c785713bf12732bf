use std::slice;

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::ledger::LedgerStore;
use crate::schedule::Breakdown;
use crate::state::ScheduledPayment;
use crate::types::{LoanId, PaymentStatus};

/// a single row that could not be written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub sequence_number: u32,
    pub message: String,
}

/// counts of what a reconciliation changed
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub updated_count: usize,
    pub inserted_count: usize,
    pub cancelled_count: usize,
    pub errors: Vec<RowError>,
}

impl ReconcileOutcome {
    /// every row was written
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// highest sequence number in use plus one
pub fn next_sequence_number(entries: &[ScheduledPayment]) -> u32 {
    entries
        .iter()
        .map(|e| e.sequence_number)
        .max()
        .unwrap_or(0)
        + 1
}

/// merges a breakdown into a loan's persisted schedule
pub struct ScheduleReconciler;

impl ScheduleReconciler {
    /// overwrite, extend or cancel the loan's pending rows due on or after
    /// `effective_from` so they match `breakdown`
    ///
    /// Only a failure to read the schedule is returned as `Err`; failed row
    /// writes are collected in the outcome and the remaining rows proceed.
    /// Once an appended row fails, the entries after it are reported as
    /// errors instead of inserted, so a retry fills the numbers in order.
    pub fn reconcile<S: LedgerStore>(
        store: &mut S,
        loan_id: LoanId,
        breakdown: &Breakdown,
        effective_from: NaiveDate,
        reason: &str,
        time_provider: &SafeTimeProvider,
    ) -> Result<ReconcileOutcome> {
        let mut entries = store.list_schedule_entries(loan_id)?;
        entries.sort_by_key(|e| e.sequence_number);

        let mut next_sequence = next_sequence_number(&entries);
        let now = time_provider.now();
        let mut outcome = ReconcileOutcome::default();
        let mut blocked_at: Option<u32> = None;

        let mut candidates = entries
            .into_iter()
            .filter(|e| !e.status.is_locked() && e.due_date >= effective_from);

        for entry in &breakdown.entries {
            match candidates.next() {
                Some(mut row) => {
                    // already converged, a retry must not touch it
                    if row.matches_breakdown(entry) {
                        continue;
                    }
                    row.apply_breakdown(entry);
                    row.append_note(now, format!("recalculated: {}", reason));
                    match store.upsert_schedule_entries(loan_id, slice::from_ref(&row)) {
                        Ok(()) => {
                            debug!(%loan_id, sequence = row.sequence_number, "pending row updated");
                            outcome.updated_count += 1;
                        }
                        Err(e) => record_failure(&mut outcome, loan_id, row.sequence_number, e.to_string()),
                    }
                }
                None => {
                    // appends stop at the first failed insert so sequence numbers stay contiguous
                    if let Some(failed) = blocked_at {
                        record_failure(
                            &mut outcome,
                            loan_id,
                            next_sequence,
                            format!("not inserted: row {} failed to insert", failed),
                        );
                        next_sequence += 1;
                        continue;
                    }
                    let mut row = ScheduledPayment::pending_from(loan_id, next_sequence, entry);
                    next_sequence += 1;
                    row.append_note(now, format!("created by recalculation: {}", reason));
                    match store.upsert_schedule_entries(loan_id, slice::from_ref(&row)) {
                        Ok(()) => {
                            debug!(%loan_id, sequence = row.sequence_number, "pending row inserted");
                            outcome.inserted_count += 1;
                        }
                        Err(e) => {
                            blocked_at = Some(row.sequence_number);
                            record_failure(&mut outcome, loan_id, row.sequence_number, e.to_string());
                        }
                    }
                }
            }
        }

        for mut row in candidates {
            row.status = PaymentStatus::Cancelled;
            row.append_note(now, format!("cancelled as surplus: {}", reason));
            match store.upsert_schedule_entries(loan_id, slice::from_ref(&row)) {
                Ok(()) => {
                    debug!(%loan_id, sequence = row.sequence_number, "surplus row cancelled");
                    outcome.cancelled_count += 1;
                }
                Err(e) => record_failure(&mut outcome, loan_id, row.sequence_number, e.to_string()),
            }
        }

        Ok(outcome)
    }
}

fn record_failure(outcome: &mut ReconcileOutcome, loan_id: LoanId, sequence_number: u32, message: String) {
    warn!(%loan_id, sequence = sequence_number, error = %message, "schedule row write failed");
    outcome.errors.push(RowError {
        sequence_number,
        message,
    });
}
