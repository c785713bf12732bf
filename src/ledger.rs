//! Persistence boundary. The engine reads and writes loans and schedule rows
//! only through [`LedgerStore`]; per-loan write ordering is the store's job.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::errors::{Result, ScheduleError};
use crate::state::{Loan, LoanUpdate, ScheduledPayment};
use crate::types::{LoanId, PaymentId};

/// record store for loans and their payment schedules
pub trait LedgerStore {
    fn get_loan(&self, loan_id: LoanId) -> Result<Loan>;

    fn update_loan(&mut self, loan_id: LoanId, update: LoanUpdate) -> Result<Loan>;

    /// all rows for the loan, ascending by sequence number
    fn list_schedule_entries(&self, loan_id: LoanId) -> Result<Vec<ScheduledPayment>>;

    /// insert or replace rows keyed by sequence number
    fn upsert_schedule_entries(&mut self, loan_id: LoanId, entries: &[ScheduledPayment]) -> Result<()>;

    /// single row lookup by id
    fn get_schedule_entry(&self, loan_id: LoanId, payment_id: PaymentId) -> Result<ScheduledPayment> {
        self.list_schedule_entries(loan_id)?
            .into_iter()
            .find(|entry| entry.id == payment_id)
            .ok_or(ScheduleError::PaymentNotFound { payment_id })
    }
}

/// in-process store with fault injection
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    loans: HashMap<LoanId, Loan>,
    schedules: HashMap<LoanId, BTreeMap<u32, ScheduledPayment>>,
    failing_sequences: HashSet<u32>,
    passing_loan_updates: usize,
    failing_loan_updates: usize,
    upsert_calls: usize,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_loan(&mut self, loan: Loan) {
        self.schedules.entry(loan.id).or_default();
        self.loans.insert(loan.id, loan);
    }

    /// seed rows directly, bypassing fault injection
    pub fn insert_entries(&mut self, loan_id: LoanId, entries: Vec<ScheduledPayment>) {
        let schedule = self.schedules.entry(loan_id).or_default();
        for entry in entries {
            schedule.insert(entry.sequence_number, entry);
        }
    }

    /// rows for a loan, empty when unknown
    pub fn entries(&self, loan_id: LoanId) -> Vec<ScheduledPayment> {
        self.schedules
            .get(&loan_id)
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }

    /// every upsert touching this sequence number fails until cleared
    pub fn fail_upserts_for(&mut self, sequence_number: u32) {
        self.failing_sequences.insert(sequence_number);
    }

    /// the next `count` loan updates fail
    pub fn fail_next_loan_updates(&mut self, count: usize) {
        self.fail_loan_updates_after(0, count);
    }

    /// let `skip` loan updates through, then fail the following `count`
    pub fn fail_loan_updates_after(&mut self, skip: usize, count: usize) {
        self.passing_loan_updates = skip;
        self.failing_loan_updates = count;
    }

    pub fn clear_failures(&mut self) {
        self.failing_sequences.clear();
        self.passing_loan_updates = 0;
        self.failing_loan_updates = 0;
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls
    }
}

impl LedgerStore for InMemoryLedger {
    fn get_loan(&self, loan_id: LoanId) -> Result<Loan> {
        self.loans
            .get(&loan_id)
            .cloned()
            .ok_or(ScheduleError::LoanNotFound { loan_id })
    }

    fn update_loan(&mut self, loan_id: LoanId, update: LoanUpdate) -> Result<Loan> {
        if self.passing_loan_updates > 0 {
            self.passing_loan_updates -= 1;
        } else if self.failing_loan_updates > 0 {
            self.failing_loan_updates -= 1;
            return Err(ScheduleError::persistence(format!(
                "update of loan {} rejected",
                loan_id
            )));
        }
        let loan = self
            .loans
            .get_mut(&loan_id)
            .ok_or(ScheduleError::LoanNotFound { loan_id })?;
        update.apply(loan);
        Ok(loan.clone())
    }

    fn list_schedule_entries(&self, loan_id: LoanId) -> Result<Vec<ScheduledPayment>> {
        if !self.loans.contains_key(&loan_id) {
            return Err(ScheduleError::LoanNotFound { loan_id });
        }
        Ok(self.entries(loan_id))
    }

    fn upsert_schedule_entries(&mut self, loan_id: LoanId, entries: &[ScheduledPayment]) -> Result<()> {
        self.upsert_calls += 1;
        if !self.loans.contains_key(&loan_id) {
            return Err(ScheduleError::LoanNotFound { loan_id });
        }
        // validate the whole batch before writing any of it
        for entry in entries {
            if entry.loan_id != loan_id {
                return Err(ScheduleError::persistence(format!(
                    "row {} belongs to loan {}, not {}",
                    entry.sequence_number, entry.loan_id, loan_id
                )));
            }
            if self.failing_sequences.contains(&entry.sequence_number) {
                return Err(ScheduleError::persistence(format!(
                    "write of row {} rejected",
                    entry.sequence_number
                )));
            }
        }
        let schedule = self.schedules.entry(loan_id).or_default();
        for entry in entries {
            schedule.insert(entry.sequence_number, entry.clone());
        }
        Ok(())
    }
}
