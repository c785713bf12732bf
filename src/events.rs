use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::schedule::PaymentFrequency;
use crate::types::{LoanId, PaymentId};

/// all events that can be emitted by the schedule engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScheduleEvent {
    // out-of-band payments
    ManualPaymentPosted {
        loan_id: LoanId,
        payment_id: PaymentId,
        amount: Money,
        principal_credit: Money,
        new_balance: Money,
        payment_date: NaiveDate,
    },
    RebatePosted {
        loan_id: LoanId,
        payment_id: PaymentId,
        amount: Money,
        principal_credit: Money,
        new_balance: Money,
        payment_date: NaiveDate,
    },

    // collection problems
    PaymentFailed {
        loan_id: LoanId,
        payment_id: PaymentId,
        interest: Money,
        fee: Money,
        new_balance: Money,
        error_code: String,
    },
    PaymentDeferred {
        loan_id: LoanId,
        payment_id: PaymentId,
        relocated_to: PaymentId,
        relocated_due_date: NaiveDate,
        fee: Money,
    },
    PaymentRescheduled {
        loan_id: LoanId,
        payment_id: PaymentId,
        old_due_date: NaiveDate,
        new_due_date: NaiveDate,
        fee: Money,
    },

    // re-terming
    LoanModified {
        loan_id: LoanId,
        payment_amount: Money,
        frequency: PaymentFrequency,
        number_of_periods: u32,
        adjusted_balance: Money,
    },
    CollectionStopped {
        loan_id: LoanId,
        cancelled_count: usize,
        timestamp: DateTime<Utc>,
    },

    // schedule maintenance
    ScheduleReconciled {
        loan_id: LoanId,
        updated_count: usize,
        inserted_count: usize,
        cancelled_count: usize,
        error_count: usize,
        reason: String,
    },
    NonConvergentSchedule {
        loan_id: LoanId,
        periods: usize,
        remaining_balance: Money,
    },
    BalanceReverted {
        loan_id: LoanId,
        restored_balance: Money,
        reason: String,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<ScheduleEvent>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: ScheduleEvent) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<ScheduleEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[ScheduleEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
