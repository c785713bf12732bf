use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::schedule::{BreakdownEntry, PaymentFrequency};
use crate::types::{LoanId, LoanStatus, PaymentId, PaymentStatus};

/// contracted repayment terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub payment_amount: Money,
    pub frequency: PaymentFrequency,
    pub number_of_periods: u32,
}

/// loan record as persisted by the ledger store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub principal_amount: Money,
    pub annual_rate: Rate,
    /// authoritative, only moved through engine outputs
    pub remaining_balance: Money,
    pub status: LoanStatus,
    pub terms: LoanTerms,
    /// fees charged on pending rows and other charges not yet rolled into
    /// the balance; the next rebuild of the schedule rolls them in
    pub unapplied_charges: Money,
}

impl Loan {
    /// create an active loan with nothing repaid yet
    pub fn new(principal_amount: Money, annual_rate: Rate, terms: LoanTerms) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal_amount,
            annual_rate,
            remaining_balance: principal_amount,
            status: LoanStatus::Active,
            terms,
            unapplied_charges: Money::ZERO,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    /// balance plus charges waiting to be rolled in
    pub fn outstanding(&self) -> Money {
        self.remaining_balance + self.unapplied_charges
    }
}

/// partial update applied through the ledger store
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoanUpdate {
    pub remaining_balance: Money,
    pub status: Option<LoanStatus>,
    pub terms: Option<LoanTerms>,
    pub unapplied_charges: Option<Money>,
}

impl LoanUpdate {
    pub fn balance(remaining_balance: Money) -> Self {
        Self {
            remaining_balance,
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: LoanStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_terms(mut self, terms: LoanTerms) -> Self {
        self.terms = Some(terms);
        self
    }

    pub fn with_unapplied_charges(mut self, charges: Money) -> Self {
        self.unapplied_charges = Some(charges);
        self
    }

    /// apply onto a loan record
    pub fn apply(&self, loan: &mut Loan) {
        loan.remaining_balance = self.remaining_balance;
        if let Some(status) = self.status {
            loan.status = status;
        }
        if let Some(terms) = &self.terms {
            loan.terms = terms.clone();
        }
        if let Some(charges) = self.unapplied_charges {
            loan.unapplied_charges = charges;
        }
    }
}

/// one row of a loan's persisted payment schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledPayment {
    pub id: PaymentId,
    pub loan_id: LoanId,
    /// 1-based, assigned by creation order, never reused
    pub sequence_number: u32,
    pub due_date: NaiveDate,
    pub amount: Money,
    pub interest: Money,
    pub principal: Money,
    /// balance after this payment
    pub remaining_balance: Money,
    pub status: PaymentStatus,
    /// append-only audit trail
    pub notes: Vec<String>,
    pub error_code: Option<String>,
}

impl ScheduledPayment {
    pub fn new(
        loan_id: LoanId,
        sequence_number: u32,
        due_date: NaiveDate,
        status: PaymentStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id,
            sequence_number,
            due_date,
            amount: Money::ZERO,
            interest: Money::ZERO,
            principal: Money::ZERO,
            remaining_balance: Money::ZERO,
            status,
            notes: Vec::new(),
            error_code: None,
        }
    }

    /// new pending row carrying a breakdown entry's values
    pub fn pending_from(loan_id: LoanId, sequence_number: u32, entry: &BreakdownEntry) -> Self {
        let mut payment = Self::new(loan_id, sequence_number, entry.due_date, PaymentStatus::Pending);
        payment.apply_breakdown(entry);
        payment
    }

    pub fn is_pending(&self) -> bool {
        self.status == PaymentStatus::Pending
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == PaymentStatus::Cancelled
    }

    /// true when the row already carries exactly these values
    pub fn matches_breakdown(&self, entry: &BreakdownEntry) -> bool {
        self.due_date == entry.due_date
            && self.amount == entry.amount
            && self.interest == entry.interest
            && self.principal == entry.principal
            && self.remaining_balance == entry.remaining_balance
    }

    pub fn apply_breakdown(&mut self, entry: &BreakdownEntry) {
        self.due_date = entry.due_date;
        self.amount = entry.amount;
        self.interest = entry.interest;
        self.principal = entry.principal;
        self.remaining_balance = entry.remaining_balance;
    }

    /// zero the money columns, the row keeps its date and audit trail
    pub fn zero_out(&mut self) {
        self.amount = Money::ZERO;
        self.interest = Money::ZERO;
        self.principal = Money::ZERO;
    }

    pub fn append_note(&mut self, timestamp: DateTime<Utc>, note: impl AsRef<str>) {
        self.notes
            .push(format!("[{}] {}", timestamp.format("%Y-%m-%d %H:%M:%S"), note.as_ref()));
    }
}
