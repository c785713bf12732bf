use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// unique identifier for a loan
pub type LoanId = Uuid;

/// unique identifier for a scheduled payment row
pub type PaymentId = Uuid;

/// loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// approved, funds not yet sent
    PendingDisbursement,
    /// disbursed and being collected
    Active,
    /// balance fully repaid
    Completed,
    Defaulted,
    Cancelled,
}

/// status of a single schedule row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// scheduled, not yet settled
    Pending,
    Confirmed,
    Paid,
    /// out-of-band payment posted by an operator
    Manual,
    /// voluntary extra payment
    Rebate,
    /// zeroed, obligation relocated to the end of the schedule
    Deferred,
    /// collection did not clear
    Failed,
    Cancelled,
}

impl PaymentStatus {
    /// rows that reconciliation must never overwrite
    pub fn is_locked(&self) -> bool {
        match self {
            PaymentStatus::Pending => false,
            PaymentStatus::Confirmed
            | PaymentStatus::Paid
            | PaymentStatus::Manual
            | PaymentStatus::Rebate
            | PaymentStatus::Deferred
            | PaymentStatus::Failed
            | PaymentStatus::Cancelled => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Manual => "manual",
            PaymentStatus::Rebate => "rebate",
            PaymentStatus::Deferred => "deferred",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
