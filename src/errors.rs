use chrono::NaiveDate;
use thiserror::Error;

use crate::decimal::Money;
use crate::types::{LoanId, LoanStatus, PaymentId, PaymentStatus};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount {
        amount: Money,
        reason: String,
    },

    #[error("invalid date {date}: {reason}")]
    InvalidDate {
        date: NaiveDate,
        reason: String,
    },

    #[error("unrecognized payment frequency: {value}")]
    InvalidFrequency {
        value: String,
    },

    #[error("payment {payment_id} is {status}, expected {expected}")]
    InvalidEntryStatus {
        payment_id: PaymentId,
        status: PaymentStatus,
        expected: PaymentStatus,
    },

    #[error("loan {loan_id} not active: current status is {status:?}")]
    LoanNotActive {
        loan_id: LoanId,
        status: LoanStatus,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("malformed recalculation request: {message}")]
    InvalidRequest {
        message: String,
    },

    #[error("loan not found: {loan_id}")]
    LoanNotFound {
        loan_id: LoanId,
    },

    #[error("scheduled payment not found: {payment_id}")]
    PaymentNotFound {
        payment_id: PaymentId,
    },

    #[error("ledger store failure: {message}")]
    Persistence {
        message: String,
    },
}

/// coarse classification callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// rejected before any mutation
    Validation,
    NotFound,
    /// the ledger store call itself failed
    Persistence,
}

impl ScheduleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScheduleError::InvalidAmount { .. }
            | ScheduleError::InvalidDate { .. }
            | ScheduleError::InvalidFrequency { .. }
            | ScheduleError::InvalidEntryStatus { .. }
            | ScheduleError::LoanNotActive { .. }
            | ScheduleError::InvalidConfiguration { .. }
            | ScheduleError::InvalidRequest { .. } => ErrorKind::Validation,
            ScheduleError::LoanNotFound { .. } | ScheduleError::PaymentNotFound { .. } => {
                ErrorKind::NotFound
            }
            ScheduleError::Persistence { .. } => ErrorKind::Persistence,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    pub(crate) fn persistence(message: impl Into<String>) -> Self {
        ScheduleError::Persistence {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
