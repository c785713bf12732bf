pub mod calendar;
pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod ledger;
pub mod request;
pub mod schedule;
pub mod state;
pub mod types;

// re-export key types
pub use calendar::{BusinessCalendar, HolidayRule};
pub use config::{EngineConfig, PrincipalCreditPolicy, DEFAULT_MAX_PERIODS};
pub use decimal::{Money, Rate};
pub use errors::{ErrorKind, Result, ScheduleError};
pub use events::{EventStore, ScheduleEvent};
pub use handlers::{
    DeferralMode, FeeCharge, FeePolicy, ModificationTerms, RecalculationResult, ScheduleEngine,
    ScheduleOverride,
};
pub use ledger::{InMemoryLedger, LedgerStore};
pub use request::{RecalculationRequest, RecalculationResponse};
pub use schedule::{
    AmortizationCalculator, Breakdown, BreakdownEntry, PaymentFrequency, PeriodSplit,
    RecalculationParams, ReconcileOutcome, RowError, ScheduleReconciler, ScheduleRecalculator,
};
pub use state::{Loan, LoanTerms, LoanUpdate, ScheduledPayment};
pub use types::{LoanId, LoanStatus, PaymentId, PaymentStatus};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
