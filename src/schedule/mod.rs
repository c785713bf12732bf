pub mod amortization;
pub mod frequency;
pub mod recalculator;
pub mod reconciler;

pub use amortization::{compute_period, AmortizationCalculator, PeriodSplit};
pub use frequency::PaymentFrequency;
pub use recalculator::{Breakdown, BreakdownEntry, RecalculationParams, ScheduleRecalculator};
pub use reconciler::{next_sequence_number, ReconcileOutcome, RowError, ScheduleReconciler};
