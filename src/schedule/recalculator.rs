use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::calendar::BusinessCalendar;
use crate::decimal::{Money, Rate};
use crate::errors::{Result, ScheduleError};
use crate::schedule::{AmortizationCalculator, PaymentFrequency};

/// one computed, not yet persisted, future payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownEntry {
    pub payment_number: u32,
    pub due_date: NaiveDate,
    pub amount: Money,
    pub interest: Money,
    pub principal: Money,
    pub remaining_balance: Money,
}

/// ordered output of a recalculation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Breakdown {
    pub entries: Vec<BreakdownEntry>,
    /// balance reached zero within the period cap
    pub converged: bool,
    /// at least one period's payment did not cover its interest
    pub stalled: bool,
}

impl Breakdown {
    /// nothing left to collect
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            converged: true,
            stalled: false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_interest(&self) -> Money {
        self.entries.iter().map(|e| e.interest).sum()
    }

    pub fn total_principal(&self) -> Money {
        self.entries.iter().map(|e| e.principal).sum()
    }

    pub fn total_amount(&self) -> Money {
        self.entries.iter().map(|e| e.amount).sum()
    }

    pub fn final_balance(&self) -> Money {
        self.entries
            .last()
            .map(|e| e.remaining_balance)
            .unwrap_or(Money::ZERO)
    }
}

/// inputs to a recalculation
#[derive(Debug, Clone, PartialEq)]
pub struct RecalculationParams {
    pub starting_balance: Money,
    pub payment_amount: Money,
    pub frequency: PaymentFrequency,
    pub annual_rate: Rate,
    pub first_payment_date: NaiveDate,
    pub max_periods: u32,
}

/// drives the amortization calculator period by period
pub struct ScheduleRecalculator<'a> {
    calendar: &'a BusinessCalendar,
}

impl<'a> ScheduleRecalculator<'a> {
    pub fn new(calendar: &'a BusinessCalendar) -> Self {
        Self { calendar }
    }

    /// compute the breakdown that amortizes `starting_balance` to zero
    pub fn recalculate(&self, params: &RecalculationParams) -> Result<Breakdown> {
        validate(params)?;

        if params.starting_balance.is_zero() {
            return Ok(Breakdown::empty());
        }

        let calculator = AmortizationCalculator::new(params.annual_rate, params.frequency);
        let mut balance = params.starting_balance;
        let mut breakdown = Breakdown::default();

        for index in 0..params.max_periods {
            let nominal = params
                .frequency
                .nominal_date(params.first_payment_date, index)
                .ok_or_else(|| ScheduleError::InvalidDate {
                    date: params.first_payment_date,
                    reason: format!("period {} is outside the supported date range", index + 1),
                })?;
            let due_date = self.calendar.next_business_day(nominal);

            let split = calculator.compute_period(balance, params.payment_amount);
            if split.is_stalled() && !breakdown.stalled {
                warn!(
                    period = index + 1,
                    %balance,
                    interest = %split.interest,
                    payment = %params.payment_amount,
                    "payment does not cover period interest, balance will not decrease"
                );
                breakdown.stalled = true;
            }

            // the terminating period pays off exactly what is left
            let (principal, amount) = if split.principal >= balance {
                (balance, split.interest + balance)
            } else {
                (split.principal, params.payment_amount)
            };
            balance = (balance - principal).floor_zero();

            breakdown.entries.push(BreakdownEntry {
                payment_number: index + 1,
                due_date,
                amount,
                interest: split.interest,
                principal,
                remaining_balance: balance,
            });

            if balance.is_zero() {
                breakdown.converged = true;
                break;
            }
        }

        if breakdown.converged {
            debug!(
                periods = breakdown.len(),
                total_interest = %breakdown.total_interest(),
                "breakdown computed"
            );
        } else {
            warn!(
                periods = breakdown.len(),
                remaining = %balance,
                max_periods = params.max_periods,
                "breakdown hit the period cap before reaching zero"
            );
        }

        Ok(breakdown)
    }
}

fn validate(params: &RecalculationParams) -> Result<()> {
    if params.starting_balance.is_negative() {
        return Err(ScheduleError::InvalidAmount {
            amount: params.starting_balance,
            reason: "starting balance cannot be negative".to_string(),
        });
    }
    if !params.payment_amount.is_positive() {
        return Err(ScheduleError::InvalidAmount {
            amount: params.payment_amount,
            reason: "payment amount must be positive".to_string(),
        });
    }
    if params.annual_rate.is_negative() {
        return Err(ScheduleError::InvalidConfiguration {
            message: format!("annual rate cannot be negative: {}", params.annual_rate),
        });
    }
    if params.max_periods == 0 {
        return Err(ScheduleError::InvalidConfiguration {
            message: "max_periods must be at least 1".to_string(),
        });
    }
    Ok(())
}
