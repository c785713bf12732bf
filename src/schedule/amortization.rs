use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::schedule::PaymentFrequency;

/// interest/principal split for a single period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSplit {
    pub interest: Money,
    pub principal: Money,
    pub new_balance: Money,
}

impl PeriodSplit {
    /// payment did not cover the interest, balance did not move
    pub fn is_stalled(&self) -> bool {
        self.principal.is_zero()
    }
}

/// amortization calculator for a fixed rate and cadence
#[derive(Debug, Clone, Copy)]
pub struct AmortizationCalculator {
    periodic_rate: Decimal,
}

impl AmortizationCalculator {
    pub fn new(annual_rate: Rate, frequency: PaymentFrequency) -> Self {
        Self {
            periodic_rate: annual_rate.periodic_rate(frequency.payments_per_year()),
        }
    }

    pub fn periodic_rate(&self) -> Decimal {
        self.periodic_rate
    }

    /// interest accrued on `balance` over one period, posted to the cent
    pub fn period_interest(&self, balance: Money) -> Money {
        balance.apply_rate(self.periodic_rate)
    }

    /// split `payment_amount` into interest and principal against `balance`
    pub fn compute_period(&self, balance: Money, payment_amount: Money) -> PeriodSplit {
        let interest = self.period_interest(balance);
        let principal = (payment_amount - interest).floor_zero();
        let new_balance = (balance - principal).floor_zero();

        PeriodSplit {
            interest,
            principal,
            new_balance,
        }
    }
}

/// one-shot form of [`AmortizationCalculator::compute_period`]
pub fn compute_period(
    balance: Money,
    annual_rate: Rate,
    frequency: PaymentFrequency,
    payment_amount: Money,
) -> PeriodSplit {
    AmortizationCalculator::new(annual_rate, frequency).compute_period(balance, payment_amount)
}
