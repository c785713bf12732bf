use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::calendar::last_day_of_month;
use crate::errors::ScheduleError;

/// supported payment cadences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentFrequency {
    Weekly,
    BiWeekly,
    /// 15th and last day of each month
    TwiceMonthly,
    Monthly,
}

impl PaymentFrequency {
    pub fn payments_per_year(&self) -> u32 {
        match self {
            PaymentFrequency::Weekly => 52,
            PaymentFrequency::BiWeekly => 26,
            PaymentFrequency::TwiceMonthly => 24,
            PaymentFrequency::Monthly => 12,
        }
    }

    /// fixed day step, `None` for calendar-month stepping
    pub fn day_step(&self) -> Option<i64> {
        match self {
            PaymentFrequency::Weekly => Some(7),
            PaymentFrequency::BiWeekly => Some(14),
            PaymentFrequency::TwiceMonthly => Some(15),
            PaymentFrequency::Monthly => None,
        }
    }

    /// unadjusted due date of the period `index` steps after `first`
    pub fn nominal_date(&self, first: NaiveDate, index: u32) -> Option<NaiveDate> {
        match self {
            PaymentFrequency::Weekly | PaymentFrequency::BiWeekly => {
                let step = self.day_step()?;
                first.checked_add_signed(Duration::days(step * index as i64))
            }
            PaymentFrequency::Monthly => first.checked_add_months(Months::new(index)),
            PaymentFrequency::TwiceMonthly => {
                let mut date = first;
                for _ in 0..index {
                    date = next_semi_monthly(date)?;
                }
                Some(date)
            }
        }
    }

    /// one period after `date`
    pub fn advance(&self, date: NaiveDate) -> Option<NaiveDate> {
        self.nominal_date(date, 1)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentFrequency::Weekly => "weekly",
            PaymentFrequency::BiWeekly => "bi-weekly",
            PaymentFrequency::TwiceMonthly => "twice-monthly",
            PaymentFrequency::Monthly => "monthly",
        }
    }
}

/// next of the (15th, month end) pair strictly after `date`
fn next_semi_monthly(date: NaiveDate) -> Option<NaiveDate> {
    let month_end = last_day_of_month(date.year(), date.month());
    if date.day() < 15 {
        date.with_day(15)
    } else if date.day() < month_end {
        date.with_day(month_end)
    } else {
        date.checked_add_months(Months::new(1))?.with_day(15)
    }
}

impl fmt::Display for PaymentFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentFrequency {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(PaymentFrequency::Weekly),
            "bi-weekly" => Ok(PaymentFrequency::BiWeekly),
            "twice-monthly" => Ok(PaymentFrequency::TwiceMonthly),
            "monthly" => Ok(PaymentFrequency::Monthly),
            other => Err(ScheduleError::InvalidFrequency {
                value: other.to_string(),
            }),
        }
    }
}
