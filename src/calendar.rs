//! Business day calendar used to roll due dates off weekends and holidays.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// a single holiday definition, evaluated per year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HolidayRule {
    /// same month/day every year
    Fixed { month: u32, day: u32 },
    /// nth occurrence of a weekday in a month (n starts at 1)
    NthWeekday { month: u32, weekday: Weekday, n: u8 },
    /// last occurrence of a weekday in a month
    LastWeekday { month: u32, weekday: Weekday },
    /// one-off closure
    Date { date: NaiveDate },
}

impl HolidayRule {
    pub fn matches(&self, date: NaiveDate) -> bool {
        match *self {
            HolidayRule::Fixed { month, day } => date.month() == month && date.day() == day,
            HolidayRule::NthWeekday { month, weekday, n } => {
                date.month() == month
                    && date.weekday() == weekday
                    && (date.day() - 1) / 7 + 1 == n as u32
            }
            HolidayRule::LastWeekday { month, weekday } => {
                date.month() == month
                    && date.weekday() == weekday
                    && date.day() + 7 > last_day_of_month(date.year(), month)
            }
            HolidayRule::Date { date: d } => d == date,
        }
    }
}

/// weekends plus a fixed set of holiday rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessCalendar {
    pub weekends_closed: bool,
    pub holidays: Vec<HolidayRule>,
}

impl BusinessCalendar {
    pub fn new(weekends_closed: bool, holidays: Vec<HolidayRule>) -> Self {
        Self {
            weekends_closed,
            holidays,
        }
    }

    /// saturdays and sundays only
    pub fn weekends_only() -> Self {
        Self::new(true, Vec::new())
    }

    /// US federal banking holidays (observed-day shifts are not modelled)
    pub fn us_federal() -> Self {
        use Weekday::*;
        Self::new(
            true,
            vec![
                HolidayRule::Fixed { month: 1, day: 1 },
                HolidayRule::NthWeekday { month: 1, weekday: Mon, n: 3 },
                HolidayRule::NthWeekday { month: 2, weekday: Mon, n: 3 },
                HolidayRule::LastWeekday { month: 5, weekday: Mon },
                HolidayRule::Fixed { month: 6, day: 19 },
                HolidayRule::Fixed { month: 7, day: 4 },
                HolidayRule::NthWeekday { month: 9, weekday: Mon, n: 1 },
                HolidayRule::NthWeekday { month: 10, weekday: Mon, n: 2 },
                HolidayRule::Fixed { month: 11, day: 11 },
                HolidayRule::NthWeekday { month: 11, weekday: Thu, n: 4 },
                HolidayRule::Fixed { month: 12, day: 25 },
            ],
        )
    }

    pub fn is_weekend(&self, date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.iter().any(|rule| rule.matches(date))
    }

    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        !(self.weekends_closed && self.is_weekend(date)) && !self.is_holiday(date)
    }

    /// the given date if it is a business day, otherwise the next one
    pub fn next_business_day(&self, date: NaiveDate) -> NaiveDate {
        let mut result = date;
        // a year of consecutive closures would mean a broken rule set
        for _ in 0..366 {
            if self.is_business_day(result) {
                return result;
            }
            match result.succ_opt() {
                Some(next) => result = next,
                None => break,
            }
        }
        result
    }
}

impl Default for BusinessCalendar {
    fn default() -> Self {
        Self::us_federal()
    }
}

pub(crate) fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}
