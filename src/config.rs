use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::calendar::BusinessCalendar;
use crate::decimal::Money;
use crate::errors::{Result, ScheduleError};

/// API default for the recalculation safety cap
pub const DEFAULT_MAX_PERIODS: u32 = 1000;

/// how much of a manual payment or rebate reduces the principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalCreditPolicy {
    /// one period of interest is taken first, the rest is principal
    #[default]
    InterestFirst,
    /// the whole amount is credited as principal
    FullAmount,
}

/// engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_periods: u32,
    pub failed_payment_fee: Money,
    pub nsf_error_code: String,
    pub principal_credit: PrincipalCreditPolicy,
    pub calendar: BusinessCalendar,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_periods: DEFAULT_MAX_PERIODS,
            failed_payment_fee: Money::from_decimal(dec!(55.00)),
            nsf_error_code: "NSF".to_string(),
            principal_credit: PrincipalCreditPolicy::InterestFirst,
            calendar: BusinessCalendar::us_federal(),
        }
    }
}

impl EngineConfig {
    /// default configuration without bank holidays
    pub fn weekends_only() -> Self {
        Self {
            calendar: BusinessCalendar::weekends_only(),
            ..Self::default()
        }
    }

    /// load from a json document, missing fields fall back to defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json).map_err(|e| {
            ScheduleError::InvalidConfiguration {
                message: e.to_string(),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_periods == 0 {
            return Err(ScheduleError::InvalidConfiguration {
                message: "max_periods must be at least 1".to_string(),
            });
        }
        if self.failed_payment_fee.is_negative() {
            return Err(ScheduleError::InvalidConfiguration {
                message: format!("failed_payment_fee cannot be negative: {}", self.failed_payment_fee),
            });
        }
        if self.nsf_error_code.trim().is_empty() {
            return Err(ScheduleError::InvalidConfiguration {
                message: "nsf_error_code cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_periods, 1000);
        assert_eq!(config.failed_payment_fee, Money::from_major(55));
        assert_eq!(config.principal_credit, PrincipalCreditPolicy::InterestFirst);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json(
            r#"{ "failed_payment_fee": "35.00", "principal_credit": "full_amount" }"#,
        )
        .unwrap();
        assert_eq!(config.failed_payment_fee, Money::from_major(35));
        assert_eq!(config.principal_credit, PrincipalCreditPolicy::FullAmount);
        assert_eq!(config.max_periods, DEFAULT_MAX_PERIODS);
        assert_eq!(config.calendar, BusinessCalendar::us_federal());
    }

    #[test]
    fn test_rejects_zero_cap() {
        let err = EngineConfig::from_json(r#"{ "max_periods": 0 }"#).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_calendar_from_json() {
        let config = EngineConfig::from_json(
            r#"{
                "calendar": {
                    "weekends_closed": true,
                    "holidays": [
                        { "kind": "fixed", "month": 12, "day": 26 },
                        { "kind": "last_weekday", "month": 8, "weekday": "Mon" }
                    ]
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.calendar.holidays.len(), 2);
    }
}
