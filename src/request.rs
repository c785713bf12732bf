//! Caller-facing request and response shapes, one request variant per trigger.

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decimal::Money;
use crate::errors::{Result, ScheduleError};
use crate::events::EventStore;
use crate::handlers::{DeferralMode, ModificationTerms, RecalculationResult, ScheduleEngine, ScheduleOverride};
use crate::ledger::LedgerStore;
use crate::schedule::{BreakdownEntry, PaymentFrequency, RowError};
use crate::types::{LoanId, PaymentId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum RecalculationRequest {
    Manual {
        loan_id: LoanId,
        amount: Money,
        date: NaiveDate,
    },
    Rebate {
        loan_id: LoanId,
        amount: Money,
        date: NaiveDate,
    },
    Failure {
        loan_id: LoanId,
        payment_id: PaymentId,
        /// configured failed-payment fee when absent
        #[serde(default)]
        fee_amount: Option<Money>,
    },
    Deferral {
        loan_id: LoanId,
        payment_id: PaymentId,
        deferral: DeferralMode,
    },
    Modification {
        loan_id: LoanId,
        payment_amount: Money,
        frequency: PaymentFrequency,
        number_of_periods: u32,
        #[serde(default)]
        first_payment_date: Option<NaiveDate>,
        #[serde(default)]
        override_schedule: Vec<ScheduleOverride>,
    },
    Stop {
        loan_id: LoanId,
    },
}

impl RecalculationRequest {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ScheduleError::InvalidRequest {
            message: e.to_string(),
        })
    }

    pub fn loan_id(&self) -> LoanId {
        match self {
            RecalculationRequest::Manual { loan_id, .. }
            | RecalculationRequest::Rebate { loan_id, .. }
            | RecalculationRequest::Failure { loan_id, .. }
            | RecalculationRequest::Deferral { loan_id, .. }
            | RecalculationRequest::Modification { loan_id, .. }
            | RecalculationRequest::Stop { loan_id } => *loan_id,
        }
    }

    pub fn trigger(&self) -> &'static str {
        match self {
            RecalculationRequest::Manual { .. } => "manual",
            RecalculationRequest::Rebate { .. } => "rebate",
            RecalculationRequest::Failure { .. } => "failure",
            RecalculationRequest::Deferral { .. } => "deferral",
            RecalculationRequest::Modification { .. } => "modification",
            RecalculationRequest::Stop { .. } => "stop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalculationResponse {
    pub success: bool,
    pub new_remaining_balance: Money,
    pub updated_count: usize,
    pub inserted_count: usize,
    pub cancelled_count: usize,
    pub breakdown: Vec<BreakdownEntry>,
    pub fully_amortizing: bool,
    pub errors: Vec<RowError>,
}

impl From<RecalculationResult> for RecalculationResponse {
    fn from(result: RecalculationResult) -> Self {
        let fully_amortizing = result.fully_amortizing();
        RecalculationResponse {
            success: result.success(),
            new_remaining_balance: result.new_remaining_balance,
            updated_count: result.updated_count,
            inserted_count: result.inserted_count,
            cancelled_count: result.cancelled_count,
            breakdown: result.breakdown.map(|b| b.entries).unwrap_or_default(),
            fully_amortizing,
            errors: result.errors,
        }
    }
}

impl ScheduleEngine {
    /// dispatch a request to its handler
    pub fn process<S: LedgerStore>(
        &self,
        store: &mut S,
        request: RecalculationRequest,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<RecalculationResponse> {
        debug!(loan_id = %request.loan_id(), trigger = request.trigger(), "processing recalculation request");

        let result = match request {
            RecalculationRequest::Manual { loan_id, amount, date } => {
                self.post_manual_payment(store, loan_id, amount, date, time_provider, events)?
            }
            RecalculationRequest::Rebate { loan_id, amount, date } => {
                self.post_rebate(store, loan_id, amount, date, time_provider, events)?
            }
            RecalculationRequest::Failure {
                loan_id,
                payment_id,
                fee_amount,
            } => self.simulate_failed_payment(store, loan_id, payment_id, fee_amount, time_provider, events)?,
            RecalculationRequest::Deferral {
                loan_id,
                payment_id,
                deferral,
            } => self.defer_payment(store, loan_id, payment_id, deferral, time_provider, events)?,
            RecalculationRequest::Modification {
                loan_id,
                payment_amount,
                frequency,
                number_of_periods,
                first_payment_date,
                override_schedule,
            } => {
                let terms = ModificationTerms {
                    payment_amount,
                    frequency,
                    number_of_periods,
                    first_payment_date,
                    override_schedule,
                };
                self.modify_loan(store, loan_id, terms, time_provider, events)?
            }
            RecalculationRequest::Stop { loan_id } => self.stop_collection(store, loan_id, time_provider, events)?,
        };

        Ok(result.into())
    }

    /// parse and dispatch a JSON request
    pub fn process_json<S: LedgerStore>(
        &self,
        store: &mut S,
        json: &str,
        time_provider: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<RecalculationResponse> {
        let request = RecalculationRequest::from_json(json)?;
        self.process(store, request, time_provider, events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::*;
    use crate::handlers::FeePolicy;
    use crate::types::PaymentStatus;

    fn money(s: &str) -> Money {
        Money::from_str_exact(s).unwrap()
    }

    #[test]
    fn test_manual_request_from_json() {
        let engine = engine();
        let (mut ledger, loan_id) = seeded(&engine);
        let json = format!(
            r#"{{"trigger":"manual","loan_id":"{}","amount":"300.00","date":"2024-01-20"}}"#,
            loan_id
        );

        let response = engine
            .process_json(&mut ledger, &json, &clock(), &mut EventStore::new())
            .unwrap();

        assert!(response.success);
        assert!(response.fully_amortizing);
        assert_eq!(response.new_remaining_balance, money("929.00"));
        assert_eq!(response.breakdown.len(), 5);
        assert_eq!(response.cancelled_count, 2);
    }

    #[test]
    fn test_deferral_request_round_trips_through_dispatch() {
        let engine = engine();
        let (mut ledger, loan_id) = seeded(&engine);
        let target = ledger.entries(loan_id)[1].clone();
        let json = format!(
            r#"{{"trigger":"deferral","loan_id":"{}","payment_id":"{}",
                "deferral":{{"mode":"move_to_end","fee":"25.00","fee_policy":"add_to_payment"}}}}"#,
            loan_id, target.id
        );

        let request = RecalculationRequest::from_json(&json).unwrap();
        assert_eq!(request.trigger(), "deferral");
        assert!(matches!(
            &request,
            RecalculationRequest::Deferral {
                deferral: DeferralMode::MoveToEnd { fee_policy: FeePolicy::AddToPayment, .. },
                ..
            }
        ));

        let response = engine
            .process(&mut ledger, request, &clock(), &mut EventStore::new())
            .unwrap();
        assert_eq!(response.inserted_count, 1);
        assert!(response.breakdown.is_empty());
        assert!(response.fully_amortizing);
        assert_eq!(ledger.entries(loan_id)[1].status, PaymentStatus::Deferred);
    }

    #[test]
    fn test_stop_request() {
        let engine = engine();
        let (mut ledger, loan_id) = seeded(&engine);
        let response = engine
            .process(&mut ledger, RecalculationRequest::Stop { loan_id }, &clock(), &mut EventStore::new())
            .unwrap();
        assert_eq!(response.cancelled_count, 7);
        assert_eq!(response.new_remaining_balance, Money::from_major(1200));
    }

    #[test]
    fn test_malformed_requests_are_validation_errors() {
        let err = RecalculationRequest::from_json(r#"{"trigger":"refund","loan_id":"x"}"#).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidRequest { .. }));
        assert!(err.is_validation());

        // manual payments carry exactly an amount and a date
        let err = RecalculationRequest::from_json(
            r#"{"trigger":"manual","loan_id":"67e55044-10b1-426f-9247-bb680e5fe0c8","amount":"10.00"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidRequest { .. }));

        let err = RecalculationRequest::from_json(
            r#"{"trigger":"modification","loan_id":"67e55044-10b1-426f-9247-bb680e5fe0c8",
                "payment_amount":"100.00","frequency":"fortnightly","number_of_periods":12}"#,
        )
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_response_serializes_snake_case() {
        let engine = engine();
        let (mut ledger, loan_id) = seeded(&engine);
        let response = engine
            .process(&mut ledger, RecalculationRequest::Stop { loan_id }, &clock(), &mut EventStore::new())
            .unwrap();
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], serde_json::json!(true));
        let balance: Money = serde_json::from_value(value["new_remaining_balance"].clone()).unwrap();
        assert_eq!(balance, Money::from_major(1200));
        assert!(value["breakdown"].as_array().unwrap().is_empty());
        assert_eq!(value["cancelled_count"], serde_json::json!(7));
    }
}
