/// json requests - drive the engine with trigger payloads and print the responses
use chrono::{NaiveDate, TimeZone, Utc};
use loan_schedule_rs::{
    EngineConfig, EventStore, InMemoryLedger, LedgerStore, Loan, LoanTerms, Money, PaymentFrequency, Rate,
    RecalculationParams, SafeTimeProvider, ScheduleEngine, ScheduleReconciler, TimeSource,
};
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()));
    let config = EngineConfig::from_json(r#"{"max_periods": 360, "failed_payment_fee": "35.00"}"#)?;
    let engine = ScheduleEngine::new(config)?;
    let mut ledger = InMemoryLedger::new();
    let mut events = EventStore::new();

    let loan = Loan::new(
        Money::from_major(4_000),
        Rate::from_percentage(dec!(18.5)),
        LoanTerms {
            payment_amount: Money::from_major(180),
            frequency: PaymentFrequency::TwiceMonthly,
            number_of_periods: 24,
        },
    );
    let loan_id = loan.id;
    ledger.insert_loan(loan.clone());

    let first_due = NaiveDate::from_ymd_opt(2024, 3, 15).ok_or("bad date")?;
    let plan = engine.recalculator().recalculate(&RecalculationParams {
        starting_balance: loan.remaining_balance,
        payment_amount: loan.terms.payment_amount,
        frequency: loan.terms.frequency,
        annual_rate: loan.annual_rate,
        first_payment_date: first_due,
        max_periods: engine.config().max_periods,
    })?;
    ScheduleReconciler::reconcile(&mut ledger, loan_id, &plan, first_due, "origination", &time)?;

    let first = ledger.list_schedule_entries(loan_id)?.remove(0);
    let requests = [
        format!(r#"{{"trigger":"failure","loan_id":"{}","payment_id":"{}"}}"#, loan_id, first.id),
        format!(
            r#"{{"trigger":"modification","loan_id":"{}","payment_amount":"250.00","frequency":"monthly","number_of_periods":18}}"#,
            loan_id
        ),
        format!(r#"{{"trigger":"rebate","loan_id":"{}","amount":"400.00","date":"2024-03-20"}}"#, loan_id),
        format!(r#"{{"trigger":"stop","loan_id":"{}"}}"#, loan_id),
        r#"{"trigger":"refund"}"#.to_string(),
    ];

    for json in &requests {
        println!("request:  {}", json);
        match engine.process_json(&mut ledger, json, &time, &mut events) {
            Ok(response) => {
                println!(
                    "response: success={} balance={} updated={} inserted={} cancelled={} periods={}",
                    response.success,
                    response.new_remaining_balance,
                    response.updated_count,
                    response.inserted_count,
                    response.cancelled_count,
                    response.breakdown.len()
                );
            }
            Err(e) => println!("rejected: {} ({:?})", e, e.kind()),
        }
        println!();
    }

    println!("{} events emitted", events.len());
    Ok(())
}
