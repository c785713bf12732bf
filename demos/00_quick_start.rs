/// quick start - book a schedule and post a manual payment
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

    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap()));
    let engine = ScheduleEngine::new(EngineConfig::default())?;
    let mut ledger = InMemoryLedger::new();
    let mut events = EventStore::new();

    // $1,200 at 29% repaid $200 a month
    let loan = Loan::new(
        Money::from_major(1_200),
        Rate::from_percentage(dec!(29)),
        LoanTerms {
            payment_amount: Money::from_major(200),
            frequency: PaymentFrequency::Monthly,
            number_of_periods: 7,
        },
    );
    let loan_id = loan.id;
    ledger.insert_loan(loan.clone());

    // book the contracted schedule
    let first_due = NaiveDate::from_ymd_opt(2024, 2, 1).ok_or("bad date")?;
    let plan = engine.recalculator().recalculate(&RecalculationParams {
        starting_balance: loan.remaining_balance,
        payment_amount: loan.terms.payment_amount,
        frequency: loan.terms.frequency,
        annual_rate: loan.annual_rate,
        first_payment_date: first_due,
        max_periods: engine.config().max_periods,
    })?;
    ScheduleReconciler::reconcile(&mut ledger, loan_id, &plan, first_due, "origination", &time)?;
    print_schedule(&ledger, loan_id)?;

    // borrower pays $300 outside the schedule
    let paid_on = NaiveDate::from_ymd_opt(2024, 1, 20).ok_or("bad date")?;
    let result = engine.post_manual_payment(&mut ledger, loan_id, Money::from_major(300), paid_on, &time, &mut events)?;
    println!(
        "\nafter manual payment: balance {} (updated {}, cancelled {})\n",
        result.new_remaining_balance, result.updated_count, result.cancelled_count
    );
    print_schedule(&ledger, loan_id)?;

    for event in events.take_events() {
        println!("{:?}", event);
    }

    Ok(())
}

fn print_schedule(ledger: &InMemoryLedger, loan_id: loan_schedule_rs::LoanId) -> Result<(), Box<dyn std::error::Error>> {
    println!("{:>3}  {:<10}  {:>9}  {:>8}  {:>9}  {:>9}  status", "#", "due", "amount", "interest", "principal", "balance");
    for row in ledger.list_schedule_entries(loan_id)? {
        println!(
            "{:>3}  {}  {:>9}  {:>8}  {:>9}  {:>9}  {}",
            row.sequence_number,
            row.due_date,
            row.amount.to_string(),
            row.interest.to_string(),
            row.principal.to_string(),
            row.remaining_balance.to_string(),
            row.status
        );
    }
    Ok(())
}
