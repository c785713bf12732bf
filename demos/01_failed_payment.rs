/// failed payment - a bounced collection, a deferral and a rebate on one loan
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use loan_schedule_rs::{
    DeferralMode, EngineConfig, EventStore, FeePolicy, InMemoryLedger, LedgerStore, Loan, LoanTerms, Money,
    PaymentFrequency, PaymentStatus, PrincipalCreditPolicy, Rate, RecalculationParams, SafeTimeProvider,
    ScheduleEngine, ScheduleReconciler, TimeSource,
};
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 10, 9, 0, 0).unwrap()));
    let controller = time.test_control().unwrap();

    // rebates credit the full amount as principal
    let engine = ScheduleEngine::new(EngineConfig {
        principal_credit: PrincipalCreditPolicy::FullAmount,
        ..EngineConfig::default()
    })?;
    let mut ledger = InMemoryLedger::new();
    let mut events = EventStore::new();

    let loan = Loan::new(
        Money::from_major(2_500),
        Rate::from_percentage(dec!(24)),
        LoanTerms {
            payment_amount: Money::from_major(150),
            frequency: PaymentFrequency::BiWeekly,
            number_of_periods: 20,
        },
    );
    let loan_id = loan.id;
    ledger.insert_loan(loan.clone());

    let first_due = NaiveDate::from_ymd_opt(2024, 1, 19).ok_or("bad date")?;
    let plan = engine.recalculator().recalculate(&RecalculationParams {
        starting_balance: loan.remaining_balance,
        payment_amount: loan.terms.payment_amount,
        frequency: loan.terms.frequency,
        annual_rate: loan.annual_rate,
        first_payment_date: first_due,
        max_periods: engine.config().max_periods,
    })?;
    ScheduleReconciler::reconcile(&mut ledger, loan_id, &plan, first_due, "origination", &time)?;
    println!("booked {} payments, total interest {}", plan.len(), plan.total_interest());

    // the first collection bounces
    controller.advance(Duration::days(10));
    let first = ledger.list_schedule_entries(loan_id)?.remove(0);
    let failed = engine.simulate_failed_payment(&mut ledger, loan_id, first.id, None, &time, &mut events)?;
    println!("failed payment: balance now {}", failed.new_remaining_balance);

    // the borrower asks to push the next one to the end, fee added to the balance
    let next = ledger
        .list_schedule_entries(loan_id)?
        .into_iter()
        .find(|e| e.status == PaymentStatus::Pending)
        .ok_or("no pending payment")?;
    let deferred = engine.defer_payment(
        &mut ledger,
        loan_id,
        next.id,
        DeferralMode::MoveToEnd {
            fee: Money::from_major(15),
            fee_policy: FeePolicy::AddToBalance,
        },
        &time,
        &mut events,
    )?;
    println!("deferred #{}: balance now {}", next.sequence_number, deferred.new_remaining_balance);

    // and later sends a rebate
    controller.advance(Duration::days(30));
    let rebate_date = time.now().date_naive();
    let rebate = engine.post_rebate(&mut ledger, loan_id, Money::from_major(500), rebate_date, &time, &mut events)?;
    println!(
        "rebate: balance now {}, {} payments left, fully amortizing: {}",
        rebate.new_remaining_balance,
        rebate.breakdown.as_ref().map(|b| b.len()).unwrap_or(0),
        rebate.fully_amortizing()
    );

    println!("\naudit trail:");
    for event in events.take_events() {
        println!("  {:?}", event);
    }

    Ok(())
}
