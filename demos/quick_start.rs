/// quick start - compound a small portfolio both ways and print the ledger
use compound_interest_rs::chrono::NaiveDate;
use compound_interest_rs::{
    Account, CalculationEngine, CalculationRequest, CompoundingFrequency, EngineConfig, Money,
    Rate,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let accounts = vec![
        Account::new("savings", Money::from_major(1_000), Rate::from_percentage(12)),
        Account::new("deposit", Money::from_str_exact("25000.00")?, Rate::from_bps(425)),
        Account::new("broken", Money::from_major(500), Rate::from_str_exact("-0.01")?),
    ];
    let start = NaiveDate::from_ymd_opt(2024, 1, 31).ok_or("invalid start date")?;
    let request = CalculationRequest::new(accounts, start, 12, CompoundingFrequency::Monthly, true);

    let engine = CalculationEngine::new(EngineConfig::concurrent(2));

    let sequential = engine.calculate_compound_interest(&request)?;
    let concurrent = engine.calculate_compound_interest_concurrent(&request)?;
    println!("modes agree: {}", sequential.results == concurrent.results);
    println!("status: {:?}, total interest: {}\n", concurrent.status, concurrent.total_interest()?);

    for result in &concurrent.results {
        match (result.accrual(), result.failure()) {
            (Some(accrual), _) => {
                println!("{}: {} -> {}", result.account_id, accrual.principal, accrual.final_balance);
                for line in accrual.breakdown.iter().flatten() {
                    println!(
                        "  #{:>2} {} .. {}  {:>10} + {:>8} = {:>10}",
                        line.period,
                        line.start_date,
                        line.end_date,
                        line.opening_balance,
                        line.interest,
                        line.closing_balance
                    );
                }
            }
            (None, Some(failure)) => {
                println!("{}: failed ({:?}) {}", result.account_id, failure.kind, failure.message);
            }
            (None, None) => {}
        }
    }

    println!("\n{}", serde_json::to_string_pretty(&concurrent.results[0])?);
    Ok(())
}
