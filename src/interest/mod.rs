pub mod compound;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;

pub use compound::{future_value, InterestAccumulator};

/// ledger line for one compounding period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodBreakdown {
    pub period: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub opening_balance: Money,
    pub interest: Money,
    pub closing_balance: Money,
}

/// compounded balance of one principal over a schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accrual {
    pub principal: Money,
    pub final_balance: Money,
    /// final balance minus principal
    pub total_interest: Money,
    /// present only when requested
    pub breakdown: Option<Vec<PeriodBreakdown>>,
}

impl Accrual {
    /// sum of the per-period interest lines, if a breakdown was recorded
    pub fn breakdown_interest(&self) -> Option<Money> {
        self.breakdown
            .as_ref()
            .map(|lines| lines.iter().map(|l| l.interest).sum())
    }
}
