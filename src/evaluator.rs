use log::{debug, warn};

use crate::decimal::RoundingPolicy;
use crate::interest::InterestAccumulator;
use crate::schedule::PeriodSchedule;
use crate::types::{Account, InterestResult};

/// evaluates one account against a shared schedule.
///
/// Implementations never fail: every error is folded into the returned
/// [`InterestResult`], so one bad account cannot abort a batch.
pub trait AccountEvaluation: Send + Sync {
    fn evaluate(
        &self,
        account: &Account,
        schedule: &PeriodSchedule,
        include_breakdown: bool,
    ) -> InterestResult;
}

/// default evaluator backed by [`InterestAccumulator`]
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountEvaluator {
    accumulator: InterestAccumulator,
}

impl AccountEvaluator {
    pub fn new(rounding: RoundingPolicy) -> Self {
        Self {
            accumulator: InterestAccumulator::new(rounding),
        }
    }

    pub fn rounding(&self) -> RoundingPolicy {
        self.accumulator.rounding
    }
}

impl AccountEvaluation for AccountEvaluator {
    fn evaluate(
        &self,
        account: &Account,
        schedule: &PeriodSchedule,
        include_breakdown: bool,
    ) -> InterestResult {
        match self.accumulator.accumulate(
            account.principal,
            account.annual_rate,
            schedule,
            include_breakdown,
        ) {
            Ok(accrual) => {
                debug!(
                    "account {}: {} -> {} over {} periods",
                    account.id,
                    accrual.principal,
                    accrual.final_balance,
                    schedule.len()
                );
                InterestResult::computed(account.id.clone(), accrual)
            }
            Err(e) => {
                warn!("account {}: {}", account.id, e);
                InterestResult::failed(account.id.clone(), &e)
            }
        }
    }
}
