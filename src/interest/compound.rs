use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::decimal::{Money, Rate, RoundingPolicy};
use crate::errors::{CalculationError, Result};
use crate::interest::{Accrual, PeriodBreakdown};
use crate::schedule::{CompoundingFrequency, PeriodSchedule};

/// compounds a principal period by period over a schedule
#[derive(Debug, Clone, Copy, Default)]
pub struct InterestAccumulator {
    pub rounding: RoundingPolicy,
}

impl InterestAccumulator {
    pub fn new(rounding: RoundingPolicy) -> Self {
        Self { rounding }
    }

    /// compound `principal` over every period of `schedule`.
    ///
    /// Each period computes `closing = round(opening * (1 + annual_rate / n))`
    /// and books `closing - opening` as interest, so the recorded interest lines
    /// always add up to `final_balance - principal`.
    pub fn accumulate(
        &self,
        principal: Money,
        annual_rate: Rate,
        schedule: &PeriodSchedule,
        include_breakdown: bool,
    ) -> Result<Accrual> {
        if principal.is_negative() {
            return Err(CalculationError::invalid_parameter(format!(
                "principal must not be negative, got {principal}"
            )));
        }
        if annual_rate.is_negative() {
            return Err(CalculationError::invalid_parameter(format!(
                "annual rate must not be negative, got {}",
                annual_rate.as_decimal()
            )));
        }

        let period_rate = annual_rate.per_period(schedule.periods_per_year());
        let growth = Decimal::ONE
            .checked_add(period_rate.as_decimal())
            .ok_or_else(|| CalculationError::overflow("period growth factor"))?;

        let mut breakdown = include_breakdown.then(|| Vec::with_capacity(schedule.len()));
        let mut balance = principal;

        for period in schedule.iter() {
            let closing = balance
                .checked_mul(growth)
                .ok_or_else(|| {
                    CalculationError::overflow(format!(
                        "balance {balance} overflowed in period {}",
                        period.number
                    ))
                })?
                .round_with(&self.rounding);

            if let Some(lines) = breakdown.as_mut() {
                lines.push(PeriodBreakdown {
                    period: period.number,
                    start_date: period.start_date,
                    end_date: period.end_date,
                    opening_balance: balance,
                    interest: closing - balance,
                    closing_balance: closing,
                });
            }
            balance = closing;
        }

        let total_interest = balance
            .checked_sub(principal)
            .ok_or_else(|| CalculationError::overflow("total interest"))?;

        Ok(Accrual {
            principal,
            final_balance: balance,
            total_interest,
            breakdown,
        })
    }
}

/// balance of a single amount after `intervals` periods, rounded per `rounding`
pub fn future_value(
    principal: Money,
    annual_rate: Rate,
    start_date: NaiveDate,
    intervals: u32,
    frequency: CompoundingFrequency,
    rounding: RoundingPolicy,
) -> Result<Money> {
    let schedule = PeriodSchedule::generate(start_date, intervals, frequency)?;
    let accrual = InterestAccumulator::new(rounding).accumulate(principal, annual_rate, &schedule, false)?;
    Ok(accrual.final_balance)
}
