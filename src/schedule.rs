use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{CalculationError, Result};

/// compounding frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompoundingFrequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
}

/// calendar step between two period boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Months(u32),
    Days(u64),
}

impl CompoundingFrequency {
    pub const ALL: [CompoundingFrequency; 6] = [
        CompoundingFrequency::Daily,
        CompoundingFrequency::Weekly,
        CompoundingFrequency::Monthly,
        CompoundingFrequency::Quarterly,
        CompoundingFrequency::SemiAnnual,
        CompoundingFrequency::Annual,
    ];

    /// get number of compounding periods per year
    pub fn periods_per_year(&self) -> u32 {
        match self {
            CompoundingFrequency::Daily => 365,
            CompoundingFrequency::Weekly => 52,
            CompoundingFrequency::Monthly => 12,
            CompoundingFrequency::Quarterly => 4,
            CompoundingFrequency::SemiAnnual => 2,
            CompoundingFrequency::Annual => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CompoundingFrequency::Daily => "daily",
            CompoundingFrequency::Weekly => "weekly",
            CompoundingFrequency::Monthly => "monthly",
            CompoundingFrequency::Quarterly => "quarterly",
            CompoundingFrequency::SemiAnnual => "semi_annual",
            CompoundingFrequency::Annual => "annual",
        }
    }

    fn step(&self) -> Step {
        match self {
            CompoundingFrequency::Daily => Step::Days(1),
            CompoundingFrequency::Weekly => Step::Days(7),
            CompoundingFrequency::Monthly => Step::Months(1),
            CompoundingFrequency::Quarterly => Step::Months(3),
            CompoundingFrequency::SemiAnnual => Step::Months(6),
            CompoundingFrequency::Annual => Step::Months(12),
        }
    }
}

impl fmt::Display for CompoundingFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompoundingFrequency {
    type Err = CalculationError;

    /// accepts `semi_annual`, `semi-annual`, `SemiAnnual` and friends
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "daily" => Ok(CompoundingFrequency::Daily),
            "weekly" => Ok(CompoundingFrequency::Weekly),
            "monthly" => Ok(CompoundingFrequency::Monthly),
            "quarterly" => Ok(CompoundingFrequency::Quarterly),
            "semiannual" | "semiannually" => Ok(CompoundingFrequency::SemiAnnual),
            "annual" | "annually" | "yearly" => Ok(CompoundingFrequency::Annual),
            _ => Err(CalculationError::invalid_parameter(format!(
                "unrecognized compounding frequency: {s:?}"
            ))),
        }
    }
}

/// one compounding period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePeriod {
    /// 1-based
    pub number: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// ordered compounding periods, built once per request and shared read-only
/// by every account evaluation in the batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSchedule {
    pub start_date: NaiveDate,
    pub frequency: CompoundingFrequency,
    pub periods: Vec<SchedulePeriod>,
}

impl PeriodSchedule {
    /// generate `interval_count` consecutive periods starting at `start_date`.
    ///
    /// Boundary `k` is always computed as `start_date + k * step`, so month-end
    /// starts clamp per month (Jan 31, Feb 29, Mar 31, ...) instead of drifting.
    pub fn generate(
        start_date: NaiveDate,
        interval_count: u32,
        frequency: CompoundingFrequency,
    ) -> Result<Self> {
        if interval_count == 0 {
            return Err(CalculationError::invalid_parameter(
                "interval count must be greater than zero",
            ));
        }

        // last boundary first, so an out of range count fails before allocating
        boundary(start_date, frequency.step(), interval_count)?;

        let mut periods = Vec::with_capacity(interval_count as usize);
        let mut period_start = start_date;
        for number in 1..=interval_count {
            let period_end = boundary(start_date, frequency.step(), number)?;
            periods.push(SchedulePeriod {
                number,
                start_date: period_start,
                end_date: period_end,
            });
            period_start = period_end;
        }

        Ok(Self {
            start_date,
            frequency,
            periods,
        })
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn periods_per_year(&self) -> u32 {
        self.frequency.periods_per_year()
    }

    /// last boundary of the schedule
    pub fn end_date(&self) -> NaiveDate {
        self.periods
            .last()
            .map(|p| p.end_date)
            .unwrap_or(self.start_date)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SchedulePeriod> {
        self.periods.iter()
    }
}

/// `start + k * step` with chrono's clamping month arithmetic
fn boundary(start: NaiveDate, step: Step, k: u32) -> Result<NaiveDate> {
    let overflow = || CalculationError::DateOverflow {
        message: format!("period {k} from {start} is outside the supported calendar range"),
    };

    match step {
        Step::Months(months) => {
            let offset = months.checked_mul(k).ok_or_else(overflow)?;
            start.checked_add_months(Months::new(offset)).ok_or_else(overflow)
        }
        Step::Days(days) => {
            let offset = days.checked_mul(u64::from(k)).ok_or_else(overflow)?;
            start.checked_add_days(Days::new(offset)).ok_or_else(overflow)
        }
    }
}
