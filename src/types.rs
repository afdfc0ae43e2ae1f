use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ExecutionMode;
use crate::decimal::{Money, Rate};
use crate::errors::{CalculationError, Result};
use crate::interest::Accrual;
use crate::schedule::CompoundingFrequency;

/// caller supplied account identifier
pub type AccountId = String;

/// correlates log lines and outcomes for one request
pub type RequestId = Uuid;

/// account to compound
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub principal: Money,
    /// annual nominal rate as a fraction
    pub annual_rate: Rate,
}

impl Account {
    pub fn new(id: impl Into<AccountId>, principal: Money, annual_rate: Rate) -> Self {
        Self {
            id: id.into(),
            principal,
            annual_rate,
        }
    }
}

/// one batch of accounts sharing a schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationRequest {
    #[serde(default = "Uuid::new_v4")]
    pub request_id: RequestId,
    pub accounts: Vec<Account>,
    pub start_date: NaiveDate,
    pub intervals: u32,
    pub frequency: CompoundingFrequency,
    #[serde(default)]
    pub include_breakdowns: bool,
}

impl CalculationRequest {
    pub fn new(
        accounts: Vec<Account>,
        start_date: NaiveDate,
        intervals: u32,
        frequency: CompoundingFrequency,
        include_breakdowns: bool,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            accounts,
            start_date,
            intervals,
            frequency,
            include_breakdowns,
        }
    }

    /// rejects an empty batch; schedule and per-account values are checked later
    pub fn validate(&self) -> Result<()> {
        if self.accounts.is_empty() {
            return Err(CalculationError::invalid_parameter("account list is empty"));
        }
        Ok(())
    }
}

/// why an account could not be computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidParameter,
    ArithmeticOverflow,
    WorkerFailure,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&CalculationError> for AccountFailure {
    fn from(err: &CalculationError) -> Self {
        let kind = match err {
            CalculationError::InvalidParameter { .. }
            | CalculationError::DateOverflow { .. }
            | CalculationError::BatchInitialization { .. }
            | CalculationError::InvalidConfiguration { .. } => FailureKind::InvalidParameter,
            CalculationError::ArithmeticOverflow { .. } => FailureKind::ArithmeticOverflow,
            CalculationError::WorkerFailure { .. } => FailureKind::WorkerFailure,
            CalculationError::Timeout { .. } => FailureKind::Timeout,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// per-account outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AccountOutcome {
    Computed(Accrual),
    Failed(AccountFailure),
}

/// result for one account, in the position of that account in the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestResult {
    pub account_id: AccountId,
    pub outcome: AccountOutcome,
}

impl InterestResult {
    pub fn computed(account_id: AccountId, accrual: Accrual) -> Self {
        Self {
            account_id,
            outcome: AccountOutcome::Computed(accrual),
        }
    }

    pub fn failed(account_id: AccountId, err: &CalculationError) -> Self {
        Self {
            account_id,
            outcome: AccountOutcome::Failed(err.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AccountOutcome::Computed(_))
    }

    pub fn accrual(&self) -> Option<&Accrual> {
        match &self.outcome {
            AccountOutcome::Computed(accrual) => Some(accrual),
            AccountOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&AccountFailure> {
        match &self.outcome {
            AccountOutcome::Computed(_) => None,
            AccountOutcome::Failed(failure) => Some(failure),
        }
    }

    pub fn final_balance(&self) -> Option<Money> {
        self.accrual().map(|a| a.final_balance)
    }

    pub fn total_interest(&self) -> Option<Money> {
        self.accrual().map(|a| a.total_interest)
    }
}

/// overall batch status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// every account computed
    Completed,
    /// processed, but at least one account carries a failure
    CompletedWithFailures,
}

/// ordered results for a whole request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationOutcome {
    pub request_id: RequestId,
    pub mode: ExecutionMode,
    pub status: BatchStatus,
    pub results: Vec<InterestResult>,
}

impl CalculationOutcome {
    pub fn new(request_id: RequestId, mode: ExecutionMode, results: Vec<InterestResult>) -> Self {
        let status = if results.iter().all(InterestResult::is_success) {
            BatchStatus::Completed
        } else {
            BatchStatus::CompletedWithFailures
        };
        Self {
            request_id,
            mode,
            status,
            results,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BatchStatus::Completed
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// interest earned across all computed accounts
    pub fn total_interest(&self) -> Result<Money> {
        self.results
            .iter()
            .filter_map(InterestResult::total_interest)
            .try_fold(Money::ZERO, |total, interest| {
                total.checked_add(interest).ok_or_else(|| {
                    CalculationError::overflow(format!(
                        "batch total interest exceeds the decimal range after {total}"
                    ))
                })
            })
    }
}
