pub mod config;
pub mod decimal;
pub mod engine;
pub mod errors;
pub mod evaluator;
pub mod interest;
pub mod schedule;
pub mod types;

// re-export key types
pub use config::{EngineConfig, ExecutionMode};
pub use decimal::{Money, Rate, RoundingMode, RoundingPolicy};
pub use engine::CalculationEngine;
pub use errors::{CalculationError, Result};
pub use evaluator::{AccountEvaluation, AccountEvaluator};
pub use interest::{future_value, Accrual, InterestAccumulator, PeriodBreakdown};
pub use schedule::{CompoundingFrequency, PeriodSchedule, SchedulePeriod};
pub use types::{
    Account, AccountFailure, AccountId, AccountOutcome, BatchStatus, CalculationOutcome,
    CalculationRequest, FailureKind, InterestResult, RequestId,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
