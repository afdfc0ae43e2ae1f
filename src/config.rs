use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::decimal::{RoundingPolicy, MAX_SCALE};
use crate::errors::{CalculationError, Result};

/// how accounts of a batch are dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionMode {
    /// one account at a time, in input order
    #[default]
    Sequential,
    /// one task per account on a rayon pool; `None` uses the global pool
    Concurrent { pool_size: Option<usize> },
}

impl ExecutionMode {
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionMode::Sequential => "sequential",
            ExecutionMode::Concurrent { .. } => "concurrent",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Concurrent { pool_size: Some(n) } => write!(f, "concurrent({n})"),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = CalculationError;

    /// `sequential`, `concurrent` or `concurrent:<threads>`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.split_once(':') {
            None if s == "sequential" => Ok(ExecutionMode::Sequential),
            None if s == "concurrent" => Ok(ExecutionMode::Concurrent { pool_size: None }),
            Some(("concurrent", threads)) => threads
                .parse::<usize>()
                .map(|n| ExecutionMode::Concurrent { pool_size: Some(n) })
                .map_err(|_| CalculationError::InvalidConfiguration {
                    message: format!("invalid pool size: {threads:?}"),
                }),
            _ => Err(CalculationError::InvalidConfiguration {
                message: format!("unknown execution mode: {s:?}"),
            }),
        }
    }
}

/// engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// mode used by `CalculationEngine::calculate`
    pub execution_mode: ExecutionMode,
    pub rounding: RoundingPolicy,
    /// accounts dispatched between two deadline checks
    pub wave_size: usize,
    /// per-request budget, measured from the start of `run`
    pub deadline_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::Sequential,
            rounding: RoundingPolicy::CENTS,
            wave_size: 1024,
            deadline_ms: None,
        }
    }
}

impl EngineConfig {
    /// sequential evaluation, cents rounding
    pub fn sequential() -> Self {
        Self::default()
    }

    /// concurrent evaluation on a dedicated pool of `pool_size` threads
    pub fn concurrent(pool_size: usize) -> Self {
        Self {
            execution_mode: ExecutionMode::Concurrent {
                pool_size: Some(pool_size),
            },
            ..Self::default()
        }
    }

    pub fn with_rounding(mut self, rounding: RoundingPolicy) -> Self {
        self.rounding = rounding;
        self
    }

    pub fn with_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.deadline_ms = Some(deadline_ms);
        self
    }

    pub fn with_wave_size(mut self, wave_size: usize) -> Self {
        self.wave_size = wave_size;
        self
    }

    /// parse and validate a JSON document; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| CalculationError::InvalidConfiguration {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rounding.scale > MAX_SCALE {
            return Err(CalculationError::InvalidConfiguration {
                message: format!(
                    "rounding scale {} exceeds maximum {MAX_SCALE}",
                    self.rounding.scale
                ),
            });
        }
        if self.wave_size == 0 {
            return Err(CalculationError::InvalidConfiguration {
                message: "wave size must be greater than zero".to_string(),
            });
        }
        if let ExecutionMode::Concurrent { pool_size: Some(0) } = self.execution_mode {
            return Err(CalculationError::InvalidConfiguration {
                message: "pool size must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
