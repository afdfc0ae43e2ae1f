use chrono::{DateTime, Duration, Utc};
use hourglass_rs::{SafeTimeProvider, TimeSource};
use log::{info, warn};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::config::{EngineConfig, ExecutionMode};
use crate::errors::{CalculationError, Result};
use crate::evaluator::{AccountEvaluation, AccountEvaluator};
use crate::schedule::PeriodSchedule;
use crate::types::{Account, CalculationOutcome, CalculationRequest, InterestResult};

/// compound interest engine for batches of accounts.
///
/// One schedule is built per request. Results come back in the order of the
/// request's accounts; in concurrent mode each account owns one pre-allocated
/// slot, handed to workers as a disjoint `&mut` borrow.
pub struct CalculationEngine<E: AccountEvaluation = AccountEvaluator> {
    config: EngineConfig,
    evaluator: E,
    time: SafeTimeProvider,
}

impl CalculationEngine<AccountEvaluator> {
    /// engine on the system clock
    pub fn new(config: EngineConfig) -> Self {
        Self::with_time(config, SafeTimeProvider::new(TimeSource::System))
    }

    /// engine measuring deadlines on `time`
    pub fn with_time(config: EngineConfig, time: SafeTimeProvider) -> Self {
        let evaluator = AccountEvaluator::new(config.rounding);
        Self::with_evaluator(config, evaluator, time)
    }
}

impl<E: AccountEvaluation> CalculationEngine<E> {
    pub fn with_evaluator(config: EngineConfig, evaluator: E, time: SafeTimeProvider) -> Self {
        Self {
            config,
            evaluator,
            time,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// run with the configured execution mode
    pub fn calculate(&self, request: &CalculationRequest) -> Result<CalculationOutcome> {
        self.run(request, self.config.execution_mode)
    }

    /// evaluate accounts one after another
    pub fn calculate_compound_interest(
        &self,
        request: &CalculationRequest,
    ) -> Result<CalculationOutcome> {
        self.run(request, ExecutionMode::Sequential)
    }

    /// evaluate accounts concurrently, using the configured pool size if any
    pub fn calculate_compound_interest_concurrent(
        &self,
        request: &CalculationRequest,
    ) -> Result<CalculationOutcome> {
        let pool_size = match self.config.execution_mode {
            ExecutionMode::Concurrent { pool_size } => pool_size,
            ExecutionMode::Sequential => None,
        };
        self.run(request, ExecutionMode::Concurrent { pool_size })
    }

    /// run `request` in `mode`, applying `deadline_ms` from the config
    pub fn run(
        &self,
        request: &CalculationRequest,
        mode: ExecutionMode,
    ) -> Result<CalculationOutcome> {
        self.run_with_deadline(request, mode, self.configured_deadline())
    }

    /// run `request` in `mode`.
    ///
    /// Accounts not yet started once `deadline` has passed are reported as
    /// timed out. Only an empty batch, an unbuildable schedule or a worker pool
    /// that cannot start fail the whole call.
    pub fn run_with_deadline(
        &self,
        request: &CalculationRequest,
        mode: ExecutionMode,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<CalculationOutcome> {
        request.validate()?;

        info!(
            "request {}: {} accounts, {} {} periods from {} ({})",
            request.request_id,
            request.accounts.len(),
            request.intervals,
            request.frequency,
            request.start_date,
            mode
        );

        let schedule =
            PeriodSchedule::generate(request.start_date, request.intervals, request.frequency)
                .map_err(|e| CalculationError::BatchInitialization {
                    message: format!("cannot build period schedule: {e}"),
                })?;

        let results = match mode {
            ExecutionMode::Sequential => self.run_sequential(request, &schedule, deadline),
            ExecutionMode::Concurrent { pool_size } => {
                self.run_concurrent(request, &schedule, pool_size, deadline)?
            }
        };

        let outcome = CalculationOutcome::new(request.request_id, mode, results);
        info!(
            "request {}: {} computed, {} failed",
            request.request_id,
            outcome.succeeded(),
            outcome.failed()
        );
        Ok(outcome)
    }

    fn configured_deadline(&self) -> Option<DateTime<Utc>> {
        let ms = i64::try_from(self.config.deadline_ms?).ok()?;
        self.time.now().checked_add_signed(Duration::milliseconds(ms))
    }

    fn expired(&self, deadline: Option<DateTime<Utc>>) -> bool {
        deadline.map_or(false, |d| self.time.now() > d)
    }

    fn run_sequential(
        &self,
        request: &CalculationRequest,
        schedule: &PeriodSchedule,
        deadline: Option<DateTime<Utc>>,
    ) -> Vec<InterestResult> {
        let mut results = Vec::with_capacity(request.accounts.len());
        let mut expired = false;

        for (index, account) in request.accounts.iter().enumerate() {
            if !expired && self.expired(deadline) {
                warn!(
                    "request {}: deadline passed at position {index}",
                    request.request_id
                );
                expired = true;
            }

            let result = match deadline {
                Some(d) if expired => timed_out(account, d),
                _ => self
                    .evaluator
                    .evaluate(account, schedule, request.include_breakdowns),
            };
            results.push(result);
        }

        results
    }

    fn run_concurrent(
        &self,
        request: &CalculationRequest,
        schedule: &PeriodSchedule,
        pool_size: Option<usize>,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<Vec<InterestResult>> {
        let pool = build_pool(pool_size)?;
        let wave_size = self.config.wave_size.max(1);

        let mut slots: Vec<Option<InterestResult>> = vec![None; request.accounts.len()];
        let mut expired = false;

        let waves = slots
            .chunks_mut(wave_size)
            .zip(request.accounts.chunks(wave_size))
            .enumerate();

        for (wave, (slot_wave, account_wave)) in waves {
            let first_index = wave * wave_size;

            if !expired && self.expired(deadline) {
                warn!(
                    "request {}: deadline passed, {} accounts not started",
                    request.request_id,
                    request.accounts.len() - first_index
                );
                expired = true;
            }

            if let (true, Some(d)) = (expired, deadline) {
                for (slot, account) in slot_wave.iter_mut().zip(account_wave) {
                    *slot = Some(timed_out(account, d));
                }
                continue;
            }

            let job = WaveJob {
                evaluator: &self.evaluator,
                schedule,
                include_breakdown: request.include_breakdowns,
                first_index,
            };
            match &pool {
                Some(pool) => pool.install(|| job.dispatch(slot_wave, account_wave)),
                None => job.dispatch(slot_wave, account_wave),
            }
        }

        let results = slots
            .into_iter()
            .zip(&request.accounts)
            .enumerate()
            .map(|(index, (slot, account))| {
                slot.unwrap_or_else(|| {
                    warn!("account {} (position {index}): result slot empty", account.id);
                    InterestResult::failed(
                        account.id.clone(),
                        &CalculationError::WorkerFailure {
                            index,
                            message: "no result was recorded".to_string(),
                        },
                    )
                })
            })
            .collect();

        Ok(results)
    }
}

/// one wave of concurrent evaluations
struct WaveJob<'a, E> {
    evaluator: &'a E,
    schedule: &'a PeriodSchedule,
    include_breakdown: bool,
    first_index: usize,
}

impl<E: AccountEvaluation> WaveJob<'_, E> {
    fn dispatch(&self, slots: &mut [Option<InterestResult>], accounts: &[Account]) {
        slots
            .par_iter_mut()
            .zip(accounts.par_iter())
            .enumerate()
            .for_each(|(offset, (slot, account))| {
                *slot = Some(self.evaluate_isolated(self.first_index + offset, account));
            });
    }

    /// a panicking evaluation becomes a failure in its own slot only
    fn evaluate_isolated(&self, index: usize, account: &Account) -> InterestResult {
        panic::catch_unwind(AssertUnwindSafe(|| {
            self.evaluator
                .evaluate(account, self.schedule, self.include_breakdown)
        }))
        .unwrap_or_else(|payload| {
            let message = panic_message(&*payload);
            warn!(
                "account {} (position {index}): worker failed: {message}",
                account.id
            );
            InterestResult::failed(
                account.id.clone(),
                &CalculationError::WorkerFailure { index, message },
            )
        })
    }
}

fn build_pool(pool_size: Option<usize>) -> Result<Option<ThreadPool>> {
    match pool_size {
        None => Ok(None),
        Some(0) => Err(CalculationError::BatchInitialization {
            message: "worker pool size must be greater than zero".to_string(),
        }),
        Some(threads) => ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("interest-worker-{i}"))
            .build()
            .map(Some)
            .map_err(|e| CalculationError::BatchInitialization {
                message: format!("cannot start worker pool: {e}"),
            }),
    }
}

fn timed_out(account: &Account, deadline: DateTime<Utc>) -> InterestResult {
    InterestResult::failed(account.id.clone(), &CalculationError::Timeout { deadline })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::{Money, Rate};
    use crate::schedule::CompoundingFrequency;
    use crate::types::{BatchStatus, FailureKind};
    use chrono::{NaiveDate, TimeZone};
    use hourglass_rs::TimeControl;
    use rust_decimal_macros::dec;

    fn test_time() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ))
    }

    fn accounts(n: usize) -> Vec<Account> {
        (0..n)
            .map(|i| {
                Account::new(
                    format!("acc-{i}"),
                    Money::from_major(1_000 + i as i64 * 250),
                    Rate::from_bps(100 + (i as u32 % 7) * 75),
                )
            })
            .collect()
    }

    fn request(accounts: Vec<Account>, breakdowns: bool) -> CalculationRequest {
        CalculationRequest::new(
            accounts,
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            24,
            CompoundingFrequency::Monthly,
            breakdowns,
        )
    }

    /// advances the test clock by one second per evaluated account
    struct TickingEvaluator {
        control: TimeControl,
        inner: AccountEvaluator,
    }

    impl AccountEvaluation for TickingEvaluator {
        fn evaluate(
            &self,
            account: &Account,
            schedule: &PeriodSchedule,
            include_breakdown: bool,
        ) -> InterestResult {
            self.control.advance(Duration::seconds(1));
            self.inner.evaluate(account, schedule, include_breakdown)
        }
    }

    fn ticking_engine(wave_size: usize) -> (CalculationEngine<TickingEvaluator>, DateTime<Utc>) {
        let time = test_time();
        let deadline = time.now() + Duration::milliseconds(2_500);
        let evaluator = TickingEvaluator {
            control: time.test_control().unwrap(),
            inner: AccountEvaluator::default(),
        };
        let config = EngineConfig::concurrent(2).with_wave_size(wave_size);
        (CalculationEngine::with_evaluator(config, evaluator, time), deadline)
    }

    fn timed_out_positions(outcome: &CalculationOutcome) -> Vec<bool> {
        outcome
            .results
            .iter()
            .map(|r| r.failure().map_or(false, |f| f.kind == FailureKind::Timeout))
            .collect()
    }

    /// panics for one account id, evaluates the rest normally
    struct FailingEvaluator {
        poisoned: &'static str,
        inner: AccountEvaluator,
    }

    impl AccountEvaluation for FailingEvaluator {
        fn evaluate(
            &self,
            account: &Account,
            schedule: &PeriodSchedule,
            include_breakdown: bool,
        ) -> InterestResult {
            if account.id == self.poisoned {
                panic!("evaluator blew up on {}", account.id);
            }
            self.inner.evaluate(account, schedule, include_breakdown)
        }
    }

    #[test]
    fn test_sequential_preserves_order() {
        let engine = CalculationEngine::with_time(EngineConfig::sequential(), test_time());
        let req = request(accounts(5), false);

        let outcome = engine.calculate_compound_interest(&req).unwrap();

        assert_eq!(outcome.mode, ExecutionMode::Sequential);
        assert_eq!(outcome.status, BatchStatus::Completed);
        let ids: Vec<&str> = outcome.results.iter().map(|r| r.account_id.as_str()).collect();
        assert_eq!(ids, vec!["acc-0", "acc-1", "acc-2", "acc-3", "acc-4"]);
    }

    #[test]
    fn test_modes_agree() {
        let engine = CalculationEngine::with_time(
            EngineConfig::concurrent(4).with_wave_size(7),
            test_time(),
        );
        let req = request(accounts(50), true);

        let sequential = engine.calculate_compound_interest(&req).unwrap();
        let concurrent = engine.calculate_compound_interest_concurrent(&req).unwrap();

        assert_eq!(concurrent.mode, ExecutionMode::Concurrent { pool_size: Some(4) });
        assert_eq!(sequential.results, concurrent.results);
    }

    #[test]
    fn test_global_pool() {
        let engine = CalculationEngine::with_time(EngineConfig::sequential(), test_time());
        let req = request(accounts(20), false);

        let outcome = engine.calculate_compound_interest_concurrent(&req).unwrap();

        assert_eq!(outcome.mode, ExecutionMode::Concurrent { pool_size: None });
        assert_eq!(outcome.results.len(), 20);
        assert!(outcome.is_success());
    }

    #[test]
    fn test_failure_is_isolated_in_both_modes() {
        let mut input = accounts(10);
        input[6].annual_rate = Rate::from_decimal(dec!(-0.02));
        let req = request(input, false);

        let engine = CalculationEngine::with_time(EngineConfig::concurrent(3), test_time());
        for mode in [ExecutionMode::Sequential, ExecutionMode::Concurrent { pool_size: Some(3) }] {
            let outcome = engine.run(&req, mode).unwrap();
            assert_eq!(outcome.status, BatchStatus::CompletedWithFailures);
            assert_eq!(outcome.succeeded(), 9);
            assert_eq!(outcome.results[6].account_id, "acc-6");
            assert_eq!(
                outcome.results[6].failure().unwrap().kind,
                FailureKind::InvalidParameter
            );
        }
    }

    #[test]
    fn test_worker_panic_is_isolated() {
        let evaluator = FailingEvaluator {
            poisoned: "acc-3",
            inner: AccountEvaluator::default(),
        };
        let engine =
            CalculationEngine::with_evaluator(EngineConfig::concurrent(2), evaluator, test_time());
        let req = request(accounts(8), false);

        let outcome = engine.calculate_compound_interest_concurrent(&req).unwrap();

        assert_eq!(outcome.results.len(), 8);
        assert_eq!(outcome.failed(), 1);
        let failure = outcome.results[3].failure().unwrap();
        assert_eq!(failure.kind, FailureKind::WorkerFailure);
        assert!(failure.message.contains("evaluator blew up on acc-3"));
        assert!(failure.message.contains("position 3"));
    }

    #[test]
    fn test_empty_batch_rejected() {
        let engine = CalculationEngine::with_time(EngineConfig::sequential(), test_time());
        let req = request(vec![], false);

        for mode in [ExecutionMode::Sequential, ExecutionMode::Concurrent { pool_size: None }] {
            assert!(matches!(
                engine.run(&req, mode),
                Err(CalculationError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn test_schedule_failure_is_fatal() {
        let engine = CalculationEngine::with_time(EngineConfig::sequential(), test_time());
        let mut req = request(accounts(3), false);
        req.intervals = 0;

        assert!(matches!(
            engine.calculate_compound_interest(&req),
            Err(CalculationError::BatchInitialization { .. })
        ));
    }

    #[test]
    fn test_interval_count_beyond_calendar_is_fatal() {
        let engine = CalculationEngine::with_time(EngineConfig::sequential(), test_time());
        let mut req = request(accounts(2), false);
        req.intervals = u32::MAX;

        for mode in [ExecutionMode::Sequential, ExecutionMode::Concurrent { pool_size: Some(2) }] {
            assert!(matches!(
                engine.run(&req, mode),
                Err(CalculationError::BatchInitialization { .. })
            ));
        }
    }

    #[test]
    fn test_zero_pool_size_is_fatal() {
        let engine = CalculationEngine::with_time(EngineConfig::sequential(), test_time());
        let req = request(accounts(3), false);

        assert!(matches!(
            engine.run(&req, ExecutionMode::Concurrent { pool_size: Some(0) }),
            Err(CalculationError::BatchInitialization { .. })
        ));
    }

    #[test]
    fn test_passed_deadline_times_out_every_slot() {
        let time = test_time();
        let deadline = time.now() - Duration::seconds(1);
        let engine = CalculationEngine::with_time(EngineConfig::concurrent(2), time);
        let req = request(accounts(6), false);

        for mode in [ExecutionMode::Sequential, ExecutionMode::Concurrent { pool_size: Some(2) }] {
            let outcome = engine.run_with_deadline(&req, mode, Some(deadline)).unwrap();
            assert_eq!(outcome.results.len(), 6);
            for (i, result) in outcome.results.iter().enumerate() {
                assert_eq!(result.account_id, format!("acc-{i}"));
                assert_eq!(result.failure().unwrap().kind, FailureKind::Timeout);
            }
        }
    }

    #[test]
    fn test_deadline_mid_batch_sequential() {
        let (engine, deadline) = ticking_engine(2);
        let req = request(accounts(6), false);

        let outcome = engine
            .run_with_deadline(&req, ExecutionMode::Sequential, Some(deadline))
            .unwrap();

        // checked before each account: t=0,1,2 start, t=3 is past 2.5s
        assert_eq!(
            timed_out_positions(&outcome),
            vec![false, false, false, true, true, true]
        );
        assert!(outcome.results[..3].iter().all(InterestResult::is_success));
        assert_eq!(outcome.status, BatchStatus::CompletedWithFailures);
    }

    #[test]
    fn test_deadline_mid_batch_concurrent() {
        let (engine, deadline) = ticking_engine(2);
        let req = request(accounts(6), false);

        let outcome = engine
            .run_with_deadline(&req, ExecutionMode::Concurrent { pool_size: Some(2) }, Some(deadline))
            .unwrap();

        // checked before each wave of two: t=0 and t=2 start, t=4 is past 2.5s
        assert_eq!(
            timed_out_positions(&outcome),
            vec![false, false, false, false, true, true]
        );
        assert!(outcome.results[..4].iter().all(InterestResult::is_success));
        for (i, result) in outcome.results.iter().enumerate() {
            assert_eq!(result.account_id, format!("acc-{i}"));
        }
    }

    #[test]
    fn test_configured_deadline_on_frozen_clock() {
        let config = EngineConfig::concurrent(2).with_deadline_ms(50);
        let engine = CalculationEngine::with_time(config, test_time());
        let req = request(accounts(6), false);

        let outcome = engine.calculate(&req).unwrap();
        assert!(outcome.is_success());
    }
}
