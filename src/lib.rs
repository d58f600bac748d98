pub mod cache;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod languages;
pub mod passk;
pub mod problem;
pub mod queue;
pub mod registry;
pub mod sandbox;
pub mod store;
pub mod worker;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::EvalConfig;
use crate::error::{EvalError, Result};
use crate::evaluator::Evaluator;
use crate::passk::Metrics;
use crate::problem::{Problem, ProblemResult};
use crate::store::ResultStore;
use crate::worker::Scheduler;

pub fn create_timestamp() -> String {
    use chrono::{SecondsFormat, Utc};
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Opens the configured results directory, or the per-user default
pub fn open_store(config: &EvalConfig) -> Result<ResultStore> {
    let dir = match &config.results_dir {
        Some(dir) => dir.clone(),
        None => store::default_results_dir()?,
    };
    Ok(ResultStore::open(dir)?)
}

/// Evaluates every problem with the builtin adapters and reduces the
/// results to pass@k metrics.
///
/// Refuses to run anything unless `allow_code_execution` is set.
pub async fn run_benchmark(
    config: &EvalConfig,
    problems: Vec<Problem>,
    token: CancellationToken,
) -> Result<(Vec<ProblemResult>, Metrics)> {
    if !config.allow_code_execution {
        return Err(EvalError::ExecutionNotAllowed);
    }

    let store = open_store(config)?;
    let evaluator = Arc::new(Evaluator::from_config(config).with_store(store));
    let scheduler = Scheduler::new(
        Arc::clone(&evaluator),
        config.worker_count(),
        config.granularity,
        config.resume,
    );

    let results = scheduler.run(problems, token).await?;
    if let Some(cache) = evaluator.cache() {
        let stats = cache.stats();
        log::info!(
            "Outcome cache: {} entries, {} hits, {} misses",
            stats.entries,
            stats.hits,
            stats.misses
        );
    }

    let metrics = passk::reduce(&results, &config.k);
    Ok((results, metrics))
}
