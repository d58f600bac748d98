use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::Granularity;
use crate::error::{EvalError, Result};
use crate::evaluator::Evaluator;
use crate::problem::{ExecutionOutcome, Problem, ProblemResult};
use crate::queue::{WorkQueue, WorkUnit};
use crate::sandbox::LanguageRunner;

/// A problem together with the adapter its language resolved to
pub struct Task {
    pub problem: Problem,
    pub runner: Arc<dyn LanguageRunner>,
}

/// One candidate's outcome, reported back to the collector
#[derive(Debug)]
pub struct Finished {
    pub problem: usize,
    pub candidate: usize,
    pub outcome: ExecutionOutcome,
}

pub async fn worker(
    id: usize,
    evaluator: Arc<Evaluator>,
    tasks: Arc<Vec<Task>>,
    queue: Arc<WorkQueue>,
    tx: mpsc::UnboundedSender<Finished>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    log::info!("Worker {id} initialized");

    'units: loop {
        let unit = tokio::select! {
            biased;
            _ = token.cancelled() => {
                log::info!("Worker {id} received shutdown signal, stopping");
                break;
            }
            unit = queue.pop() => match unit {
                Some(unit) => unit,
                None => break,
            },
        };

        let Some(task) = tasks.get(unit.problem) else {
            log::error!("Worker {id} got unit for unknown problem {}, discarded", unit.problem);
            continue;
        };

        for candidate in unit.candidates {
            let Some(program) = task.problem.program(candidate) else {
                log::error!(
                    "Problem {} has no completion {candidate}, skipped",
                    task.problem.id
                );
                continue;
            };

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    log::info!("Worker {id} interrupted during problem {}", task.problem.id);
                    break 'units;
                }
                outcome = evaluator.evaluate_candidate(Arc::clone(&task.runner), program) => outcome,
            };
            log::debug!(
                "Worker {id} finished candidate {candidate} of {}: {:?}",
                task.problem.id,
                outcome.status
            );

            let finished = Finished {
                problem: unit.problem,
                candidate,
                outcome,
            };
            if tx.send(finished).is_err() {
                log::warn!("Collector gone, worker {id} stopping");
                break 'units;
            }
        }
    }

    log::info!("Worker {id} has shut down");
    Ok(())
}

/// Fans candidates out over a bounded pool of workers and gathers them back
/// into per-problem results.
///
/// At most `workers` candidate programs run at any moment. Outcomes keep
/// the order of the completions they belong to no matter which worker
/// finished them first.
pub struct Scheduler {
    evaluator: Arc<Evaluator>,
    workers: usize,
    granularity: Granularity,
    resume: bool,
}

impl Scheduler {
    pub fn new(evaluator: Arc<Evaluator>, workers: usize, granularity: Granularity, resume: bool) -> Self {
        Self {
            evaluator,
            workers: workers.max(1),
            granularity,
            resume,
        }
    }

    /// Evaluates every problem and returns results in input order.
    ///
    /// Unknown languages are rejected before anything runs. Cancelling the
    /// token stops the pool; problems completed by then are already
    /// persisted and the call returns `EvalError::Interrupted`.
    pub async fn run(&self, problems: Vec<Problem>, token: CancellationToken) -> Result<Vec<ProblemResult>> {
        let mut tasks = Vec::with_capacity(problems.len());
        for problem in problems {
            let (_, runner) = self.evaluator.registry().resolve(&problem.language)?;
            tasks.push(Task { problem, runner });
        }

        let mut results: Vec<Option<ProblemResult>> = tasks.iter().map(|_| None).collect();
        if let Some(store) = self.evaluator.store() {
            for (i, task) in tasks.iter().enumerate() {
                if self.resume {
                    results[i] = self.resumed(task);
                }
                if results[i].is_none() {
                    store.save_problem(&task.problem)?;
                }
            }
        }

        let queue = Arc::new(WorkQueue::new());
        let mut slots: Vec<Vec<Option<ExecutionOutcome>>> = Vec::with_capacity(tasks.len());
        let mut remaining = Vec::with_capacity(tasks.len());
        let mut units = 0usize;
        for (i, task) in tasks.iter().enumerate() {
            let n = task.problem.completions.len();
            let pending = results[i].is_none();
            slots.push((0..n).map(|_| None).collect());
            remaining.push(if pending { n } else { 0 });
            if !pending {
                continue;
            }
            if n == 0 {
                results[i] = Some(self.complete(&task.problem, Vec::new()));
                continue;
            }
            for unit in self.units(i, n) {
                queue.push(unit).await;
                units += 1;
            }
        }
        queue.close();

        let tasks = Arc::new(tasks);
        let pool_size = self.workers.min(units);
        log::info!(
            "Evaluating {units} work units from {} problems on {pool_size} workers",
            tasks.len()
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut workers = JoinSet::new();
        for id in 1..=pool_size {
            workers.spawn(worker(
                id,
                Arc::clone(&self.evaluator),
                Arc::clone(&tasks),
                Arc::clone(&queue),
                tx.clone(),
                token.clone(),
            ));
        }
        drop(tx);

        while let Some(Finished {
            problem,
            candidate,
            outcome,
        }) = rx.recv().await
        {
            let Some(slot) = slots.get_mut(problem).and_then(|s| s.get_mut(candidate)) else {
                continue;
            };
            if slot.replace(outcome).is_some() {
                log::warn!("Candidate {candidate} of problem {problem} reported twice");
                continue;
            }
            remaining[problem] -= 1;
            if remaining[problem] == 0 {
                let outcomes = std::mem::take(&mut slots[problem]).into_iter().flatten().collect();
                results[problem] = Some(self.complete(&tasks[problem].problem, outcomes));
            }
        }

        while let Some(res) = workers.join_next().await {
            match res {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::error!("Worker finished with error: {e:#}"),
                Err(e) if e.is_panic() => log::error!("Worker handle panicked: {e:?}"),
                Err(e) => log::error!("Worker handle finished with error: {e:?}"),
            }
        }

        let total = results.len();
        let results: Vec<ProblemResult> = results.into_iter().flatten().collect();
        if results.len() < total {
            log::warn!("{} of {total} problems left unfinished", total - results.len());
            return Err(EvalError::Interrupted);
        }
        Ok(results)
    }

    fn units(&self, problem: usize, n: usize) -> Vec<WorkUnit> {
        match self.granularity {
            Granularity::Candidate => (0..n)
                .map(|c| WorkUnit {
                    problem,
                    candidates: c..c + 1,
                })
                .collect(),
            Granularity::Problem => vec![WorkUnit {
                problem,
                candidates: 0..n,
            }],
        }
    }

    /// A stored result is reused only when it covers every completion
    fn resumed(&self, task: &Task) -> Option<ProblemResult> {
        let store = self.evaluator.store()?;
        match store.load_result(&task.problem.id) {
            Ok(Some(result)) if result.outcomes.len() == task.problem.completions.len() => {
                log::info!("Resuming problem {} from stored result", task.problem.id);
                Some(result)
            }
            Ok(Some(_)) => {
                log::info!("Stored result for {} is incomplete, re-evaluating", task.problem.id);
                None
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("Unable to read stored result for {}: {e}", task.problem.id);
                None
            }
        }
    }

    fn complete(&self, problem: &Problem, outcomes: Vec<ExecutionOutcome>) -> ProblemResult {
        let result = self.evaluator.finish(problem, outcomes);
        self.evaluator
            .persist(&result)
            .unwrap_or_else(|e| log::error!("Failed to save result of problem {}: {e}", result.id));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::problem::Status;
    use crate::registry::Registry;
    use crate::sandbox::{ExecContext, Step};

    /// Passes programs containing "ok", tracks peak concurrency
    struct Gauge {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl LanguageRunner for Gauge {
        fn name(&self) -> &'static str {
            "gauge"
        }

        fn extension(&self) -> &'static str {
            ".g"
        }

        fn steps(&self, _: &std::path::Path, _: &std::path::Path) -> Vec<Step> {
            Vec::new()
        }

        async fn evaluate(&self, _: &ExecContext, program: &str) -> anyhow::Result<ExecutionOutcome> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            let passed = program.contains("ok");
            Ok(ExecutionOutcome {
                program: program.to_string(),
                stdout: String::new(),
                stderr: String::new(),
                exit_code: Some(if passed { 0 } else { 1 }),
                status: if passed { Status::Ok } else { Status::Exception },
                timed_out: false,
            })
        }
    }

    fn setup() -> (Arc<Evaluator>, Arc<Gauge>) {
        let gauge = Arc::new(Gauge {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let mut registry = Registry::new();
        registry.register(&["gauge"], gauge.clone()).unwrap();
        let ctx = ExecContext::new(std::env::temp_dir(), Duration::from_secs(5), 4096);
        (Arc::new(Evaluator::new(Arc::new(registry), ctx)), gauge)
    }

    fn problem(id: &str, completions: &[&str]) -> Problem {
        Problem {
            id: id.to_string(),
            language: "gauge".to_string(),
            prompt: String::new(),
            completions: completions.iter().map(|c| c.to_string()).collect(),
            tests: String::new(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_outcomes_keep_completion_order() {
        let (evaluator, gauge) = setup();
        let scheduler = Scheduler::new(evaluator, 3, Granularity::Candidate, false);
        let problems = vec![
            problem("a", &["ok 0", "bad 1", "ok 2", "bad 3", "ok 4"]),
            problem("b", &[]),
            problem("c", &["bad", "ok"]),
        ];

        let results = scheduler.run(problems, CancellationToken::new()).await.unwrap();

        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        let programs: Vec<_> = results[0].outcomes.iter().map(|o| o.program.as_str()).collect();
        assert_eq!(programs, ["ok 0", "bad 1", "ok 2", "bad 3", "ok 4"]);
        assert_eq!(results[0].num_correct(), 3);
        assert!(results[1].outcomes.is_empty());
        assert_eq!(results[2].num_correct(), 1);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_problem_granularity_runs_one_candidate_per_worker() {
        let (evaluator, gauge) = setup();
        let scheduler = Scheduler::new(evaluator, 4, Granularity::Problem, false);
        let problems = vec![problem("a", &["ok"; 6]), problem("b", &["bad"; 6])];

        let results = scheduler.run(problems, CancellationToken::new()).await.unwrap();

        assert_eq!(results[0].num_correct(), 6);
        assert_eq!(results[1].num_correct(), 0);
        // two problem units, so never more than two programs at once
        assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_unknown_language_fails_before_running() {
        let (evaluator, gauge) = setup();
        let scheduler = Scheduler::new(evaluator, 2, Granularity::Candidate, false);
        let mut bad = problem("x", &["ok"]);
        bad.language = "cobol".to_string();

        let err = scheduler
            .run(vec![problem("a", &["ok"]), bad], CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, EvalError::UnsupportedLanguage(tag) if tag == "cobol"));
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_run_is_interrupted() {
        let (evaluator, _) = setup();
        let scheduler = Scheduler::new(evaluator, 1, Granularity::Candidate, false);
        let token = CancellationToken::new();
        token.cancel();

        let err = scheduler
            .run(vec![problem("a", &["ok", "ok"])], token)
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::Interrupted));
    }
}
