use std::sync::Arc;

use tokio_util::task::AbortOnDropHandle;

use crate::cache::{CacheKey, OutcomeCache};
use crate::config::EvalConfig;
use crate::create_timestamp;
use crate::error::Result;
use crate::problem::{ExecutionOutcome, Problem, ProblemResult};
use crate::registry::Registry;
use crate::sandbox::{ExecContext, LanguageRunner};
use crate::store::ResultStore;

/// Turns problems into outcomes: synthesizes programs, consults the cache,
/// dispatches to adapters and persists results.
///
/// Any failure inside one candidate's evaluation, including a panicking
/// adapter, becomes an `Exception` outcome for that candidate alone.
pub struct Evaluator {
    registry: Arc<Registry>,
    ctx: Arc<ExecContext>,
    cache: Option<Arc<OutcomeCache>>,
    store: Option<ResultStore>,
}

impl Evaluator {
    pub fn new(registry: Arc<Registry>, ctx: ExecContext) -> Self {
        Self {
            registry,
            ctx: Arc::new(ctx),
            cache: None,
            store: None,
        }
    }

    /// Builtin registry, a fresh cache if enabled, and no store
    pub fn from_config(config: &EvalConfig) -> Self {
        let registry = Registry::builtin();
        let mut ctx = ExecContext::from_config(config);
        for (tag, timeout) in config.language_timeouts() {
            match registry.resolve(&tag) {
                Ok((_, runner)) => {
                    ctx.language_timeouts.insert(runner.name().to_string(), timeout);
                }
                Err(e) => log::warn!("Ignoring timeout override: {e}"),
            }
        }

        let evaluator = Self::new(registry, ctx);
        if config.cache {
            evaluator.with_cache(Arc::new(OutcomeCache::new(config.cache_capacity)))
        } else {
            evaluator
        }
    }

    pub fn with_cache(mut self, cache: Arc<OutcomeCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_store(mut self, store: ResultStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> Option<&ResultStore> {
        self.store.as_ref()
    }

    pub fn cache(&self) -> Option<&OutcomeCache> {
        self.cache.as_deref()
    }

    /// Evaluates one program for a language tag.
    ///
    /// Fails only when the tag is unknown; every execution problem is
    /// reported inside the returned outcome.
    pub async fn dispatch(&self, tag: &str, program: String) -> Result<ExecutionOutcome> {
        let (_, runner) = self.registry.resolve(tag)?;
        Ok(self.evaluate_candidate(runner, program).await)
    }

    /// Cache lookup, then a guarded adapter run on a miss.
    ///
    /// Identical programs evaluated at the same time share one run.
    pub async fn evaluate_candidate(
        &self,
        runner: Arc<dyn LanguageRunner>,
        program: String,
    ) -> ExecutionOutcome {
        let Some(cache) = &self.cache else {
            return self
                .run_guarded(runner, program)
                .await
                .unwrap_or_else(|failure| failure);
        };
        let key = CacheKey::new(runner.name(), &program);
        cache
            .get_or_run(key, || self.run_guarded(runner, program))
            .await
    }

    /// Runs the adapter in its own task, aborted if this future is dropped.
    /// `Err` holds the `Exception` outcome of a harness failure.
    async fn run_guarded(
        &self,
        runner: Arc<dyn LanguageRunner>,
        program: String,
    ) -> std::result::Result<ExecutionOutcome, ExecutionOutcome> {
        let ctx = Arc::clone(&self.ctx);
        let language = runner.name();
        let handle = AbortOnDropHandle::new(tokio::spawn({
            let program = program.clone();
            async move { runner.evaluate(&ctx, &program).await }
        }));

        match handle.await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => {
                log::error!("{language} adapter failed: {e:#}");
                Err(ExecutionOutcome::harness_failure(program, format!("{e:#}")))
            }
            Err(e) => {
                log::error!("{language} adapter crashed: {e}");
                Err(ExecutionOutcome::harness_failure(
                    program,
                    format!("adapter crashed: {e}"),
                ))
            }
        }
    }

    /// Evaluates every completion of a problem in order and persists the result.
    pub async fn evaluate(&self, problem: &Problem) -> Result<ProblemResult> {
        let (_, runner) = self.registry.resolve(&problem.language)?;

        let mut outcomes = Vec::with_capacity(problem.completions.len());
        for completion in &problem.completions {
            let program =
                crate::problem::synthesize_program(&problem.prompt, completion, &problem.tests);
            outcomes.push(self.evaluate_candidate(Arc::clone(&runner), program).await);
        }

        let result = self.finish(problem, outcomes);
        self.persist(&result)?;
        Ok(result)
    }

    pub(crate) fn finish(&self, problem: &Problem, outcomes: Vec<ExecutionOutcome>) -> ProblemResult {
        ProblemResult {
            id: problem.id.clone(),
            language: problem.language.clone(),
            outcomes,
            finished_time: Some(create_timestamp()),
        }
    }

    pub(crate) fn persist(&self, result: &ProblemResult) -> Result<()> {
        if let Some(store) = &self.store {
            store.save_result(result)?;
        }
        Ok(())
    }
}
