use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::problem::{ExecutionOutcome, Status};

use super::{ExecContext, ProcessOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// A failure here short-circuits the run
    Compile,
    Run,
}

/// One command line an adapter wants executed, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub command: Vec<String>,
}

impl Step {
    pub fn compile<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: StepKind::Compile,
            command: command.into_iter().map(Into::into).collect(),
        }
    }

    pub fn run<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: StepKind::Run,
            command: command.into_iter().map(Into::into).collect(),
        }
    }
}

/// Per-language logic that compiles/executes a program and classifies it.
///
/// Implementations only describe their toolchain: the file to write, the
/// commands to run and how to read the final output. The provided
/// [`LanguageRunner::evaluate`] drives those pieces through the process
/// runner inside a fresh scratch directory.
#[async_trait]
pub trait LanguageRunner: Send + Sync {
    /// Canonical language name, also used as the cache namespace
    fn name(&self) -> &'static str;

    /// File extension including the leading dot
    fn extension(&self) -> &'static str;

    /// Name of the source file inside the scratch directory
    fn source_file_name(&self) -> String {
        format!("main{}", self.extension())
    }

    /// Commands to execute; every step but the last is expected to be a compile step
    fn steps(&self, source: &Path, scratch: &Path) -> Vec<Step>;

    /// Maps the output of the final step to a status
    fn classify(&self, output: &ProcessOutput) -> Status {
        exit_status(output)
    }

    async fn evaluate(&self, ctx: &ExecContext, program: &str) -> Result<ExecutionOutcome> {
        let scratch = ctx
            .scratch_dir(self.name())
            .context("Failed to create scratch directory")?;
        let source = scratch.path().join(self.source_file_name());
        tokio::fs::write(&source, program)
            .await
            .with_context(|| format!("Failed to write {}", source.display()))?;

        let mut last = None;
        for step in self.steps(&source, scratch.path()) {
            let deadline = match step.kind {
                StepKind::Compile => ctx.compile_timeout,
                StepKind::Run => ctx.run_timeout_for(self.name()),
            };
            let output = ctx.process.run(&step.command, scratch.path(), deadline).await?;

            if step.kind == StepKind::Compile && output.exit_code != Some(0) {
                log::debug!("{} compile step failed: {:?}", self.name(), output.exit_code);
                return Ok(outcome(program, output, |o| match exit_status(o) {
                    Status::Timeout => Status::Timeout,
                    _ => Status::Exception,
                }));
            }
            last = Some(output);
        }

        let output = last.with_context(|| format!("{} adapter has no steps", self.name()))?;
        Ok(outcome(program, output, |o| self.classify(o)))
    }
}

fn outcome(
    program: &str,
    output: ProcessOutput,
    classify: impl FnOnce(&ProcessOutput) -> Status,
) -> ExecutionOutcome {
    let status = classify(&output);
    ExecutionOutcome {
        program: program.to_string(),
        stdout: output.stdout,
        stderr: output.stderr,
        exit_code: output.exit_code,
        status,
        timed_out: output.timed_out,
    }
}

/// Plain exit-code classification shared by most adapters
pub fn exit_status(output: &ProcessOutput) -> Status {
    if output.timed_out {
        Status::Timeout
    } else if output.exit_code != Some(0) {
        Status::Exception
    } else {
        Status::Ok
    }
}

/// Exit-code classification that additionally requires a success marker on stdout
pub fn require_stdout(output: &ProcessOutput, marker: impl Fn(&str) -> bool) -> Status {
    match exit_status(output) {
        Status::Ok if !marker(&output.stdout) => Status::Exception,
        status => status,
    }
}
