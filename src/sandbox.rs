mod process;
mod runner;

// Re-export the trait and common types
pub use process::{ProcessOutput, ProcessRunner, decode_capped};
pub use runner::{LanguageRunner, Step, StepKind, exit_status, require_stdout};

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use crate::config::EvalConfig;

/// Everything an adapter needs to run one program, shared by all workers.
///
/// Nothing in here is mutated during a run; uniqueness of on-disk names
/// comes from a fresh scratch directory per evaluation.
#[derive(Debug, Clone)]
pub struct ExecContext {
    /// Root under which per-evaluation scratch directories are created
    pub work_dir: PathBuf,
    pub run_timeout: Duration,
    pub compile_timeout: Duration,
    /// Run timeout overrides keyed by canonical language name
    pub language_timeouts: HashMap<String, Duration>,
    pub process: ProcessRunner,
}

impl ExecContext {
    pub fn new(work_dir: PathBuf, run_timeout: Duration, output_limit: usize) -> Self {
        Self {
            work_dir,
            run_timeout,
            compile_timeout: Duration::from_secs_f64(crate::config::DEFAULT_COMPILE_TIMEOUT_SECS),
            language_timeouts: HashMap::new(),
            process: ProcessRunner::new(output_limit),
        }
    }

    pub fn from_config(config: &EvalConfig) -> Self {
        Self {
            work_dir: config.work_dir(),
            run_timeout: config.run_timeout(),
            compile_timeout: config.compile_timeout(),
            language_timeouts: HashMap::new(),
            process: ProcessRunner::new(config.output_limit),
        }
    }

    pub fn run_timeout_for(&self, language: &str) -> Duration {
        self.language_timeouts
            .get(language)
            .copied()
            .unwrap_or(self.run_timeout)
    }

    /// Creates a uniquely named scratch directory, removed when dropped
    pub fn scratch_dir(&self, language: &str) -> std::io::Result<TempDir> {
        std::fs::create_dir_all(&self.work_dir)?;
        tempfile::Builder::new()
            .prefix(&format!("polyjudge-{language}-"))
            .tempdir_in(&self.work_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_dirs_are_unique_and_cleaned() {
        let root = tempfile::tempdir().unwrap();
        let ctx = ExecContext::new(root.path().to_path_buf(), Duration::from_secs(1), 4096);

        let a = ctx.scratch_dir("py").unwrap();
        let b = ctx.scratch_dir("py").unwrap();
        assert_ne!(a.path(), b.path());

        let kept = a.path().to_path_buf();
        drop(a);
        assert!(!kept.exists());
    }

    #[test]
    fn test_language_timeout_override() {
        let mut ctx = ExecContext::new(std::env::temp_dir(), Duration::from_secs(3), 4096);
        ctx.language_timeouts
            .insert("java".to_string(), Duration::from_secs(9));
        assert_eq!(ctx.run_timeout_for("java"), Duration::from_secs(9));
        assert_eq!(ctx.run_timeout_for("python"), Duration::from_secs(3));
    }
}
