use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

pub const DEFAULT_TIMEOUT_SECS: f64 = 15.0;
pub const DEFAULT_COMPILE_TIMEOUT_SECS: f64 = 30.0;
pub const DEFAULT_OUTPUT_LIMIT: usize = 4096;
pub const DEFAULT_K: [usize; 4] = [1, 10, 25, 100];
pub const MAX_WORKERS: usize = 16;

#[derive(Parser)]
#[command(name = "polyjudge", version = "0.1", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: Option<String>,

    /// Problems to evaluate (JSON array or JSON Lines)
    #[arg(long = "problems", short = 'p')]
    pub problems_path: Option<String>,

    /// Number of concurrent workers
    #[arg(long = "workers", short = 'w')]
    pub workers: Option<usize>,

    /// Run timeout per execution, in seconds
    #[arg(long = "timeout", short = 't')]
    pub timeout_secs: Option<f64>,

    /// Directory receiving problem and result artifacts
    #[arg(long = "results-dir", short = 'r')]
    pub results_dir: Option<PathBuf>,

    /// Unit of work handed to a worker
    #[arg(long = "granularity", value_enum)]
    pub granularity: Option<Granularity>,

    /// Acknowledge that generated programs run unsandboxed on this host
    #[arg(long = "allow-code-execution", default_value_t = false)]
    pub allow_code_execution: bool,

    /// Whether to flush existing result artifacts
    #[arg(long = "flush-data", short = 'f', default_value_t = false)]
    pub flush_data: bool,

    /// Skip execution and reduce the artifacts already on disk
    #[arg(long = "reduce-only", default_value_t = false)]
    pub reduce_only: bool,

    /// Write the metrics map to this file as JSON
    #[arg(long = "output", short = 'o')]
    pub output: Option<PathBuf>,
}

impl CliArgs {
    /// Load the configuration file, if any, and apply command line overrides
    pub fn to_config(&self) -> std::io::Result<EvalConfig> {
        let mut config = match &self.config_path {
            Some(path) => EvalConfig::from_file(path)?,
            None => EvalConfig::default(),
        };

        if let Some(workers) = self.workers {
            config.workers = Some(workers);
        }
        if let Some(timeout) = self.timeout_secs {
            config.timeout_secs = timeout;
        }
        if let Some(dir) = &self.results_dir {
            config.results_dir = Some(dir.clone());
        }
        if let Some(granularity) = self.granularity {
            config.granularity = granularity;
        }
        config.allow_code_execution |= self.allow_code_execution;

        Ok(config)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct EvalConfig {
    pub timeout_secs: f64,
    pub compile_timeout_secs: f64,
    pub language_timeouts: HashMap<String, f64>,
    pub workers: Option<usize>,
    pub k: Vec<usize>,
    pub output_limit: usize,
    pub granularity: Granularity,
    pub work_dir: Option<PathBuf>,
    pub results_dir: Option<PathBuf>,
    pub cache: bool,
    pub cache_capacity: Option<usize>,
    pub resume: bool,
    pub allow_code_execution: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            compile_timeout_secs: DEFAULT_COMPILE_TIMEOUT_SECS,
            language_timeouts: HashMap::new(),
            workers: None,
            k: DEFAULT_K.to_vec(),
            output_limit: DEFAULT_OUTPUT_LIMIT,
            granularity: Granularity::default(),
            work_dir: None,
            results_dir: None,
            cache: true,
            cache_capacity: None,
            resume: false,
            allow_code_execution: false,
        }
    }
}

impl EvalConfig {
    pub fn from_file(path: &str) -> std::io::Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| e.into())
    }

    /// Worker count: the configured value, or one less than the available
    /// cores, capped at [`MAX_WORKERS`] and never below one.
    pub fn worker_count(&self) -> usize {
        match self.workers {
            Some(n) => n.max(1),
            None => {
                let cores = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(2);
                cores.saturating_sub(1).clamp(1, MAX_WORKERS)
            }
        }
    }

    pub fn run_timeout(&self) -> Duration {
        secs(self.timeout_secs)
    }

    pub fn compile_timeout(&self) -> Duration {
        secs(self.compile_timeout_secs)
    }

    /// Per-language run timeout overrides, keyed by whatever tag the user wrote
    pub fn language_timeouts(&self) -> HashMap<String, Duration> {
        self.language_timeouts
            .iter()
            .map(|(tag, &s)| (tag.clone(), secs(s)))
            .collect()
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn secs(s: f64) -> Duration {
    Duration::try_from_secs_f64(s).unwrap_or(Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS))
}

/// Whether a worker picks up a single candidate or a whole problem at a time.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    #[default]
    Candidate,
    Problem,
}
