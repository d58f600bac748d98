use serde::{Deserialize, Serialize};

/// One benchmark row handed over by the task layer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    #[serde(alias = "name", alias = "task_id")]
    pub id: String,
    pub language: String,
    pub prompt: String,
    pub completions: Vec<String>,
    pub tests: String,
}

impl Problem {
    /// Full program text for the completion at `idx`.
    ///
    /// The oracle tests are appended verbatim; nothing is parsed.
    pub fn program(&self, idx: usize) -> Option<String> {
        self.completions
            .get(idx)
            .map(|completion| synthesize_program(&self.prompt, completion, &self.tests))
    }
}

pub fn synthesize_program(prompt: &str, completion: &str, tests: &str) -> String {
    let mut program = String::with_capacity(prompt.len() + completion.len() + tests.len());
    program.push_str(prompt);
    program.push_str(completion);
    program.push_str(tests);
    program
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    Timeout,
    Exception,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub program: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub status: Status,
    pub timed_out: bool,
}

impl ExecutionOutcome {
    /// Outcome for a candidate whose evaluation broke inside the harness
    /// rather than inside the generated program.
    pub fn harness_failure(program: String, reason: impl Into<String>) -> Self {
        Self {
            program,
            stdout: String::new(),
            stderr: reason.into(),
            exit_code: None,
            status: Status::Exception,
            timed_out: false,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == Status::Ok
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProblemResult {
    pub id: String,
    pub language: String,
    pub outcomes: Vec<ExecutionOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_time: Option<String>,
}

impl ProblemResult {
    pub fn num_correct(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }
}

/// Parses a problem file holding either a JSON array or one object per line
pub fn parse_problems(text: &str) -> serde_json::Result<Vec<Problem>> {
    if text.trim_start().starts_with('[') {
        return serde_json::from_str(text);
    }
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str::<Problem>)
        .collect()
}

pub fn load_problems(path: impl AsRef<std::path::Path>) -> crate::error::Result<Vec<Problem>> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_problems(&text)?)
}
