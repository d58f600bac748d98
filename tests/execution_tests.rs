use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use polyjudge::config::Granularity;
use polyjudge::evaluator::Evaluator;
use polyjudge::passk;
use polyjudge::problem::{Problem, Status};
use polyjudge::registry::Registry;
use polyjudge::sandbox::{ExecContext, LanguageRunner, Step};
use polyjudge::worker::Scheduler;

fn has_program(name: &str) -> bool {
    std::process::Command::new(name)
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok()
}

fn evaluator(work_dir: &Path, timeout: Duration) -> Arc<Evaluator> {
    let ctx = ExecContext::new(work_dir.to_path_buf(), timeout, 4096);
    Arc::new(Evaluator::new(Registry::builtin(), ctx))
}

fn problem(id: &str, language: &str, prompt: &str, completions: &[&str], tests: &str) -> Problem {
    Problem {
        id: id.to_string(),
        language: language.to_string(),
        prompt: prompt.to_string(),
        completions: completions.iter().map(|c| c.to_string()).collect(),
        tests: tests.to_string(),
    }
}

#[tokio::test]
async fn test_timeout_is_enforced() {
    if !has_program("bash") {
        eprintln!("bash not found, skipping");
        return;
    }
    let work = tempfile::tempdir().unwrap();
    let evaluator = evaluator(work.path(), Duration::from_secs(1));

    let start = Instant::now();
    let outcome = evaluator
        .dispatch("sh", "sleep 30 &\nsleep 30\n".to_string())
        .await
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(5), "took {:?}", start.elapsed());
    assert_eq!(outcome.status, Status::Timeout);
    assert!(outcome.timed_out);
    assert_eq!(outcome.exit_code, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scratch_space_is_private_and_removed() {
    if !has_program("bash") {
        eprintln!("bash not found, skipping");
        return;
    }
    let work = tempfile::tempdir().unwrap();
    let evaluator = evaluator(work.path(), Duration::from_secs(10));

    // every candidate writes the same file name, then checks nobody else touched it
    let completions: Vec<String> = (0..8).map(|i| format!("ID={i}\n")).collect();
    let completions: Vec<&str> = completions.iter().map(String::as_str).collect();
    let tests = "echo \"$ID\" > shared.txt\nsleep 0.3\n[ \"$(cat shared.txt)\" = \"$ID\" ]\n";
    let problems = vec![
        problem("iso/0", "bash", "", &completions, tests),
        problem("iso/1", "shell", "", &completions[..4], tests),
    ];

    let results = Scheduler::new(evaluator, 6, Granularity::Candidate, false)
        .run(problems, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(results[0].num_correct(), 8);
    assert_eq!(results[1].num_correct(), 4);
    assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_output_is_truncated() {
    if !has_program("bash") {
        eprintln!("bash not found, skipping");
        return;
    }
    let work = tempfile::tempdir().unwrap();
    let evaluator = evaluator(work.path(), Duration::from_secs(10));

    let outcome = evaluator
        .dispatch("bash", "head -c 100000 /dev/zero | tr '\\0' x\nexit 3\n".to_string())
        .await
        .unwrap();

    assert_eq!(outcome.stdout.len(), 4096);
    assert_eq!(outcome.exit_code, Some(3));
    assert_eq!(outcome.status, Status::Exception);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_python_end_to_end() {
    if !has_program("python3") {
        eprintln!("python3 not found, skipping");
        return;
    }
    let work = tempfile::tempdir().unwrap();
    let evaluator = evaluator(work.path(), Duration::from_secs(10));
    let problems = vec![problem(
        "HumanEval/add",
        "py",
        "def add(a, b):\n",
        &["    return a + b\n", "    return a - b\n"],
        "\n\nassert add(1, 2) == 3\nassert add(-1, 1) == 0\n",
    )];

    let results = Scheduler::new(evaluator, 2, Granularity::Candidate, false)
        .run(problems, CancellationToken::new())
        .await
        .unwrap();

    let outcomes = &results[0].outcomes;
    assert_eq!(outcomes[0].status, Status::Ok);
    assert_eq!(outcomes[0].exit_code, Some(0));
    assert_eq!(outcomes[1].status, Status::Exception);
    assert_ne!(outcomes[1].exit_code, Some(0));
    assert!(outcomes[1].stderr.contains("AssertionError"));

    let metrics = passk::reduce(&results, &[1, 2, 10]);
    assert!((metrics["pass@1"] - 0.5).abs() < 1e-9);
    assert!((metrics["pass@2"] - 1.0).abs() < 1e-9);
    assert!(!metrics.contains_key("pass@10"));
}

#[tokio::test]
async fn test_missing_toolchain_is_an_exception() {
    let work = tempfile::tempdir().unwrap();
    let evaluator = evaluator(work.path(), Duration::from_secs(5));

    let outcome = evaluator
        .evaluate_candidate(Arc::new(Phantom), "print(1)\n".to_string())
        .await;

    assert_eq!(outcome.status, Status::Exception);
    assert_eq!(outcome.exit_code, None);
    assert!(outcome.stderr.contains("polyjudge-no-such-interpreter"));
}

/// Adapter whose interpreter is not installed anywhere
struct Phantom;

impl LanguageRunner for Phantom {
    fn name(&self) -> &'static str {
        "phantom"
    }

    fn extension(&self) -> &'static str {
        ".ph"
    }

    fn steps(&self, source: &Path, _scratch: &Path) -> Vec<Step> {
        vec![Step::run([
            "polyjudge-no-such-interpreter".to_string(),
            source.to_string_lossy().into_owned(),
        ])]
    }
}
