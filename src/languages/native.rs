use std::path::Path;

use crate::problem::Status;
use crate::sandbox::{LanguageRunner, ProcessOutput, Step, require_stdout};

use super::arg;

const EXECUTABLE_NAME: &str = "main";

/// Compile with a native compiler, then run the produced binary
fn compile_and_run(compile: Vec<String>, scratch: &Path) -> Vec<Step> {
    vec![
        Step::compile(compile),
        Step::run([arg(&scratch.join(EXECUTABLE_NAME))]),
    ]
}

pub struct Cpp;

impl LanguageRunner for Cpp {
    fn name(&self) -> &'static str {
        "cpp"
    }

    fn extension(&self) -> &'static str {
        ".cpp"
    }

    fn steps(&self, source: &Path, scratch: &Path) -> Vec<Step> {
        let output = arg(&scratch.join(EXECUTABLE_NAME));
        compile_and_run(
            vec!["g++".into(), "-std=c++17".into(), arg(source), "-o".into(), output],
            scratch,
        )
    }
}

pub struct Rust;

impl LanguageRunner for Rust {
    fn name(&self) -> &'static str {
        "rust"
    }

    fn extension(&self) -> &'static str {
        ".rs"
    }

    fn steps(&self, source: &Path, scratch: &Path) -> Vec<Step> {
        let output = arg(&scratch.join(EXECUTABLE_NAME));
        compile_and_run(
            vec![
                "rustc".into(),
                "--edition=2021".into(),
                arg(source),
                "-o".into(),
                output,
            ],
            scratch,
        )
    }
}

pub struct Swift;

impl LanguageRunner for Swift {
    fn name(&self) -> &'static str {
        "swift"
    }

    fn extension(&self) -> &'static str {
        ".swift"
    }

    fn steps(&self, source: &Path, scratch: &Path) -> Vec<Step> {
        let output = arg(&scratch.join(EXECUTABLE_NAME));
        compile_and_run(vec!["swiftc".into(), arg(source), "-o".into(), output], scratch)
    }
}

/// `rdmd` compiles and runs in one go; `-unittest` enables the oracle's unittest blocks.
pub struct D;

impl LanguageRunner for D {
    fn name(&self) -> &'static str {
        "d"
    }

    fn extension(&self) -> &'static str {
        ".d"
    }

    fn steps(&self, source: &Path, _scratch: &Path) -> Vec<Step> {
        vec![Step::run(["rdmd".to_string(), "-unittest".to_string(), arg(source)])]
    }
}

/// Oracle tests are `go test` functions, so the file must end in `_test.go`.
///
/// Success marker: `go test` prints an `ok` summary line for the package.
/// A build failure also exits nonzero, but the summary line is what proves
/// the tests actually ran.
pub struct Go;

impl LanguageRunner for Go {
    fn name(&self) -> &'static str {
        "go"
    }

    fn extension(&self) -> &'static str {
        "_test.go"
    }

    fn source_file_name(&self) -> String {
        "main_test.go".to_string()
    }

    fn steps(&self, source: &Path, _scratch: &Path) -> Vec<Step> {
        vec![Step::run(["go".to_string(), "test".to_string(), arg(source)])]
    }

    fn classify(&self, output: &ProcessOutput) -> Status {
        require_stdout(output, |stdout| {
            stdout.lines().any(|line| line.starts_with("ok"))
        })
    }
}
