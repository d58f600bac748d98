use std::path::Path;

use crate::problem::Status;
use crate::sandbox::{LanguageRunner, ProcessOutput, Step, require_stdout};

use super::arg;

/// Interpreters that take the source file as their only argument
macro_rules! interpreted {
    ($ty:ident, $name:literal, $ext:literal, [$($cmd:literal),+]) => {
        pub struct $ty;

        impl LanguageRunner for $ty {
            fn name(&self) -> &'static str {
                $name
            }

            fn extension(&self) -> &'static str {
                $ext
            }

            fn steps(&self, source: &Path, _scratch: &Path) -> Vec<Step> {
                let mut command: Vec<String> = vec![$($cmd.to_string()),+];
                command.push(arg(source));
                vec![Step::run(command)]
            }
        }
    };
}

interpreted!(Python, "python", ".py", ["python3"]);
interpreted!(JavaScript, "javascript", ".js", ["node"]);
interpreted!(Perl, "perl", ".pl", ["perl"]);
interpreted!(Php, "php", ".php", ["php"]);
interpreted!(R, "r", ".r", ["Rscript"]);
interpreted!(Julia, "julia", ".jl", ["julia"]);
interpreted!(Shell, "shell", ".sh", ["bash"]);

/// Success marker: the oracle is a `Test::Unit` case whose summary reads
/// `N tests, M assertions, 0 failures, 0 errors, ...`. Anything else,
/// including a file where the test class never got defined, is a failure.
pub struct Ruby;

impl LanguageRunner for Ruby {
    fn name(&self) -> &'static str {
        "ruby"
    }

    fn extension(&self) -> &'static str {
        ".rb"
    }

    fn steps(&self, source: &Path, _scratch: &Path) -> Vec<Step> {
        vec![Step::run(["ruby".to_string(), arg(source)])]
    }

    fn classify(&self, output: &ProcessOutput) -> Status {
        require_stdout(output, |stdout| stdout.contains(" 0 failures, 0 errors"))
    }
}

/// Success marker: the oracle ends with `os.exit(lu.LuaUnit.run())`, and
/// LuaUnit prints a bare `OK` line once every test passed.
pub struct Lua;

impl LanguageRunner for Lua {
    fn name(&self) -> &'static str {
        "lua"
    }

    fn extension(&self) -> &'static str {
        ".lua"
    }

    fn steps(&self, source: &Path, _scratch: &Path) -> Vec<Step> {
        vec![Step::run(["lua".to_string(), arg(source)])]
    }

    fn classify(&self, output: &ProcessOutput) -> Status {
        require_stdout(output, |stdout| stdout.lines().any(|line| line.trim() == "OK"))
    }
}

/// Type-checked and emitted next to the source, then run with node
pub struct TypeScript;

impl LanguageRunner for TypeScript {
    fn name(&self) -> &'static str {
        "typescript"
    }

    fn extension(&self) -> &'static str {
        ".ts"
    }

    fn steps(&self, source: &Path, _scratch: &Path) -> Vec<Step> {
        vec![
            Step::compile([
                "tsc".to_string(),
                "--target".to_string(),
                "esnext".to_string(),
                "--lib".to_string(),
                "esnext".to_string(),
                "--types".to_string(),
                "node".to_string(),
                arg(source),
            ]),
            Step::run(["node".to_string(), arg(&source.with_extension("js"))]),
        ]
    }
}
