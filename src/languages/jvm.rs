use std::path::Path;

use crate::problem::Status;
use crate::sandbox::{LanguageRunner, ProcessOutput, Step, require_stdout};

use super::arg;

/// Oracle programs for Java and Scala declare a `Problem` class with `main`
const MAIN_CLASS: &str = "Problem";

pub struct Java;

impl LanguageRunner for Java {
    fn name(&self) -> &'static str {
        "java"
    }

    fn extension(&self) -> &'static str {
        ".java"
    }

    fn source_file_name(&self) -> String {
        format!("{MAIN_CLASS}.java")
    }

    fn steps(&self, source: &Path, scratch: &Path) -> Vec<Step> {
        let classes = arg(scratch);
        vec![
            Step::compile([
                "javac".to_string(),
                "-encoding".to_string(),
                "UTF8".to_string(),
                "-d".to_string(),
                classes.clone(),
                arg(source),
            ]),
            // -ea: the oracle uses plain `assert`
            Step::run([
                "java".to_string(),
                "-ea".to_string(),
                "-cp".to_string(),
                classes,
                MAIN_CLASS.to_string(),
            ]),
        ]
    }
}

pub struct Scala;

impl LanguageRunner for Scala {
    fn name(&self) -> &'static str {
        "scala"
    }

    fn extension(&self) -> &'static str {
        ".scala"
    }

    fn source_file_name(&self) -> String {
        format!("{MAIN_CLASS}.scala")
    }

    fn steps(&self, source: &Path, scratch: &Path) -> Vec<Step> {
        let classes = arg(scratch);
        vec![
            Step::compile([
                "scalac".to_string(),
                "-d".to_string(),
                classes.clone(),
                arg(source),
            ]),
            Step::run([
                "scala".to_string(),
                "-cp".to_string(),
                classes,
                MAIN_CLASS.to_string(),
            ]),
        ]
    }
}

pub struct Kotlin;

impl LanguageRunner for Kotlin {
    fn name(&self) -> &'static str {
        "kotlin"
    }

    fn extension(&self) -> &'static str {
        ".kt"
    }

    fn steps(&self, source: &Path, scratch: &Path) -> Vec<Step> {
        let jar = arg(&scratch.join("main.jar"));
        vec![
            Step::compile([
                "kotlinc".to_string(),
                arg(source),
                "-include-runtime".to_string(),
                "-d".to_string(),
                jar.clone(),
            ]),
            Step::run(["java".to_string(), "-ea".to_string(), "-jar".to_string(), jar]),
        ]
    }
}

/// Success marker: the oracle calls `clojure.test/run-tests`, whose report
/// ends with a `0 failures, 0 errors.` line only when every assertion held. The
/// test runner exits 0 even when assertions fail, so the exit code alone
/// proves nothing.
pub struct Clojure;

impl LanguageRunner for Clojure {
    fn name(&self) -> &'static str {
        "clojure"
    }

    fn extension(&self) -> &'static str {
        ".clj"
    }

    fn steps(&self, source: &Path, _scratch: &Path) -> Vec<Step> {
        vec![Step::run([
            "clojure".to_string(),
            "-J-Dclojure.main.report=stderr".to_string(),
            "-M".to_string(),
            arg(source),
        ])]
    }

    fn classify(&self, output: &ProcessOutput) -> Status {
        require_stdout(output, |stdout| stdout.contains("\n0 failures, 0 errors.\n"))
    }
}
