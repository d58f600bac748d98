use std::path::Path;

use crate::sandbox::{LanguageRunner, Step};

use super::arg;

pub struct CSharp;

impl LanguageRunner for CSharp {
    fn name(&self) -> &'static str {
        "csharp"
    }

    fn extension(&self) -> &'static str {
        ".cs"
    }

    fn steps(&self, source: &Path, scratch: &Path) -> Vec<Step> {
        let assembly = arg(&scratch.join("main.exe"));
        vec![
            // DEBUG keeps Debug.Assert calls in the oracle alive
            Step::compile([
                "mcs".to_string(),
                "-d:DEBUG".to_string(),
                "-r:System.Numerics.dll".to_string(),
                arg(source),
                format!("-out:{assembly}"),
            ]),
            Step::run(["mono".to_string(), assembly]),
        ]
    }
}

pub struct FSharp;

impl LanguageRunner for FSharp {
    fn name(&self) -> &'static str {
        "fsharp"
    }

    fn extension(&self) -> &'static str {
        ".fsx"
    }

    fn steps(&self, source: &Path, _scratch: &Path) -> Vec<Step> {
        vec![Step::run([
            "dotnet".to_string(),
            "fsi".to_string(),
            "-d:DEBUG".to_string(),
            arg(source),
        ])]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_csharp_runs_compiled_assembly() {
        let scratch = PathBuf::from("/tmp/s");
        let steps = CSharp.steps(&scratch.join("main.cs"), &scratch);
        assert_eq!(steps[0].command.last().unwrap(), "-out:/tmp/s/main.exe");
        assert_eq!(steps[1].command, vec!["mono", "/tmp/s/main.exe"]);
    }
}
