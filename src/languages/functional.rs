use std::path::Path;

use crate::problem::Status;
use crate::sandbox::{LanguageRunner, ProcessOutput, Step, exit_status};

use super::arg;

pub struct Haskell;

impl LanguageRunner for Haskell {
    fn name(&self) -> &'static str {
        "haskell"
    }

    fn extension(&self) -> &'static str {
        ".hs"
    }

    fn steps(&self, source: &Path, _scratch: &Path) -> Vec<Step> {
        vec![Step::run(["runghc".to_string(), arg(source)])]
    }
}

/// The toplevel keeps going after an uncaught exception in some phrases, so
/// an `Exception:` report on stderr is treated as a failure even on exit 0.
pub struct OCaml;

impl LanguageRunner for OCaml {
    fn name(&self) -> &'static str {
        "ocaml"
    }

    fn extension(&self) -> &'static str {
        ".ml"
    }

    fn steps(&self, source: &Path, _scratch: &Path) -> Vec<Step> {
        vec![Step::run(["ocaml".to_string(), arg(source)])]
    }

    fn classify(&self, output: &ProcessOutput) -> Status {
        match exit_status(output) {
            Status::Ok if output.stderr.contains("Exception:") => Status::Exception,
            status => status,
        }
    }
}
