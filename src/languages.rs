//! Run adapters, one unit struct per supported language.
//!
//! Each adapter owns its command lines and its success rule. Adding a
//! language means adding a struct here and a row to [`builtin`].

mod dotnet;
mod functional;
mod jvm;
mod native;
mod scripting;

pub use dotnet::{CSharp, FSharp};
pub use functional::{Haskell, OCaml};
pub use jvm::{Clojure, Java, Kotlin, Scala};
pub use native::{Cpp, D, Go, Rust, Swift};
pub use scripting::{JavaScript, Julia, Lua, Perl, Php, Python, R, Ruby, Shell, TypeScript};

use std::path::Path;
use std::sync::Arc;

use crate::sandbox::LanguageRunner;

/// Registry rows: every tag the task layer may produce, and its adapter
pub fn builtin() -> Vec<Row> {
    vec![
        row(&["clj", "clojure"], Clojure),
        row(&["cpp", "c++"], Cpp),
        row(&["cs", "csharp"], CSharp),
        row(&["d", "dlang"], D),
        row(&["fs", "fsharp"], FSharp),
        row(&["go", "golang"], Go),
        row(&["hs", "haskell"], Haskell),
        row(&["java"], Java),
        row(&["jl", "julia"], Julia),
        row(&["js", "javascript"], JavaScript),
        row(&["kt", "kotlin"], Kotlin),
        row(&["lua"], Lua),
        row(&["ml", "ocaml"], OCaml),
        row(&["php"], Php),
        row(&["pl", "perl"], Perl),
        row(&["py", "python"], Python),
        row(&["r"], R),
        row(&["rb", "ruby"], Ruby),
        row(&["rs", "rust"], Rust),
        row(&["scala"], Scala),
        row(&["sh", "bash", "shell"], Shell),
        row(&["swift"], Swift),
        row(&["ts", "typescript"], TypeScript),
    ]
}

type Row = (&'static [&'static str], Arc<dyn LanguageRunner>);

fn row(tags: &'static [&'static str], runner: impl LanguageRunner + 'static) -> Row {
    (tags, Arc::new(runner))
}

fn arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
