use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::problem::{Problem, ProblemResult};

const PROBLEM_SUFFIX: &str = ".problem.json";
const RESULT_SUFFIX: &str = ".results.json";
const TMP_SUFFIX: &str = ".tmp";

/// Resolves the per-user directory holding problem and result artifacts
pub fn default_results_dir() -> io::Result<PathBuf> {
    use directories::ProjectDirs;

    let proj_dirs = ProjectDirs::from("", "", "polyjudge")
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Unable to find user directory"))?;
    Ok(proj_dirs.data_local_dir().join("results"))
}

/// On-disk artifacts, one problem file and one result file per problem id.
///
/// Each result file is written by exactly one worker and only read once
/// every problem has finished.
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn problem_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}{PROBLEM_SUFFIX}", file_stem(id)))
    }

    pub fn result_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}{RESULT_SUFFIX}", file_stem(id)))
    }

    pub fn save_problem(&self, problem: &Problem) -> io::Result<()> {
        write_json(&self.problem_path(&problem.id), problem)
    }

    pub fn save_result(&self, result: &ProblemResult) -> io::Result<()> {
        write_json(&self.result_path(&result.id), result)?;
        log::info!(
            "Saved {} outcomes for problem {} ({} passed)",
            result.outcomes.len(),
            result.id,
            result.num_correct()
        );
        Ok(())
    }

    pub fn load_result(&self, id: &str) -> io::Result<Option<ProblemResult>> {
        let path = self.result_path(id);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    /// Reads every result artifact in the directory, ordered by file name
    pub fn load_results(&self) -> io::Result<Vec<ProblemResult>> {
        let mut paths = self.artifacts(&[RESULT_SUFFIX])?;
        paths.sort();
        paths.iter().map(|path| read_json(path)).collect()
    }

    /// Removes problem and result artifacts, and any half-written ones,
    /// returning how many were deleted. Other files are left alone.
    pub fn flush(&self) -> io::Result<usize> {
        let paths = self.artifacts(&[
            PROBLEM_SUFFIX,
            RESULT_SUFFIX,
            format!("{PROBLEM_SUFFIX}{TMP_SUFFIX}").as_str(),
            format!("{RESULT_SUFFIX}{TMP_SUFFIX}").as_str(),
        ])?;
        for path in &paths {
            if let Err(e) = fs::remove_file(path) {
                log::warn!("Unable to remove {}: {e}", path.display());
            }
        }
        log::info!("Removed {} artifacts from {}", paths.len(), self.dir.display());
        Ok(paths.len())
    }

    fn artifacts(&self, suffixes: &[&str]) -> io::Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let matches = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| suffixes.iter().any(|suffix| name.ends_with(suffix)));
            if matches && path.is_file() {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

/// Problem ids such as `HumanEval/12` are not valid file names
fn file_stem(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// Writes through a temporary file so readers never see half an artifact
fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(TMP_SUFFIX);
    let tmp = PathBuf::from(tmp);
    let mut writer = io::BufWriter::new(fs::File::create(&tmp)?);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    fs::rename(&tmp, path)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<T> {
    let file = fs::File::open(path)?;
    serde_json::from_reader(io::BufReader::new(file)).map_err(|e| e.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{ExecutionOutcome, Status};
    use pretty_assertions::assert_eq;

    fn result(id: &str, statuses: &[Status]) -> ProblemResult {
        ProblemResult {
            id: id.to_string(),
            language: "py".to_string(),
            outcomes: statuses
                .iter()
                .map(|&status| ExecutionOutcome {
                    program: "pass".to_string(),
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: Some(0),
                    status,
                    timed_out: false,
                })
                .collect(),
            finished_time: None,
        }
    }

    #[test]
    fn test_file_stem_sanitizes_ids() {
        assert_eq!(file_stem("HumanEval/12"), "HumanEval_12");
        assert_eq!(file_stem("../etc"), "___etc");
    }

    #[test]
    fn test_results_round_trip_through_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(dir.path()).unwrap();

        let a = result("HumanEval/0", &[Status::Ok, Status::Exception]);
        let b = result("HumanEval/1", &[Status::Timeout]);
        store.save_result(&b).unwrap();
        store.save_result(&a).unwrap();
        store
            .save_problem(&Problem {
                id: "HumanEval/0".to_string(),
                language: "py".to_string(),
                prompt: String::new(),
                completions: vec![],
                tests: String::new(),
            })
            .unwrap();

        // problem artifacts are not mistaken for results
        assert_eq!(store.load_results().unwrap(), vec![a.clone(), b]);
        assert_eq!(store.load_result("HumanEval/0").unwrap(), Some(a));
        assert_eq!(store.load_result("missing").unwrap(), None);

        assert_eq!(store.flush().unwrap(), 3);
        assert!(store.load_results().unwrap().is_empty());
    }

    #[test]
    fn test_flush_keeps_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::open(dir.path()).unwrap();
        for name in ["problems.json", "package.json", "notes.tmp"] {
            fs::write(dir.path().join(name), "{}").unwrap();
        }
        store.save_result(&result("a", &[Status::Ok])).unwrap();
        // left behind by an interrupted write
        fs::write(dir.path().join("b.results.json.tmp"), "{").unwrap();

        assert_eq!(store.flush().unwrap(), 2);
        for name in ["problems.json", "package.json", "notes.tmp"] {
            assert!(dir.path().join(name).exists(), "{name} was removed");
        }
        assert!(!dir.path().join("b.results.json.tmp").exists());
    }
}
