use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use anyhow::bail;

use crate::error::{EvalError, Result};
use crate::languages;
use crate::sandbox::LanguageRunner;

/// Maps language tags to run adapters.
///
/// Several tags may point at one adapter (`py` and `python`); a tag never
/// points at more than one.
#[derive(Default, Clone)]
pub struct Registry {
    runners: Vec<Arc<dyn LanguageRunner>>,
    tags: HashMap<String, usize>,
}

static BUILTIN: OnceLock<Arc<Registry>> = OnceLock::new();

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The static table of every language shipped with the crate
    pub fn builtin() -> Arc<Registry> {
        BUILTIN
            .get_or_init(|| {
                let mut registry = Registry::new();
                for (tags, runner) in languages::builtin() {
                    if let Err(e) = registry.register(tags, runner) {
                        log::error!("Skipping builtin language row: {e}");
                    }
                }
                Arc::new(registry)
            })
            .clone()
    }

    /// Adds one adapter under all of its tags
    pub fn register(&mut self, tags: &[&str], runner: Arc<dyn LanguageRunner>) -> anyhow::Result<()> {
        if tags.is_empty() {
            bail!("{} registered without any tag", runner.name());
        }
        if let Some(tag) = tags.iter().find(|t| self.tags.contains_key(&normalize(t))) {
            bail!("language tag `{tag}` is already registered");
        }

        let idx = self.runners.len();
        self.runners.push(runner);
        for tag in tags {
            self.tags.insert(normalize(tag), idx);
        }
        Ok(())
    }

    /// Returns the file extension and adapter for a tag
    pub fn resolve(&self, tag: &str) -> Result<(&'static str, Arc<dyn LanguageRunner>)> {
        let idx = self
            .tags
            .get(&normalize(tag))
            .ok_or_else(|| EvalError::UnsupportedLanguage(tag.to_string()))?;
        let runner = self.runners[*idx].clone();
        Ok((runner.extension(), runner))
    }

    /// Every registered tag, sorted
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.tags.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// One entry per adapter, in registration order
    pub fn runners(&self) -> &[Arc<dyn LanguageRunner>] {
        &self.runners
    }
}

fn normalize(tag: &str) -> String {
    tag.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_tag_resolves_to_an_adapter_with_an_extension() {
        let registry = Registry::builtin();
        assert!(registry.runners().len() >= 20);
        for tag in registry.tags() {
            let (ext, runner) = registry.resolve(tag).unwrap();
            assert!(!ext.is_empty(), "{tag} has no extension");
            assert_eq!(ext, runner.extension());
        }
    }

    #[test]
    fn test_adapters_are_distinct() {
        let registry = Registry::builtin();
        let names: HashSet<&str> = registry.runners().iter().map(|r| r.name()).collect();
        assert_eq!(names.len(), registry.runners().len());
        // every builtin row made it in, no tag collided
        assert_eq!(registry.runners().len(), languages::builtin().len());
    }

    #[test]
    fn test_aliases_share_an_adapter() {
        let registry = Registry::builtin();
        let (_, py) = registry.resolve("py").unwrap();
        let (_, python) = registry.resolve("Python").unwrap();
        assert!(Arc::ptr_eq(&py, &python));
        assert_eq!(py.name(), "python");
    }

    #[test]
    fn test_unknown_tag() {
        let registry = Registry::builtin();
        match registry.resolve("cobol") {
            Err(EvalError::UnsupportedLanguage(tag)) => assert_eq!(tag, "cobol"),
            Err(e) => panic!("unexpected error {e}"),
            Ok(_) => panic!("cobol should not resolve"),
        }
    }

    #[test]
    fn test_duplicate_tag_rejected() {
        let mut registry = Registry::new();
        registry
            .register(&["py"], Arc::new(languages::Python))
            .unwrap();
        assert!(registry.register(&["PY"], Arc::new(languages::Perl)).is_err());
        assert!(registry.register(&[], Arc::new(languages::Perl)).is_err());
    }
}
