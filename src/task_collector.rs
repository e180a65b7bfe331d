use crate::execution::RunTask;
use crate::extractor::{SkipReason, SkippedBlock, Snippet};
use crate::language::LanguageRegistry;
use std::sync::Arc;

/// Maximum size of a single snippet in bytes (1MB)
pub const MAX_SNIPPET_SIZE: usize = 1_000_000;

/// Language allow-list from `--lang`.
///
/// Entries match either the toolchain name (`cpp`) or the fence tag used in
/// the markdown (`c++`). An empty list allows everything.
#[derive(Debug, Clone, Default)]
pub struct LanguageFilter {
    allowed: Vec<String>,
}

impl LanguageFilter {
    pub fn new<I, S>(languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: languages
                .into_iter()
                .map(|l| l.as_ref().trim().to_ascii_lowercase())
                .filter(|l| !l.is_empty())
                .collect(),
        }
    }

    pub fn allows(&self, fence: &str, toolchain: Option<&str>) -> bool {
        self.allowed.is_empty()
            || self
                .allowed
                .iter()
                .any(|a| a == fence || Some(a.as_str()) == toolchain)
    }
}

/// Pairs each snippet with its toolchain.
///
/// Snippets excluded by the filter, without an enabled toolchain, or over
/// the size limit are returned as skipped blocks instead of tasks.
pub fn collect_run_tasks(
    snippets: Vec<Snippet>,
    registry: &LanguageRegistry,
    filter: &LanguageFilter,
) -> (Vec<RunTask>, Vec<SkippedBlock>) {
    let mut tasks = Vec::new();
    let mut skipped = Vec::new();

    for snippet in snippets {
        let language = registry.find_by_fence(&snippet.language);

        let reason = if !filter.allows(&snippet.language, language.as_ref().map(|l| l.name())) {
            Some(SkipReason::Filtered)
        } else if language.is_none() {
            Some(SkipReason::UnsupportedLanguage)
        } else if snippet.code.len() > MAX_SNIPPET_SIZE {
            log::warn!(
                "Snippet {} exceeds size limit of {} bytes ({} bytes)",
                snippet.id,
                MAX_SNIPPET_SIZE,
                snippet.code.len()
            );
            Some(SkipReason::TooLarge)
        } else {
            None
        };

        match (reason, language) {
            (None, Some(language)) => tasks.push(RunTask::new(language, Arc::new(snippet))),
            (reason, _) => skipped.push(SkippedBlock {
                file: snippet.file,
                line: snippet.line,
                language: Some(snippet.language),
                reason: reason.unwrap_or(SkipReason::UnsupportedLanguage),
            }),
        }
    }

    (tasks, skipped)
}
