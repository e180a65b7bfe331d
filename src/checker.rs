use crate::classifier::{classify, ClassifyOptions};
use crate::config::CheckConfig;
use crate::execution::{execute_tasks, CancelHandle, ExecutionContext};
use crate::extractor::extract_directory;
use crate::language::LanguageRegistry;
use crate::reporting::{Report, ReportEntry};
use crate::runner::RunLimits;
use crate::task_collector::{collect_run_tasks, LanguageFilter};
use anyhow::Result;
use std::path::Path;
use std::time::Instant;

/// Validates the code listings of a markdown tutorial corpus.
///
/// # Overview
///
/// The checker extracts labelled snippets from every markdown file in a
/// directory, runs each one through its toolchain under hard timeouts, and
/// compares the observed outcome with the broken/fixed claim.
///
/// # Configuration
///
/// Built-in toolchains cover the common tutorial languages. A
/// [`CheckConfig`] can override them, add new languages, and tune limits.
///
/// # Example
///
/// ```no_run
/// # async fn demo() -> anyhow::Result<()> {
/// use snippet_verdict::{CheckConfig, SnippetChecker};
///
/// let checker = SnippetChecker::new(CheckConfig::default()).with_languages(["cpp", "python"]);
/// let report = checker.run(std::path::Path::new("tutorials")).await?;
/// println!("{} mismatches", report.summary.mismatched);
/// # Ok(())
/// # }
/// ```
pub struct SnippetChecker {
    config: CheckConfig,
    filter: LanguageFilter,
    cancel: CancelHandle,
}

impl SnippetChecker {
    pub fn new(config: CheckConfig) -> Self {
        Self {
            config,
            filter: LanguageFilter::default(),
            cancel: CancelHandle::default(),
        }
    }

    /// Restricts the run to the given languages (toolchain names or fence tags).
    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.filter = LanguageFilter::new(languages);
        self
    }

    /// Handle that stops new snippets from launching when cancelled.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    /// Extracts, runs and classifies every snippet under `input_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error only when the input directory cannot be read.
    /// Everything that goes wrong with an individual snippet ends up in the
    /// report instead.
    pub async fn run(&self, input_dir: &Path) -> Result<Report> {
        let start = Instant::now();

        let extraction = extract_directory(input_dir)?;
        log::info!(
            "Extracted {} snippet(s) from {} file(s), {} block(s) skipped",
            extraction.snippets.len(),
            extraction.files_scanned,
            extraction.skipped.len()
        );

        let registry = LanguageRegistry::from_config(&self.config);
        let (tasks, collection_skipped) =
            collect_run_tasks(extraction.snippets, &registry, &self.filter);

        let mut skipped = extraction.skipped;
        skipped.extend(collection_skipped);

        let snippets: Vec<_> = tasks.iter().map(|task| task.snippet().clone()).collect();

        let ctx = ExecutionContext::new(RunLimits::from(&self.config.run), self.cancel.clone());
        let jobs = self.config.run.jobs();
        log::info!("Running {} snippet(s) with {} worker(s)", tasks.len(), jobs);

        let (results, parallel_duration) = execute_tasks(tasks, &ctx, jobs).await;
        log::debug!("Execution finished in {}ms", parallel_duration.as_millis());

        let options = ClassifyOptions {
            strict_stderr: self.config.run.strict_stderr,
        };
        let entries = snippets
            .iter()
            .zip(results.iter())
            .map(|(snippet, result)| {
                let verdict = classify(snippet, result, options);
                ReportEntry::new(snippet, result, &verdict)
            })
            .collect();

        Ok(Report::new(
            input_dir,
            extraction.files_scanned,
            entries,
            skipped,
            ctx.missing_toolchains(),
            ctx.is_cancelled(),
            start.elapsed(),
        ))
    }
}
