use crate::extractor::Snippet;
use crate::language::ConfiguredLanguage;
use crate::runner::{run_snippet, ExecutionResult, Outcome, RunLimits};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// An execution task representing a single snippet to be run.
///
/// This struct contains all the information needed to independently run
/// a snippet in parallel without requiring shared state.
pub struct RunTask {
    language: ConfiguredLanguage,
    snippet: Arc<Snippet>,
}

impl RunTask {
    pub fn new(language: ConfiguredLanguage, snippet: Arc<Snippet>) -> Self {
        Self { language, snippet }
    }

    pub fn snippet(&self) -> &Arc<Snippet> {
        &self.snippet
    }

    #[cfg(test)]
    pub fn language(&self) -> &ConfiguredLanguage {
        &self.language
    }

    /// Executes the snippet and consumes the task to produce a result.
    ///
    /// Nothing is launched when the batch has been cancelled or when the
    /// language's toolchain is already known to be missing.
    pub async fn execute(self, ctx: &ExecutionContext) -> ExecutionResult {
        if ctx.cancel.is_cancelled() {
            return ExecutionResult::not_launched(
                &self.snippet,
                &self.language,
                Outcome::Cancelled,
                None,
            );
        }

        if let Some(message) = ctx.missing_toolchain(self.language.name()) {
            return ExecutionResult::not_launched(
                &self.snippet,
                &self.language,
                Outcome::ToolchainMissing,
                Some(message),
            );
        }

        let result = run_snippet(&self.language, &self.snippet, &ctx.limits).await;

        if result.outcome == Outcome::ToolchainMissing {
            let message = result.message.clone().unwrap_or_default();
            ctx.record_missing_toolchain(self.language.name(), message);
        }

        result
    }
}

/// Cooperative, batch-level cancellation.
///
/// Cancelling stops new snippets from launching; snippets already running
/// finish or time out.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// State shared by every worker of one batch.
pub struct ExecutionContext {
    limits: RunLimits,
    cancel: CancelHandle,
    missing: Mutex<BTreeMap<String, String>>,
}

impl ExecutionContext {
    pub fn new(limits: RunLimits, cancel: CancelHandle) -> Self {
        Self {
            limits,
            cancel,
            missing: Mutex::new(BTreeMap::new()),
        }
    }

    fn missing_toolchain(&self, language: &str) -> Option<String> {
        self.missing
            .lock()
            .ok()
            .and_then(|missing| missing.get(language).cloned())
    }

    fn record_missing_toolchain(&self, language: &str, message: String) {
        let Ok(mut missing) = self.missing.lock() else {
            return;
        };
        if !missing.contains_key(language) {
            log::warn!(
                "Toolchain for '{}' not found, remaining snippets in this language are indeterminate: {}",
                language,
                message
            );
            missing.insert(language.to_string(), message);
        }
    }

    /// Languages whose toolchain was found missing, with the first error seen.
    pub fn missing_toolchains(&self) -> BTreeMap<String, String> {
        self.missing
            .lock()
            .map(|missing| missing.clone())
            .unwrap_or_default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Runs all tasks with at most `jobs` snippets in flight.
///
/// Results come back in task order. Returns a tuple of
/// (results, total_parallel_duration).
pub async fn execute_tasks(
    tasks: Vec<RunTask>,
    ctx: &ExecutionContext,
    jobs: usize,
) -> (Vec<ExecutionResult>, Duration) {
    let parallel_start = Instant::now();
    let results: Vec<ExecutionResult> = stream::iter(tasks)
        .map(|task| task.execute(ctx))
        .buffered(jobs.max(1))
        .collect()
        .await;
    let parallel_duration = parallel_start.elapsed();

    (results, parallel_duration)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::LanguageConfig;
    use crate::extractor::extract_snippets;
    use std::path::Path;

    fn language(program: &str) -> ConfiguredLanguage {
        ConfiguredLanguage::new(
            "shell".to_string(),
            LanguageConfig {
                enabled: true,
                compile: None,
                run: vec![program.to_string(), "{src}".to_string()],
                preamble: None,
                fence_markers: vec!["shell".to_string()],
            },
        )
    }

    fn tasks(program: &str, bodies: &[&str]) -> Vec<RunTask> {
        let markdown: String = bodies
            .iter()
            .map(|b| format!("```shell,fixed\n{}\n```\n\n", b))
            .collect();
        let (snippets, _) = extract_snippets(&markdown, Path::new("t.md"));
        snippets
            .into_iter()
            .map(|s| RunTask::new(language(program), Arc::new(s)))
            .collect()
    }

    fn context(cancel: CancelHandle) -> ExecutionContext {
        ExecutionContext::new(
            RunLimits {
                compile_timeout: Duration::from_secs(5),
                run_timeout: Duration::from_secs(5),
                output_limit_bytes: 1024,
            },
            cancel,
        )
    }

    #[tokio::test]
    async fn results_keep_task_order() {
        let ctx = context(CancelHandle::default());
        let (results, _) = execute_tasks(
            tasks("sh", &["sleep 0.3; echo first", "echo second", "exit 2"]),
            &ctx,
            3,
        )
        .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].stdout.trim(), "first");
        assert_eq!(results[1].stdout.trim(), "second");
        assert_eq!(results[2].outcome, Outcome::RuntimeError);
    }

    #[tokio::test]
    async fn cancelled_batch_launches_nothing() {
        let cancel = CancelHandle::default();
        cancel.cancel();
        let ctx = context(cancel);

        let (results, _) = execute_tasks(tasks("sh", &["echo a", "echo b"]), &ctx, 2).await;

        assert!(results.iter().all(|r| r.outcome == Outcome::Cancelled));
        assert!(results.iter().all(|r| r.stage.is_none()));
    }

    #[tokio::test]
    async fn cancel_mid_batch_lets_running_snippet_finish() {
        let cancel = CancelHandle::default();
        let ctx = context(cancel.clone());
        let trigger = async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            cancel.cancel();
        };

        let ((results, _), ()) = tokio::join!(
            execute_tasks(
                tasks("sh", &["sleep 1; echo done", "echo b", "echo c"]),
                &ctx,
                1
            ),
            trigger
        );

        assert_eq!(results[0].outcome, Outcome::Success);
        assert_eq!(results[0].stdout.trim(), "done");
        assert_eq!(results[1].outcome, Outcome::Cancelled);
        assert_eq!(results[2].outcome, Outcome::Cancelled);
    }

    #[tokio::test]
    async fn missing_toolchain_recorded_once_and_not_retried() {
        let ctx = context(CancelHandle::default());
        let (results, _) = execute_tasks(
            tasks("no-such-interpreter-xyz", &["echo a", "echo b", "echo c"]),
            &ctx,
            1,
        )
        .await;

        assert!(results
            .iter()
            .all(|r| r.outcome == Outcome::ToolchainMissing));
        // Only the first snippet reached the spawn attempt.
        assert!(results[0].stage.is_some());
        assert!(results[1].stage.is_none());
        assert!(results[2].stage.is_none());
        assert_eq!(ctx.missing_toolchains().len(), 1);
    }
}
