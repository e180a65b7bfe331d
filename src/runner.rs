use crate::config::RunConfig;
use crate::extractor::{Snippet, Stage};
use crate::language::ConfiguredLanguage;
use crate::process::{is_not_found, CommandOutput};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Observed outcome of executing one snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Every stage exited zero
    Success,
    /// The compiler exited non-zero
    CompileError,
    /// The program (or interpreter) exited non-zero or was killed by a signal
    RuntimeError,
    /// A stage exceeded its timeout and was killed
    Timeout,
    /// The toolchain executable could not be found
    ToolchainMissing,
    /// The batch was cancelled before this snippet launched
    Cancelled,
    /// The snippet could not be prepared (temp dir, source file, spawn failure)
    InternalError,
}

impl Outcome {
    /// Whether the snippet was actually observed to fail.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Outcome::CompileError | Outcome::RuntimeError | Outcome::Timeout
        )
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Success => "success",
            Outcome::CompileError => "compile_error",
            Outcome::RuntimeError => "runtime_error",
            Outcome::Timeout => "timeout",
            Outcome::ToolchainMissing => "toolchain_missing",
            Outcome::Cancelled => "cancelled",
            Outcome::InternalError => "internal_error",
        };
        f.write_str(s)
    }
}

/// Timeouts and capture limits applied to every toolchain invocation.
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    pub compile_timeout: Duration,
    pub run_timeout: Duration,
    pub output_limit_bytes: usize,
}

impl From<&RunConfig> for RunLimits {
    fn from(config: &RunConfig) -> Self {
        Self {
            compile_timeout: config.compile_timeout(),
            run_timeout: config.run_timeout(),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

/// Result of executing a single snippet.
///
/// Captures the outcome of the last stage that ran, along with timing
/// information for statistics and the report.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub snippet_id: String,
    /// Name of the toolchain that handled the snippet
    pub language: String,
    pub outcome: Outcome,
    /// Stage that decided the outcome; `None` when nothing was launched
    pub stage: Option<Stage>,
    /// Whether the language has a compile stage
    pub compiled: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
    /// Tooling error detail for `toolchain_missing` and `internal_error`
    pub message: Option<String>,
}

impl ExecutionResult {
    /// A result for a snippet that never reached a toolchain.
    pub fn not_launched(
        snippet: &Snippet,
        language: &ConfiguredLanguage,
        outcome: Outcome,
        message: Option<String>,
    ) -> Self {
        Self {
            snippet_id: snippet.id.clone(),
            language: language.name().to_string(),
            outcome,
            stage: None,
            compiled: language.is_compiled(),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
            timed_out: false,
            message,
        }
    }

    fn from_output(
        snippet: &Snippet,
        language: &ConfiguredLanguage,
        stage: Stage,
        output: CommandOutput,
        elapsed: Duration,
    ) -> Self {
        let outcome = if output.timed_out {
            Outcome::Timeout
        } else if output.status.success() {
            Outcome::Success
        } else {
            match stage {
                Stage::Compile => Outcome::CompileError,
                Stage::Run => Outcome::RuntimeError,
            }
        };

        Self {
            snippet_id: snippet.id.clone(),
            language: language.name().to_string(),
            outcome,
            stage: Some(stage),
            compiled: language.is_compiled(),
            exit_code: output.exit_code(),
            stdout: output.stdout,
            stderr: output.stderr,
            duration: elapsed + output.duration,
            timed_out: output.timed_out,
            message: None,
        }
    }

    fn from_error(
        snippet: &Snippet,
        language: &ConfiguredLanguage,
        stage: Stage,
        err: anyhow::Error,
        elapsed: Duration,
    ) -> Self {
        let outcome = if is_not_found(&err) {
            Outcome::ToolchainMissing
        } else {
            Outcome::InternalError
        };

        let mut result = Self::not_launched(snippet, language, outcome, Some(format!("{:#}", err)));
        result.stage = Some(stage);
        result.duration = elapsed;
        result
    }
}

/// Executes a snippet in its own temporary directory.
///
/// Compiled languages go through the compile command first and only run
/// when it exits zero. Every invocation is bounded by its timeout; a
/// single attempt is made and any failure is a terminal result.
pub async fn run_snippet(
    language: &ConfiguredLanguage,
    snippet: &Snippet,
    limits: &RunLimits,
) -> ExecutionResult {
    let workdir = match tempfile::Builder::new().prefix("snippet-").tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            return ExecutionResult::not_launched(
                snippet,
                language,
                Outcome::InternalError,
                Some(format!("Failed to create working directory: {}", e)),
            )
        }
    };

    let paths = language.placeholders(&snippet.code, workdir.path());
    if let Err(e) = language.write_source_file(&snippet.code, &paths.src).await {
        return ExecutionResult::not_launched(
            snippet,
            language,
            Outcome::InternalError,
            Some(format!("{:#}", e)),
        );
    }

    let mut elapsed = Duration::ZERO;

    match language
        .compile(&paths, limits.compile_timeout, limits.output_limit_bytes)
        .await
    {
        Ok(None) => {}
        Ok(Some(output)) if output.success() => elapsed += output.duration,
        Ok(Some(output)) => {
            return ExecutionResult::from_output(snippet, language, Stage::Compile, output, elapsed)
        }
        Err(e) => return ExecutionResult::from_error(snippet, language, Stage::Compile, e, elapsed),
    }

    let result = match language
        .run(&paths, limits.run_timeout, limits.output_limit_bytes)
        .await
    {
        Ok(output) => ExecutionResult::from_output(snippet, language, Stage::Run, output, elapsed),
        Err(e) => ExecutionResult::from_error(snippet, language, Stage::Run, e, elapsed),
    };

    log::debug!(
        "{} [{}] finished: {} in {}ms",
        snippet.id,
        language,
        result.outcome,
        result.duration.as_millis()
    );

    // The working directory is removed here, after every child has been reaped.
    drop(workdir);
    result
}
