use crate::extractor::{Label, Snippet, Stage};
use crate::runner::{ExecutionResult, Outcome};
use serde::Serialize;
use std::fmt;

/// Comparison between the claimed and the observed outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    Match,
    Mismatch,
    Indeterminate,
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerdictKind::Match => write!(f, "match"),
            VerdictKind::Mismatch => write!(f, "mismatch"),
            VerdictKind::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub snippet_id: String,
    pub expected: Label,
    pub observed: Outcome,
    pub kind: VerdictKind,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyOptions {
    /// Fixed snippets must also keep stderr empty at run time
    pub strict_stderr: bool,
}

/// Classifies one executed snippet.
///
/// Broken snippets must fail (compiler error, non-zero exit, or timeout) and
/// fixed snippets must succeed. A broken snippet that claims a compile error
/// only matches when the compiler itself rejected it. Outcomes that say
/// nothing about the snippet (missing toolchain, cancellation, tooling
/// errors) are indeterminate.
pub fn classify(snippet: &Snippet, result: &ExecutionResult, options: ClassifyOptions) -> Verdict {
    let (kind, reason) = judge(snippet, result, options);

    Verdict {
        snippet_id: snippet.id.clone(),
        expected: snippet.label,
        observed: result.outcome,
        kind,
        reason,
    }
}

fn judge(
    snippet: &Snippet,
    result: &ExecutionResult,
    options: ClassifyOptions,
) -> (VerdictKind, String) {
    use VerdictKind::{Indeterminate, Match, Mismatch};

    match result.outcome {
        Outcome::ToolchainMissing => {
            return (
                Indeterminate,
                format!("toolchain for '{}' not found", result.language),
            )
        }
        Outcome::Cancelled => return (Indeterminate, "cancelled before launch".to_string()),
        Outcome::InternalError => {
            return (
                Indeterminate,
                format!(
                    "tooling error: {}",
                    result.message.as_deref().unwrap_or("unknown")
                ),
            )
        }
        _ => {}
    }

    match (snippet.label, result.outcome) {
        (Label::Fixed, Outcome::Success) => {
            if options.strict_stderr && !result.stderr.trim().is_empty() {
                (Mismatch, "fixed snippet wrote to stderr".to_string())
            } else {
                (Match, "ran cleanly".to_string())
            }
        }
        (Label::Fixed, _) => (
            Mismatch,
            format!("expected success, observed {}", describe(result)),
        ),
        (Label::Broken, Outcome::Success) => (
            Mismatch,
            "expected failure, but the snippet ran cleanly".to_string(),
        ),
        (Label::Broken, _) => judge_broken_failure(snippet, result),
    }
}

fn judge_broken_failure(snippet: &Snippet, result: &ExecutionResult) -> (VerdictKind, String) {
    use VerdictKind::{Indeterminate, Match, Mismatch};

    let observed = describe(result);

    match snippet.expected_stage {
        None => (Match, format!("failed as expected ({})", observed)),

        // Interpreted languages have no compiler to reject the snippet.
        Some(Stage::Compile) if !result.compiled => (
            Match,
            format!("failed as expected ({}); no compile stage", observed),
        ),

        Some(Stage::Compile) => match (result.outcome, result.stage) {
            (Outcome::CompileError, _) => (Match, "compiler rejected the snippet".to_string()),
            (Outcome::Timeout, Some(Stage::Compile)) => (
                Indeterminate,
                "compiler timed out; compile error not confirmed".to_string(),
            ),
            _ => (
                Mismatch,
                format!("expected a compile error, but it compiled and then {}", observed),
            ),
        },

        Some(Stage::Run) => match result.outcome {
            Outcome::CompileError => (
                Mismatch,
                "expected a run-time failure, but the compiler rejected the snippet".to_string(),
            ),
            _ => (Match, format!("failed at run time as expected ({})", observed)),
        },
    }
}

fn describe(result: &ExecutionResult) -> String {
    let stage = result
        .stage
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());

    match result.outcome {
        Outcome::Timeout => format!("timeout in {} stage", stage),
        Outcome::CompileError | Outcome::RuntimeError => match result.exit_code {
            Some(code) => format!("{} (exit {})", result.outcome, code),
            None => format!("{} (killed by signal)", result.outcome),
        },
        other => other.to_string(),
    }
}
