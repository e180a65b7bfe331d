//! snippet-verdict library
//!
//! Checks the code listings of markdown tutorials that pair "broken" and
//! "fixed" snippets. Every fenced block is extracted, run through its
//! toolchain under hard timeouts, and compared with the author's claim.
//! The primary interface is the snippet-verdict binary, but the library can
//! be used programmatically for testing or custom integrations.
//!
//! ## Public API
//!
//! The main entry point is [`SnippetChecker`], which produces a [`Report`].
//!
//! The pipeline stages are also exposed on their own:
//! - [`extract_directory`] / [`extract_snippets`] - Extractor
//! - [`run_snippet`] - Runner
//! - [`classify`] - Classifier
//! - [`render`] - Report rendering

pub mod approval;
mod checker;
mod classifier;
mod config;
mod execution;
pub mod exit_codes;
mod extractor;
mod language;
mod process;
mod reporting;
mod runner;
mod task_collector;

pub use checker::SnippetChecker;
pub use classifier::{classify, ClassifyOptions, Verdict, VerdictKind};
pub use config::{CheckConfig, LanguageConfig, RunConfig};
pub use execution::CancelHandle;
pub use extractor::{
    extract_directory, extract_snippets, Extraction, Label, LabelSource, SkipReason, SkippedBlock,
    Snippet, Stage,
};
pub use language::{
    builtin_toolchain, get_language_metadata, ConfiguredLanguage, LanguageMetadata,
    LanguageRegistry,
};
pub use reporting::{
    print_statistics, render, report_approval_error, report_mismatches, Report, ReportEntry,
    ReportFormat,
};
pub use runner::{run_snippet, ExecutionResult, Outcome, RunLimits};
