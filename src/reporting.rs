use crate::classifier::{Verdict, VerdictKind};
use crate::exit_codes;
use crate::extractor::{Label, LabelSource, SkipReason, SkippedBlock, Snippet, Stage};
use crate::runner::{ExecutionResult, Outcome};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lines of stderr kept in the report for a mismatch.
const STDERR_TAIL_LINES: usize = 12;

/// One row of the report: a snippet, what happened to it, and the verdict.
#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub id: String,
    pub digest: String,
    pub file: PathBuf,
    pub line: usize,
    pub language: String,
    pub toolchain: String,
    pub expected: Label,
    pub expected_stage: Option<Stage>,
    pub label_source: LabelSource,
    pub observed: Outcome,
    pub stage: Option<Stage>,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub duration_ms: u128,
    pub verdict: VerdictKind,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr_tail: Option<String>,
}

impl ReportEntry {
    pub fn new(snippet: &Snippet, result: &ExecutionResult, verdict: &Verdict) -> Self {
        let stderr_tail = (verdict.kind != VerdictKind::Match)
            .then(|| tail(diagnostics(result), STDERR_TAIL_LINES))
            .filter(|t| !t.is_empty());

        Self {
            id: snippet.id.clone(),
            digest: snippet.digest.clone(),
            file: snippet.file.clone(),
            line: snippet.line,
            language: snippet.language.clone(),
            toolchain: result.language.clone(),
            expected: snippet.label,
            expected_stage: snippet.expected_stage,
            label_source: snippet.label_source,
            observed: result.outcome,
            stage: result.stage,
            exit_code: result.exit_code,
            timed_out: result.timed_out,
            duration_ms: result.duration.as_millis(),
            verdict: verdict.kind,
            reason: verdict.reason.clone(),
            stderr_tail,
        }
    }
}

fn diagnostics(result: &ExecutionResult) -> &str {
    if let Some(message) = result.message.as_deref() {
        return message;
    }
    if result.stderr.trim().is_empty() {
        &result.stdout
    } else {
        &result.stderr
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim_end().lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

/// A language whose toolchain could not be invoked.
#[derive(Debug, Clone, Serialize)]
pub struct ToolchainError {
    pub language: String,
    pub message: String,
    pub snippets_affected: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub files_scanned: usize,
    pub snippets: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub indeterminate: usize,
    pub skipped: usize,
    pub skipped_by_reason: BTreeMap<String, usize>,
    pub per_language: BTreeMap<String, usize>,
    pub cancelled: bool,
    pub duration_ms: u128,
}

/// The final report of a run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Local>,
    pub input_dir: PathBuf,
    pub summary: Summary,
    pub entries: Vec<ReportEntry>,
    pub skipped: Vec<SkippedBlock>,
    pub toolchain_errors: Vec<ToolchainError>,
}

impl Report {
    pub fn new(
        input_dir: &Path,
        files_scanned: usize,
        entries: Vec<ReportEntry>,
        mut skipped: Vec<SkippedBlock>,
        missing_toolchains: BTreeMap<String, String>,
        cancelled: bool,
        duration: Duration,
    ) -> Self {
        skipped.sort_by(|a, b| (&a.file, a.line).cmp(&(&b.file, b.line)));

        let mut summary = Summary {
            files_scanned,
            snippets: entries.len(),
            skipped: skipped.len(),
            cancelled,
            duration_ms: duration.as_millis(),
            ..Summary::default()
        };

        for entry in &entries {
            match entry.verdict {
                VerdictKind::Match => summary.matched += 1,
                VerdictKind::Mismatch => summary.mismatched += 1,
                VerdictKind::Indeterminate => summary.indeterminate += 1,
            }
            *summary
                .per_language
                .entry(entry.toolchain.clone())
                .or_insert(0) += 1;
        }

        for block in &skipped {
            *summary
                .skipped_by_reason
                .entry(block.reason.to_string())
                .or_insert(0) += 1;
        }

        let toolchain_errors = missing_toolchains
            .into_iter()
            .map(|(language, message)| ToolchainError {
                snippets_affected: entries
                    .iter()
                    .filter(|e| e.toolchain == language && e.observed == Outcome::ToolchainMissing)
                    .count(),
                language,
                message,
            })
            .collect();

        Self {
            generated_at: Local::now(),
            input_dir: input_dir.to_path_buf(),
            summary,
            entries,
            skipped,
            toolchain_errors,
        }
    }

    pub fn has_mismatches(&self) -> bool {
        self.summary.mismatched > 0
    }

    /// `0` when every snippet matched (or nothing ran), `1` when any
    /// mismatch was found.
    pub fn exit_code(&self) -> i32 {
        if self.has_mismatches() {
            exit_codes::MISMATCH
        } else {
            exit_codes::OK
        }
    }

    pub fn mismatches(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries
            .iter()
            .filter(|e| e.verdict == VerdictKind::Mismatch)
    }

    pub fn skipped_with(&self, reason: SkipReason) -> usize {
        self.skipped.iter().filter(|s| s.reason == reason).count()
    }
}

/// Output format of the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReportFormat {
    #[default]
    Table,
    Json,
}

pub fn render(report: &Report, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Table => Ok(render_table(report)),
        ReportFormat::Json => render_json(report),
    }
}

pub fn render_json(report: &Report) -> Result<String> {
    let mut json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    json.push('\n');
    Ok(json)
}

/// Renders the report as aligned columns followed by a summary block.
pub fn render_table(report: &Report) -> String {
    const HEADERS: [&str; 7] = [
        "SNIPPET", "LANG", "EXPECTED", "OBSERVED", "VERDICT", "TIME", "REASON",
    ];

    let rows: Vec<[String; 7]> = report
        .entries
        .iter()
        .map(|e| {
            let expected = match e.expected_stage {
                Some(stage) => format!("{} ({})", e.expected, stage),
                None => e.expected.to_string(),
            };
            [
                e.id.clone(),
                e.toolchain.clone(),
                expected,
                e.observed.to_string(),
                e.verdict.to_string().to_uppercase(),
                format!("{}ms", e.duration_ms),
                e.reason.clone(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let mut push_row = |cells: &[&str]| {
        let last = cells.len() - 1;
        for (i, cell) in cells.iter().enumerate() {
            if i == last {
                out.push_str(cell);
            } else {
                let _ = write!(out, "{:<width$}  ", cell, width = widths[i]);
            }
        }
        out.push('\n');
    };

    if !rows.is_empty() {
        push_row(&HEADERS);
        for row in &rows {
            let cells: Vec<&str> = row.iter().map(String::as_str).collect();
            push_row(&cells);
        }
        out.push('\n');
    }

    let s = &report.summary;
    let _ = writeln!(
        out,
        "{} snippet(s) in {} file(s): {} matched, {} mismatched, {} indeterminate, {} skipped",
        s.snippets, s.files_scanned, s.matched, s.mismatched, s.indeterminate, s.skipped
    );

    if !s.skipped_by_reason.is_empty() {
        let reasons = s
            .skipped_by_reason
            .iter()
            .map(|(reason, count)| format!("{}: {}", reason, count))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(out, "skipped: {}", reasons);
    }

    for error in &report.toolchain_errors {
        let _ = writeln!(
            out,
            "toolchain missing: {} ({} snippet(s))",
            error.language, error.snippets_affected
        );
    }

    if s.cancelled {
        let _ = writeln!(out, "run cancelled: unlaunched snippets are indeterminate");
    }

    out
}

/// Formats a message with a timestamp, level and prefix.
fn format_log<'a>(
    timestamp: &chrono::format::DelayedFormat<chrono::format::StrftimeItems<'a>>,
    level: &str,
    message: &str,
) -> String {
    format!("{} [{}] (snippet_verdict): {}", timestamp, level, message)
}

/// Reports the approval error to stderr.
pub fn report_approval_error(config_path: &Path) {
    let now = Local::now();
    let timestamp = now.format("%Y-%m-%d %H:%M:%S");

    for line in [
        "config not approved for code execution".to_string(),
        String::new(),
        "For security, snippet-verdict requires explicit approval before".to_string(),
        "running toolchain commands defined in a config file.".to_string(),
        String::new(),
        "To approve this configuration after reviewing it:".to_string(),
        format!("  snippet-verdict allow {}", config_path.display()),
    ] {
        eprintln!("{}", format_log(&timestamp, "ERROR", &line));
    }
}

/// Prints every mismatch to stderr with its diagnostics.
pub fn report_mismatches(report: &Report) {
    let now = Local::now();
    let timestamp = now.format("%Y-%m-%d %H:%M:%S");

    for entry in report.mismatches() {
        eprintln!("{}", format_log(&timestamp, "ERROR", "Verdict mismatch"));
        eprintln!(
            "{}",
            format_log(
                &timestamp,
                "ERROR",
                &format!("Snippet: {} ({})", entry.id, entry.toolchain)
            )
        );
        eprintln!(
            "{}",
            format_log(&timestamp, "ERROR", &format!("Reason: {}", entry.reason))
        );

        if let Some(stderr) = &entry.stderr_tail {
            eprintln!("{}", format_log(&timestamp, "ERROR", ""));
            for line in stderr.lines() {
                eprintln!("{}", format_log(&timestamp, "ERROR", line));
            }
        }
        eprintln!("{}", format_log(&timestamp, "ERROR", ""));
    }

    for error in &report.toolchain_errors {
        eprintln!(
            "{}",
            format_log(
                &timestamp,
                "WARN",
                &format!(
                    "Toolchain for '{}' unavailable, {} snippet(s) indeterminate: {}",
                    error.language, error.snippets_affected, error.message
                )
            )
        );
    }
}

/// Prints run statistics to stderr.
///
/// Shows:
/// - Verdict totals with per-language counts
/// - Total time and average time per snippet
/// - Individual snippet timings (RUST_LOG=debug)
pub fn print_statistics(report: &Report) {
    let s = &report.summary;
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");

    if s.snippets == 0 {
        eprintln!(
            "{}",
            format_log(&timestamp, "INFO", "No snippets found to check")
        );
        return;
    }

    let per_language = s
        .per_language
        .iter()
        .map(|(lang, count)| format!("{}: {}", lang, count))
        .collect::<Vec<_>>()
        .join(", ");

    let sum_ms: u128 = report.entries.iter().map(|e| e.duration_ms).sum();
    let avg_ms = sum_ms / report.entries.len() as u128;

    eprintln!(
        "{}",
        format_log(
            &timestamp,
            "INFO",
            &format!(
                "Checked {} snippet(s) ({}): {} matched, {} mismatched, {} indeterminate",
                s.snippets, per_language, s.matched, s.mismatched, s.indeterminate
            )
        )
    );
    eprintln!(
        "{}",
        format_log(
            &timestamp,
            "INFO",
            &format!("Finished in {}ms (avg {}ms per snippet)", s.duration_ms, avg_ms)
        )
    );

    log::debug!("Individual snippet timings:");
    for entry in &report.entries {
        log::debug!(
            "[SNIPPET_TIME] [{}] {}: {}ms",
            entry.toolchain,
            entry.id,
            entry.duration_ms
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, verdict: VerdictKind, observed: Outcome) -> ReportEntry {
        ReportEntry {
            id: id.to_string(),
            digest: "abc".to_string(),
            file: PathBuf::from("a.md"),
            line: 1,
            language: "py".to_string(),
            toolchain: "python".to_string(),
            expected: Label::Fixed,
            expected_stage: None,
            label_source: LabelSource::FenceFlag,
            observed,
            stage: Some(Stage::Run),
            exit_code: Some(0),
            timed_out: false,
            duration_ms: 12,
            verdict,
            reason: "ran cleanly".to_string(),
            stderr_tail: None,
        }
    }

    fn report(entries: Vec<ReportEntry>) -> Report {
        let mut missing = BTreeMap::new();
        missing.insert("python".to_string(), "not found".to_string());
        Report::new(
            Path::new("docs"),
            1,
            entries,
            vec![SkippedBlock {
                file: PathBuf::from("a.md"),
                line: 9,
                language: None,
                reason: SkipReason::Untagged,
            }],
            missing,
            false,
            Duration::from_millis(40),
        )
    }

    #[test]
    fn empty_report_exits_ok() {
        let report = Report::new(
            Path::new("docs"),
            0,
            Vec::new(),
            Vec::new(),
            BTreeMap::new(),
            false,
            Duration::ZERO,
        );
        assert_eq!(report.exit_code(), exit_codes::OK);
        assert!(render_table(&report).starts_with("0 snippet(s) in 0 file(s)"));
    }

    #[test]
    fn summary_counts_verdicts() {
        let report = report(vec![
            entry("a.md:1", VerdictKind::Match, Outcome::Success),
            entry("a.md:5", VerdictKind::Mismatch, Outcome::RuntimeError),
            entry("a.md:7", VerdictKind::Indeterminate, Outcome::ToolchainMissing),
        ]);

        assert_eq!(report.summary.matched, 1);
        assert_eq!(report.summary.mismatched, 1);
        assert_eq!(report.summary.indeterminate, 1);
        assert_eq!(report.summary.skipped_by_reason["untagged"], 1);
        assert_eq!(report.toolchain_errors[0].snippets_affected, 1);
        assert_eq!(report.exit_code(), exit_codes::MISMATCH);
        assert_eq!(report.mismatches().count(), 1);
    }

    #[test]
    fn table_lists_every_entry() {
        let report = report(vec![
            entry("a.md:1", VerdictKind::Match, Outcome::Success),
            entry("a.md:5", VerdictKind::Mismatch, Outcome::RuntimeError),
        ]);
        let table = render_table(&report);

        assert!(table.starts_with("SNIPPET"));
        assert!(table.contains("a.md:5"));
        assert!(table.contains("MISMATCH"));
        assert!(table.contains("skipped: untagged: 1"));
        assert!(table.contains("toolchain missing: python"));
    }

    #[test]
    fn json_uses_snake_case_kinds() {
        let report = report(vec![entry(
            "a.md:5",
            VerdictKind::Mismatch,
            Outcome::RuntimeError,
        )]);
        let json: serde_json::Value = serde_json::from_str(&render_json(&report).unwrap()).unwrap();

        assert_eq!(json["entries"][0]["verdict"], "mismatch");
        assert_eq!(json["entries"][0]["observed"], "runtime_error");
        assert_eq!(json["skipped"][0]["reason"], "untagged");
        assert_eq!(json["summary"]["mismatched"], 1);
    }

    #[test]
    fn tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc\n", 2), "b\nc");
        assert_eq!(tail("", 2), "");
    }
}
