use crate::language::language_for_extension;
use anyhow::{Context, Result};
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// The author's claim about a snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Broken,
    Fixed,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Broken => write!(f, "broken"),
            Label::Fixed => write!(f, "fixed"),
        }
    }
}

/// Toolchain stage at which a snippet is expected to fail, or did fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Compile,
    Run,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Compile => write!(f, "compile"),
            Stage::Run => write!(f, "run"),
        }
    }
}

/// Where a snippet's label came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    FenceFlag,
    FilenameComment,
    Prose,
}

/// A fenced code block extracted from a tutorial, ready to be executed.
#[derive(Debug, Clone, Serialize)]
pub struct Snippet {
    /// `file:line` identity, unique within a run
    pub id: String,
    /// Short SHA-256 digest of the code
    pub digest: String,
    /// Markdown file, relative to the input directory
    pub file: PathBuf,
    /// 1-based line of the opening fence
    pub line: usize,
    /// 0-based index of the block within its file
    pub index: usize,
    /// Fence language tag, or the language inferred from a filename comment
    pub language: String,
    pub label: Label,
    pub label_source: LabelSource,
    pub expected_stage: Option<Stage>,
    /// Code with any propagated context prepended
    #[serde(skip)]
    pub code: String,
}

/// Why a fenced block did not become a [`Snippet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No language tag and no filename comment to infer one from
    Untagged,
    /// No broken/fixed label could be derived
    Unlabeled,
    /// Marked with the `ignore` flag
    Ignored,
    /// No enabled toolchain for the language
    UnsupportedLanguage,
    /// Excluded by the language allow-list
    Filtered,
    /// Exceeds the snippet size limit
    TooLarge,
    /// The markdown file could not be read as UTF-8
    Unreadable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::Untagged => "untagged",
            SkipReason::Unlabeled => "unlabeled",
            SkipReason::Ignored => "ignored",
            SkipReason::UnsupportedLanguage => "unsupported_language",
            SkipReason::Filtered => "filtered",
            SkipReason::TooLarge => "too_large",
            SkipReason::Unreadable => "unreadable",
        };
        f.write_str(s)
    }
}

/// A block (or file) that was skipped, kept for the report.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedBlock {
    pub file: PathBuf,
    /// 1-based line of the opening fence; 0 for whole-file skips
    pub line: usize,
    pub language: Option<String>,
    pub reason: SkipReason,
}

/// Everything extracted from an input directory.
#[derive(Debug, Default)]
pub struct Extraction {
    pub files_scanned: usize,
    pub snippets: Vec<Snippet>,
    pub skipped: Vec<SkippedBlock>,
}

/// A fenced code block with the markdown context around it.
///
/// # Attributes
///
/// The fence info string carries the language followed by comma or space
/// separated flags:
///
/// - `broken` / `fixed` - Label the block explicitly
/// - `compile_fail` - Broken, expected to fail in the compiler
/// - `run_fail` (or `should_panic`) - Broken, expected to fail at run time
/// - `ignore` - Skip this block
/// - `propagate` - Prepend this block's code to later snippets in the same file
///
/// # Example
///
/// ````markdown
/// ```cpp,propagate
/// #include <vector>
/// ```
///
/// ```cpp,broken
/// int main() { std::vector<int> v; return v.at(3); }
/// ```
/// ````
#[derive(Debug, Clone)]
pub struct CodeBlock {
    /// The language tag from the fence marker, lowercased (empty when untagged)
    pub language: String,
    /// Lowercased flags following the language tag
    pub flags: Vec<String>,
    /// The actual code content
    pub code: String,
    /// 1-based line of the opening fence
    pub line: usize,
    /// Text of the closest paragraph before the block within the current section
    pub paragraph: String,
    /// Text of the closest heading before the block
    pub heading: String,
}

impl CodeBlock {
    fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }
}

/// Extracts fenced code blocks from markdown content using pulldown-cmark.
///
/// Indented code blocks are not snippets and are not returned. Propagation
/// and labelling happen in [`extract_snippets`].
pub fn extract_code_blocks(content: &str) -> Vec<CodeBlock> {
    let parser = Parser::new_ext(content, Options::empty()).into_offset_iter();
    let mut code_blocks = Vec::new();

    let mut current: Option<CodeBlock> = None;
    let mut heading = String::new();
    let mut paragraph = String::new();
    let mut prose = String::new();
    let mut in_prose = false;

    for (event, range) in parser {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                let (language, flags) = parse_fence_info(&info);
                current = Some(CodeBlock {
                    language,
                    flags,
                    code: String::new(),
                    line: line_of(content, range.start),
                    paragraph: paragraph.clone(),
                    heading: heading.clone(),
                });
            }

            Event::End(TagEnd::CodeBlock) => {
                if let Some(block) = current.take() {
                    code_blocks.push(block);
                }
                // A paragraph introduces the block right after it, not every later one.
                paragraph.clear();
            }

            Event::Start(Tag::Heading { .. }) | Event::Start(Tag::Paragraph) => {
                in_prose = true;
                prose.clear();
            }

            Event::End(TagEnd::Heading(_)) => {
                in_prose = false;
                heading = prose.trim().to_string();
                paragraph.clear();
            }

            Event::End(TagEnd::Paragraph) => {
                in_prose = false;
                paragraph = prose.trim().to_string();
            }

            Event::Text(text) => {
                if let Some(block) = current.as_mut() {
                    block.code.push_str(&text);
                } else if in_prose {
                    prose.push_str(&text);
                }
            }

            Event::Code(text) if in_prose => prose.push_str(&text),

            Event::SoftBreak | Event::HardBreak if in_prose => prose.push(' '),

            _ => {}
        }
    }

    code_blocks
}

/// Parse fence info string into language and flags
/// Examples:
/// - "cpp" -> ("cpp", [])
/// - "cpp,broken" -> ("cpp", ["broken"])
/// - "rust compile_fail" -> ("rust", ["compile_fail"])
fn parse_fence_info(info: &str) -> (String, Vec<String>) {
    let mut parts = info
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|s| s.trim().trim_start_matches('{').trim_end_matches('}'))
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_start_matches('.').to_ascii_lowercase());

    let language = parts.next().unwrap_or_default();
    let flags = parts.collect();

    (language, flags)
}

fn line_of(content: &str, offset: usize) -> usize {
    content.as_bytes()[..offset.min(content.len())]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
        + 1
}

/// A label derived from one source, with the failure stage it implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Claim {
    label: Label,
    stage: Option<Stage>,
}

const BROKEN_WORDS: &[&str] = &[
    "broken",
    "buggy",
    "incorrect",
    "wrong",
    "bad",
    "problematic",
    "failing",
    "vulnerable",
];

const FIXED_WORDS: &[&str] = &[
    "fixed",
    "corrected",
    "correct",
    "working",
    "solution",
    "good",
    "resolved",
];

const COMPILE_PHRASES: &[&str] = &[
    "compile error",
    "compilation error",
    "compiler error",
    "compile-time error",
    "compile time error",
    "does not compile",
    "doesn't compile",
    "won't compile",
    "fails to compile",
    "compile_fail",
];

const RUN_PHRASES: &[&str] = &[
    "runtime error",
    "run-time error",
    "crash",
    "panic",
    "exception",
    "segfault",
    "segmentation fault",
    "run_fail",
];

fn stage_from_text(text: &str) -> Option<Stage> {
    let lower = text.to_lowercase();
    if COMPILE_PHRASES.iter().any(|p| lower.contains(p)) {
        Some(Stage::Compile)
    } else if RUN_PHRASES.iter().any(|p| lower.contains(p)) {
        Some(Stage::Run)
    } else {
        None
    }
}

/// Words that flip a label word following them ("not correct", "isn't broken").
/// Contractions are split at the apostrophe, so `isn't` arrives as `isn` `t`.
const NEGATIONS: &[&str] = &[
    "not", "never", "no", "isn", "aren", "wasn", "doesn", "don", "didn", "cannot",
];

/// How many words back a negation still applies.
const NEGATION_WINDOW: usize = 3;

/// Label from a piece of text by whole-word match. Negated label words count
/// for the opposite side. Text naming both sides ("broken vs fixed") is
/// ambiguous and yields nothing.
fn label_from_words(text: &str) -> Option<Label> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let mut broken = false;
    let mut fixed = false;
    for (i, word) in words.iter().enumerate() {
        let label = if BROKEN_WORDS.contains(word) {
            Label::Broken
        } else if FIXED_WORDS.contains(word) {
            Label::Fixed
        } else {
            continue;
        };

        let negated = words[i.saturating_sub(NEGATION_WINDOW)..i]
            .iter()
            .any(|w| NEGATIONS.contains(w));

        match (label, negated) {
            (Label::Broken, false) | (Label::Fixed, true) => broken = true,
            (Label::Fixed, false) | (Label::Broken, true) => fixed = true,
        }
    }

    match (broken, fixed) {
        (true, false) => Some(Label::Broken),
        (false, true) => Some(Label::Fixed),
        _ => None,
    }
}

fn claim_from_flags(block: &CodeBlock) -> Option<Claim> {
    if block.has_flag("compile_fail") {
        return Some(Claim {
            label: Label::Broken,
            stage: Some(Stage::Compile),
        });
    }
    if block.has_flag("run_fail") || block.has_flag("should_panic") {
        return Some(Claim {
            label: Label::Broken,
            stage: Some(Stage::Run),
        });
    }
    if block.has_flag("broken") {
        return Some(Claim {
            label: Label::Broken,
            stage: None,
        });
    }
    if block.has_flag("fixed") {
        return Some(Claim {
            label: Label::Fixed,
            stage: None,
        });
    }
    None
}

/// A filename comment such as `// broken_05.cpp` or `# File: fixed.py`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FilenameComment {
    stem: String,
    extension: String,
    line: String,
}

fn filename_comment(code: &str) -> Option<FilenameComment> {
    let line = code
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("#!"))?;

    let mut body = line;
    for prefix in ["<!--", "/*", "//", "--", "#", ";", "%", "'"] {
        if let Some(rest) = body.strip_prefix(prefix) {
            body = rest;
            break;
        }
    }
    if body.len() == line.len() {
        return None;
    }
    let body = body
        .trim()
        .trim_end_matches("-->")
        .trim_end_matches("*/")
        .trim();

    let mut tokens = body.split_whitespace();
    let mut candidate = tokens.next()?;
    if candidate.eq_ignore_ascii_case("file:") || candidate.eq_ignore_ascii_case("filename:") {
        candidate = tokens.next()?;
    }
    let candidate = candidate.trim_end_matches([':', ',', ')']);

    let (stem, extension) = candidate.rsplit_once('.')?;
    let stem = stem.rsplit(['/', '\\']).next().unwrap_or(stem);
    let valid_ext = !extension.is_empty() && extension.chars().all(|c| c.is_ascii_alphanumeric());
    let valid_stem = !stem.is_empty()
        && stem
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !valid_ext || !valid_stem {
        return None;
    }

    Some(FilenameComment {
        stem: stem.to_string(),
        extension: extension.to_ascii_lowercase(),
        line: line.to_string(),
    })
}

fn claim_from_filename(comment: &FilenameComment) -> Option<Claim> {
    let label = label_from_words(&comment.stem.replace(['_', '-', '.'], " ")).or_else(|| {
        let stem = comment.stem.to_ascii_lowercase();
        if stem.starts_with("broken") || stem.starts_with("bad") {
            Some(Label::Broken)
        } else if stem.starts_with("fixed") || stem.starts_with("good") {
            Some(Label::Fixed)
        } else {
            None
        }
    })?;

    Some(Claim {
        label,
        stage: stage_from_text(&comment.line),
    })
}

fn claim_from_prose(block: &CodeBlock) -> Option<Claim> {
    [&block.paragraph, &block.heading]
        .into_iter()
        .filter(|text| !text.is_empty())
        .find_map(|text| {
            label_from_words(text).map(|label| Claim {
                label,
                stage: stage_from_text(text),
            })
        })
}

/// Extracts labelled snippets from one markdown document.
///
/// `file` is recorded on every snippet and skipped block; it should be
/// relative to the input directory.
///
/// # Propagation Behavior
///
/// - Blocks marked with `propagate` have their code accumulated per language
/// - Later snippets of the same language receive that code as a preamble
/// - Propagated blocks are context only and never become snippets
/// - Propagation never leaks between different markdown files
pub fn extract_snippets(content: &str, file: &Path) -> (Vec<Snippet>, Vec<SkippedBlock>) {
    let mut snippets = Vec::new();
    let mut skipped = Vec::new();
    let mut propagated_code: HashMap<String, String> = HashMap::new();

    for (index, block) in extract_code_blocks(content).into_iter().enumerate() {
        let skip = |reason: SkipReason, language: &str| SkippedBlock {
            file: file.to_path_buf(),
            line: block.line,
            language: (!language.is_empty()).then(|| language.to_string()),
            reason,
        };

        if block.has_flag("ignore") {
            skipped.push(skip(SkipReason::Ignored, &block.language));
            continue;
        }

        let comment = filename_comment(&block.code);

        let language = if block.language.is_empty() {
            comment
                .as_ref()
                .and_then(|c| language_for_extension(&c.extension))
                .map(str::to_string)
        } else {
            Some(block.language.clone())
        };

        let Some(language) = language else {
            log::debug!(
                "Skipping untagged block at {}:{}",
                file.display(),
                block.line
            );
            skipped.push(skip(SkipReason::Untagged, ""));
            continue;
        };

        if block.has_flag("propagate") {
            let context = propagated_code.entry(language).or_default();
            context.push_str(&block.code);
            context.push('\n');
            continue;
        }

        let claim = claim_from_flags(&block)
            .map(|c| (c, LabelSource::FenceFlag))
            .or_else(|| {
                comment
                    .as_ref()
                    .and_then(claim_from_filename)
                    .map(|c| (c, LabelSource::FilenameComment))
            })
            .or_else(|| claim_from_prose(&block).map(|c| (c, LabelSource::Prose)));

        let Some((claim, label_source)) = claim else {
            skipped.push(skip(SkipReason::Unlabeled, &language));
            continue;
        };

        let mut code = String::new();
        if let Some(context) = propagated_code.get(&language) {
            code.push_str(context);
            code.push('\n');
        }
        code.push_str(&block.code);

        snippets.push(Snippet {
            id: format!("{}:{}", file.display(), block.line),
            digest: short_digest(&code),
            file: file.to_path_buf(),
            line: block.line,
            index,
            language,
            label: claim.label,
            label_source,
            expected_stage: match claim.label {
                Label::Broken => claim.stage,
                Label::Fixed => None,
            },
            code,
        });
    }

    (snippets, skipped)
}

fn short_digest(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..12].to_string()
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("markdown"))
}

/// Extracts snippets from every markdown file under `dir`, in sorted path order.
///
/// # Errors
///
/// Returns an error only if `dir` itself is missing or not a directory.
/// Unreadable files are recorded as skipped and the scan continues.
pub fn extract_directory(dir: &Path) -> Result<Extraction> {
    let metadata = std::fs::metadata(dir)
        .with_context(|| format!("Failed to read input directory {}", dir.display()))?;
    if !metadata.is_dir() {
        anyhow::bail!("Input path is not a directory: {}", dir.display());
    }

    let mut extraction = Extraction::default();

    let walker = WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Failed to walk {}: {}", dir.display(), e);
                let path = e.path().unwrap_or(dir);
                extraction.skipped.push(SkippedBlock {
                    file: path.strip_prefix(dir).unwrap_or(path).to_path_buf(),
                    line: 0,
                    language: None,
                    reason: SkipReason::Unreadable,
                });
                continue;
            }
        };

        if !entry.file_type().is_file() || !is_markdown(entry.path()) {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or(entry.path())
            .to_path_buf();
        extraction.files_scanned += 1;

        let content = match std::fs::read_to_string(entry.path()) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("Skipping unreadable file {}: {}", entry.path().display(), e);
                extraction.skipped.push(SkippedBlock {
                    file: relative,
                    line: 0,
                    language: None,
                    reason: SkipReason::Unreadable,
                });
                continue;
            }
        };

        log::debug!("Extracting snippets from {}", relative.display());
        let (snippets, skipped) = extract_snippets(&content, &relative);
        extraction.snippets.extend(snippets);
        extraction.skipped.extend(skipped);
    }

    Ok(extraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippets(markdown: &str) -> (Vec<Snippet>, Vec<SkippedBlock>) {
        extract_snippets(markdown, Path::new("tutorial.md"))
    }

    #[test]
    fn test_extract_simple_code_block() {
        let markdown = r#"
# Test

```c
int main() {
    return 0;
}
```
"#;

        let blocks = extract_code_blocks(markdown);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language, "c");
        assert_eq!(blocks[0].line, 4);
        assert_eq!(blocks[0].heading, "Test");
        assert!(blocks[0].flags.is_empty());
        assert!(blocks[0].code.contains("int main()"));
    }

    #[test]
    fn test_parse_fence_info() {
        let (lang, flags) = parse_fence_info("c");
        assert_eq!(lang, "c");
        assert!(flags.is_empty());

        let (lang, flags) = parse_fence_info("CPP,broken");
        assert_eq!(lang, "cpp");
        assert_eq!(flags, vec!["broken"]);

        let (lang, flags) = parse_fence_info("rust compile_fail, ignore");
        assert_eq!(lang, "rust");
        assert_eq!(flags, vec!["compile_fail", "ignore"]);

        let (lang, flags) = parse_fence_info("");
        assert!(lang.is_empty());
        assert!(flags.is_empty());
    }

    #[test]
    fn test_label_from_fence_flags() {
        let (snippets, skipped) = snippets(
            r#"
```cpp,compile_fail
int main() { return "x"; }
```

```cpp,fixed
int main() { return 0; }
```
"#,
        );
        assert!(skipped.is_empty());
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].label, Label::Broken);
        assert_eq!(snippets[0].expected_stage, Some(Stage::Compile));
        assert_eq!(snippets[0].label_source, LabelSource::FenceFlag);
        assert_eq!(snippets[1].label, Label::Fixed);
        assert_eq!(snippets[1].expected_stage, None);
    }

    #[test]
    fn test_label_from_filename_comment() {
        let (snippets, _) = snippets(
            r#"
```cpp
// broken_05.cpp - compile error
int main() { undefined(); }
```

```python
# fixed_05.py
print("ok")
```
"#,
        );
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].label, Label::Broken);
        assert_eq!(snippets[0].expected_stage, Some(Stage::Compile));
        assert_eq!(snippets[0].label_source, LabelSource::FilenameComment);
        assert_eq!(snippets[1].label, Label::Fixed);
    }

    #[test]
    fn test_language_inferred_from_filename_comment() {
        let (snippets, skipped) = snippets(
            r#"
```
// broken_02.java
public class Broken02 {}
```
"#,
        );
        assert!(skipped.is_empty());
        assert_eq!(snippets[0].language, "java");
    }

    #[test]
    fn test_label_from_prose() {
        let (snippets, _) = snippets(
            r#"
## Null dereference

The broken version crashes with a segmentation fault:

```c
int main() { int *p = 0; return *p; }
```

Here is the corrected code:

```c
int main() { return 0; }
```
"#,
        );
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].label, Label::Broken);
        assert_eq!(snippets[0].expected_stage, Some(Stage::Run));
        assert_eq!(snippets[0].label_source, LabelSource::Prose);
        assert_eq!(snippets[1].label, Label::Fixed);
    }

    #[test]
    fn test_ambiguous_prose_is_unlabeled() {
        let (snippets, skipped) = snippets(
            r#"
Compare the broken and the fixed approach:

```go
package main
```
"#,
        );
        assert!(snippets.is_empty());
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].reason, SkipReason::Unlabeled);
        assert_eq!(skipped[0].language.as_deref(), Some("go"));
    }

    #[test]
    fn test_untagged_block_is_skipped_and_counted() {
        let markdown = r#"
Broken example:

```
some output without a language
```
"#;
        let (snippets, skipped) = snippets(markdown);
        assert!(snippets.is_empty());
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].reason, SkipReason::Untagged);
        assert_eq!(skipped[0].line, 4);
    }

    #[test]
    fn test_ignore_flag() {
        let (snippets, skipped) = snippets("```c,ignore,broken\nThis is ignored\n```\n");
        assert!(snippets.is_empty());
        assert_eq!(skipped[0].reason, SkipReason::Ignored);
    }

    #[test]
    fn test_propagate_prepends_context() {
        let (snippets, _) = snippets(
            r#"
```c,propagate
typedef struct { int x; } Point;
```

```c,fixed
int main() { Point p = {1}; return p.x - 1; }
```
"#,
        );
        assert_eq!(snippets.len(), 1);
        assert!(snippets[0].code.contains("typedef struct"));
        assert!(snippets[0].code.contains("Point p"));
        assert_eq!(snippets[0].index, 1);
    }

    #[test]
    fn test_propagate_is_scoped_to_its_language() {
        let (snippets, _) = snippets(
            r#"
```cpp,propagate
#include <vector>
```

```python,fixed
print('ok')
```

```cpp,fixed
int main() { std::vector<int> v; return v.size(); }
```
"#,
        );
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].language, "python");
        assert_eq!(snippets[0].code, "print('ok')\n");
        assert!(snippets[1].code.starts_with("#include <vector>"));
    }

    #[test]
    fn test_negated_prose_flips_the_label() {
        assert_eq!(label_from_words("This code is not correct"), Some(Label::Broken));
        assert_eq!(label_from_words("Not working yet:"), Some(Label::Broken));
        assert_eq!(label_from_words("It isn't broken any more"), Some(Label::Fixed));
        assert_eq!(label_from_words("The correct version"), Some(Label::Fixed));
        assert_eq!(
            label_from_words("The broken one is not correct"),
            Some(Label::Broken)
        );
    }

    #[test]
    fn test_paragraph_labels_only_the_next_block() {
        let (snippets, skipped) = snippets(
            r#"
The broken version:

```c
int main() { return 1; }
```

```c
int main() { return 0; }
```
"#,
        );
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].label, Label::Broken);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].reason, SkipReason::Unlabeled);
    }

    #[test]
    fn test_heading_resets_paragraph_context() {
        let (snippets, _) = snippets(
            r#"
This paragraph is wrong.

## Fixed version

```sh
echo ok
```
"#,
        );
        assert_eq!(snippets[0].label, Label::Fixed);
    }

    #[test]
    fn test_filename_comment_parsing() {
        let comment = filename_comment("<!-- File: fixed.html -->\n<p></p>").unwrap();
        assert_eq!(comment.stem, "fixed");
        assert_eq!(comment.extension, "html");

        let comment = filename_comment("#!/bin/bash\n# broken_01.sh\nexit 1").unwrap();
        assert_eq!(comment.stem, "broken_01");

        assert!(filename_comment("int x = 1;").is_none());
        assert!(filename_comment("// just a comment").is_none());
    }

    #[test]
    fn test_snippet_identity() {
        let (snippets, _) = snippets("\n```sh,fixed\necho ok\n```\n");
        assert_eq!(snippets[0].id, "tutorial.md:2");
        assert_eq!(snippets[0].digest.len(), 12);
    }
}
