use crate::config::{CheckConfig, LanguageConfig};
use crate::process::{run_command_with_timeout, CommandOutput};
use anyhow::{Context, Result};
use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Languages that ship with a working toolchain definition.
pub const BUILTIN_LANGUAGES: &[&str] = &[
    "bash",
    "c",
    "cpp",
    "csharp",
    "go",
    "java",
    "javascript",
    "php",
    "python",
    "ruby",
    "rust",
    "shell",
    "sql",
    "typescript",
];

/// Metadata for a programming language including fence markers and file extension.
///
/// Uses `Cow<'static, str>` for the file extension to avoid allocations for known
/// languages while supporting dynamic extensions for custom languages.
#[derive(Debug, Clone)]
pub struct LanguageMetadata {
    pub fence_markers: Vec<String>,
    pub file_extension: Cow<'static, str>,
}

/// Get language metadata (fence markers and file extension) for a language.
///
/// Fence markers are the canonical name plus the aliases highlight.js
/// recognizes. Unknown languages use their own name as the only marker and
/// as the extension.
///
/// # Examples
///
/// ```
/// use snippet_verdict::get_language_metadata;
///
/// let metadata = get_language_metadata("cpp");
/// assert!(metadata.fence_markers.contains(&"c++".to_string()));
/// assert_eq!(metadata.file_extension, ".cpp");
///
/// let metadata = get_language_metadata("brainfuck-ng");
/// assert_eq!(metadata.file_extension, ".brainfuck-ng");
/// ```
pub fn get_language_metadata(lang_name: &str) -> LanguageMetadata {
    let (markers, ext) = match lang_name {
        "bash" => (vec!["bash", "sh", "zsh"], ".sh"),
        "c" => (vec!["c", "h"], ".c"),
        "cpp" => (
            vec!["cpp", "hpp", "cc", "hh", "c++", "h++", "cxx", "hxx"],
            ".cpp",
        ),
        "csharp" => (vec!["csharp", "cs", "c#"], ".cs"),
        "css" => (vec!["css"], ".css"),
        "dockerfile" => (vec!["dockerfile", "docker"], ".dockerfile"),
        "go" => (vec!["go", "golang"], ".go"),
        "haskell" => (vec!["haskell", "hs"], ".hs"),
        "html" => (vec!["html", "xhtml"], ".html"),
        "java" => (vec!["java"], ".java"),
        "javascript" => (vec!["javascript", "js", "jsx", "node"], ".js"),
        "json" => (vec!["json", "jsonc", "json5"], ".json"),
        "kotlin" => (vec!["kotlin", "kt"], ".kt"),
        "lua" => (vec!["lua"], ".lua"),
        "perl" => (vec!["perl", "pl", "pm"], ".pl"),
        "php" => (vec!["php"], ".php"),
        "plaintext" => (vec!["plaintext", "txt", "text"], ".txt"),
        "powershell" => (vec!["powershell", "ps", "ps1"], ".ps1"),
        "python" => (vec!["python", "py", "python3"], ".py"),
        "ruby" => (vec!["ruby", "rb"], ".rb"),
        "rust" => (vec!["rust", "rs"], ".rs"),
        "scala" => (vec!["scala"], ".scala"),
        "shell" => (vec!["shell"], ".sh"),
        "sql" => (vec!["sql", "sqlite"], ".sql"),
        "swift" => (vec!["swift"], ".swift"),
        "toml" => (vec!["toml"], ".toml"),
        "typescript" => (vec!["typescript", "ts", "mts", "cts"], ".ts"),
        "xml" => (vec!["xml", "svg"], ".xml"),
        "yaml" => (vec!["yaml", "yml"], ".yaml"),

        // Default: use the language name itself
        _ => {
            return LanguageMetadata {
                fence_markers: vec![lang_name.to_string()],
                file_extension: Cow::Owned(format!(".{}", lang_name)),
            }
        }
    };

    LanguageMetadata {
        fence_markers: markers.iter().map(|s| s.to_string()).collect(),
        file_extension: Cow::Borrowed(ext),
    }
}

/// Maps a file extension (without the dot) from a filename comment such as
/// `// broken_05.cpp` to the fence marker of its language.
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    let lang = match ext.to_ascii_lowercase().as_str() {
        "sh" | "bash" => "bash",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" => "cpp",
        "cs" => "csharp",
        "go" => "go",
        "java" => "java",
        "js" | "mjs" | "cjs" => "javascript",
        "kt" => "kotlin",
        "php" => "php",
        "py" => "python",
        "rb" => "ruby",
        "rs" => "rust",
        "sql" => "sql",
        "ts" => "typescript",
        _ => return None,
    };
    Some(lang)
}

/// Built-in toolchain for a language, if one ships with the tool.
pub fn builtin_toolchain(lang_name: &str) -> Option<LanguageConfig> {
    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    let (compile, run) = match lang_name {
        "bash" => (None, argv(&["bash", "{src}"])),
        "c" => (Some(argv(&["cc", "-o", "{out}", "{src}"])), argv(&["{out}"])),
        "cpp" => (
            Some(argv(&["c++", "-std=c++17", "-o", "{out}", "{src}"])),
            argv(&["{out}"]),
        ),
        "csharp" => (
            Some(argv(&["mcs", "-out:{out}.exe", "{src}"])),
            argv(&["mono", "{out}.exe"]),
        ),
        "go" => (Some(argv(&["go", "build", "-o", "{out}", "{src}"])), argv(&["{out}"])),
        "java" => (
            Some(argv(&["javac", "-d", "{dir}", "{src}"])),
            argv(&["java", "-cp", "{dir}", "{class}"]),
        ),
        "javascript" => (None, argv(&["node", "{src}"])),
        "php" => (None, argv(&["php", "{src}"])),
        "python" => (None, argv(&["python3", "{src}"])),
        "ruby" => (None, argv(&["ruby", "{src}"])),
        "rust" => (
            Some(argv(&["rustc", "--edition", "2021", "-o", "{out}", "{src}"])),
            argv(&["{out}"]),
        ),
        "shell" => (None, argv(&["sh", "{src}"])),
        "sql" => (None, argv(&["sqlite3", "-bail", ":memory:", ".read {src}"])),
        "typescript" => (
            Some(argv(&["tsc", "--strict", "--outDir", "{dir}", "{src}"])),
            argv(&["node", "{dir}/{stem}.js"]),
        ),
        _ => return None,
    };

    Some(LanguageConfig {
        enabled: true,
        compile,
        run,
        preamble: None,
        fence_markers: Vec::new(),
    })
}

/// Finds the name of the first public top-level type in Java source, which
/// `javac` requires to match the file name.
pub fn java_public_class(code: &str) -> Option<String> {
    for line in code.lines() {
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some("public") {
            continue;
        }
        while let Some(token) = tokens.next() {
            match token {
                "final" | "abstract" | "static" | "sealed" | "strictfp" => continue,
                "class" | "interface" | "enum" | "record" => {
                    let name: String = tokens
                        .next()?
                        .chars()
                        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
                        .collect();
                    return (!name.is_empty()).then_some(name);
                }
                _ => break,
            }
        }
    }
    None
}

/// Finds the type that declares `static void main`, public or not.
///
/// Tutorials often write `class Demo { public static void main(..) }`
/// without `public`; `java` has to be launched with that class name.
pub fn java_main_class(code: &str) -> Option<String> {
    let tokens: Vec<&str> = code
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .filter(|t| !t.is_empty())
        .collect();

    let mut enclosing: Option<&str> = None;
    for (i, token) in tokens.iter().enumerate() {
        match *token {
            "class" | "interface" | "enum" | "record" => {
                if let Some(name) = tokens.get(i + 1) {
                    enclosing = Some(*name);
                }
            }
            "main" if i >= 2 && tokens[i - 1] == "void" => {
                if tokens[i.saturating_sub(4)..i - 1].contains(&"static") {
                    return enclosing.map(str::to_string);
                }
            }
            _ => {}
        }
    }
    None
}

/// Paths and names substituted into toolchain command templates.
#[derive(Debug, Clone)]
pub struct Placeholders {
    /// Source file written for the snippet
    pub src: PathBuf,
    /// Isolated working directory for the snippet
    pub dir: PathBuf,
    /// Artifact path for compiled languages
    pub out: PathBuf,
    /// Source file stem
    pub stem: String,
    /// Java class name (the stem for every other language)
    pub class: String,
}

impl Placeholders {
    fn expand(&self, arg: &str) -> String {
        arg.replace("{src}", &self.src.to_string_lossy())
            .replace("{dir}", &self.dir.to_string_lossy())
            .replace("{out}", &self.out.to_string_lossy())
            .replace("{stem}", &self.stem)
            .replace("{class}", &self.class)
    }
}

/// A language implementation resolved from built-ins and configuration.
///
/// All toolchain behavior comes from a [`LanguageConfig`]:
/// - Optional compile command (absent for interpreted languages)
/// - Run command
/// - Optional preamble (prepended to all snippets)
/// - Fence markers (which markdown fences map to this language)
#[derive(Debug, Clone)]
pub struct ConfiguredLanguage {
    name: String,
    config: LanguageConfig,
    file_extension: String,
}

impl fmt::Display for ConfiguredLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl ConfiguredLanguage {
    pub fn new(name: String, config: LanguageConfig) -> Self {
        let file_extension = get_language_metadata(&name).file_extension.into_owned();

        Self {
            name,
            config,
            file_extension,
        }
    }

    /// Returns the name of this language (e.g., "cpp", "python").
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the file extension for this language (e.g., ".c", ".ts").
    pub fn file_extension(&self) -> &str {
        &self.file_extension
    }

    pub fn config(&self) -> &LanguageConfig {
        &self.config
    }

    /// Whether snippets go through a separate compile stage.
    pub fn is_compiled(&self) -> bool {
        self.config.compile.is_some()
    }

    /// Lays out the paths for a snippet inside `dir`.
    ///
    /// Java sources are named after their public class and launched through
    /// the class that declares `main`; everything else is written as
    /// `snippet<ext>`.
    pub fn placeholders(&self, code: &str, dir: &Path) -> Placeholders {
        let (stem, class) = if self.name == "java" {
            let public = java_public_class(code);
            let main = java_main_class(code);
            let stem = public
                .clone()
                .or_else(|| main.clone())
                .unwrap_or_else(|| "Main".to_string());
            let class = main.or(public).unwrap_or_else(|| stem.clone());
            (stem, class)
        } else {
            ("snippet".to_string(), "snippet".to_string())
        };

        Placeholders {
            src: dir.join(format!("{}{}", stem, self.file_extension)),
            dir: dir.to_path_buf(),
            out: dir.join(format!("{}.out", stem)),
            class,
            stem,
        }
    }

    /// Writes source code with optional preamble to the snippet's source file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub async fn write_source_file(&self, code: &str, path: &Path) -> Result<()> {
        let mut file = File::create(path)
            .await
            .with_context(|| format!("Failed to create source file: {}", path.display()))?;

        if let Some(ref preamble) = self.config.preamble {
            file.write_all(preamble.as_bytes()).await?;
            file.write_all(b"\n\n").await?;
        }

        file.write_all(code.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    /// Runs the compile command, if this language has one.
    ///
    /// Returns `Ok(None)` for interpreted languages. A compiler that exits
    /// non-zero is an `Ok` output, not an error; errors mean the toolchain
    /// could not be invoked at all.
    pub async fn compile(
        &self,
        paths: &Placeholders,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Result<Option<CommandOutput>> {
        let Some(template) = self.config.compile.as_deref() else {
            return Ok(None);
        };

        log::debug!("Compiling {} snippet {}", self, paths.src.display());
        let command = self.command(template, paths)?;
        let output = run_command_with_timeout(command, timeout, output_limit_bytes)
            .await
            .with_context(|| {
                format!(
                    "Failed to execute compiler '{}' for language '{}'",
                    template[0], self
                )
            })?;

        Ok(Some(output))
    }

    /// Runs the snippet: the interpreter for interpreted languages, the
    /// compiled artifact otherwise.
    pub async fn run(
        &self,
        paths: &Placeholders,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Result<CommandOutput> {
        log::debug!("Running {} snippet {}", self, paths.src.display());
        let command = self.command(&self.config.run, paths)?;
        run_command_with_timeout(command, timeout, output_limit_bytes)
            .await
            .with_context(|| {
                format!(
                    "Failed to execute '{}' for language '{}'",
                    self.config.run.first().map(String::as_str).unwrap_or_default(),
                    self
                )
            })
    }

    fn command(&self, template: &[String], paths: &Placeholders) -> Result<Command> {
        let (program, args) = template
            .split_first()
            .with_context(|| format!("Empty command template for language '{}'", self))?;

        let mut command = Command::new(paths.expand(program));
        command
            .args(args.iter().map(|arg| paths.expand(arg)))
            .current_dir(&paths.dir);
        Ok(command)
    }
}

/// Registry of available languages for snippet execution.
///
/// Built-in toolchains are overlaid with the configuration: entries that
/// carry their own commands replace a built-in, the others only adjust it.
///
/// # Example
///
/// ```ignore
/// let registry = LanguageRegistry::from_config(&config);
///
/// if let Some(lang) = registry.find_by_fence("c++") {
///     assert_eq!(lang.name(), "cpp");
/// }
/// ```
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    languages: Vec<(String, LanguageConfig)>,
}

impl LanguageRegistry {
    /// Creates a new language registry from configuration.
    pub fn from_config(config: &CheckConfig) -> Self {
        let mut names: Vec<String> = BUILTIN_LANGUAGES.iter().map(|s| s.to_string()).collect();
        for name in config.languages().keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names.sort();

        let languages = names
            .into_iter()
            .filter_map(|name| {
                let resolved = resolve_language(&name, config.languages().get(&name))?;
                Some((name, resolved))
            })
            .collect();

        Self { languages }
    }

    /// Finds an enabled language by a fence marker (case-insensitive).
    ///
    /// # Returns
    ///
    /// * `Some(ConfiguredLanguage)` if a language with this fence marker exists
    /// * `None` if no enabled language is configured for this fence marker
    pub fn find_by_fence(&self, fence: &str) -> Option<ConfiguredLanguage> {
        let fence = fence.to_ascii_lowercase();
        self.languages
            .iter()
            .filter(|(_, config)| config.enabled)
            .find(|(_, config)| config.fence_markers.iter().any(|m| *m == fence))
            .map(|(name, config)| ConfiguredLanguage::new(name.clone(), config.clone()))
    }

    /// All resolved languages, enabled or not, sorted by name.
    pub fn languages(&self) -> impl Iterator<Item = (&str, &LanguageConfig)> {
        self.languages.iter().map(|(name, config)| (name.as_str(), config))
    }
}

fn resolve_language(name: &str, configured: Option<&LanguageConfig>) -> Option<LanguageConfig> {
    let builtin = builtin_toolchain(name);

    let mut resolved = match (builtin, configured) {
        (_, Some(config)) if config.defines_commands() => config.clone(),
        (Some(mut builtin), Some(config)) => {
            builtin.enabled = config.enabled;
            builtin.preamble = config.preamble.clone();
            builtin.fence_markers = config.fence_markers.clone();
            builtin
        }
        (Some(builtin), None) => builtin,
        (None, Some(_)) => {
            log::warn!(
                "Language '{}' has no built-in toolchain and defines no run command, ignoring",
                name
            );
            return None;
        }
        (None, None) => return None,
    };

    if resolved.fence_markers.is_empty() {
        resolved.fence_markers = get_language_metadata(name).fence_markers;
    }
    for marker in resolved.fence_markers.iter_mut() {
        *marker = marker.to_ascii_lowercase();
    }

    Some(resolved)
}
