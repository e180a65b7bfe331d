use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Default wall-clock budget for a single toolchain invocation.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default cap on captured bytes per output stream.
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 64 * 1024;

/// Configuration for a snippet-verdict run.
///
/// Loaded from an optional TOML file passed with `--config`. Every field has a
/// default, so an empty file (or no file at all) is a valid configuration that
/// relies on the built-in toolchains.
///
/// # Example
///
/// ```toml
/// [run]
/// timeout_secs = 10
/// jobs = 4
///
/// [languages.cpp]
/// compile = ["g++", "-std=c++17", "{src}", "-o", "{out}"]
/// run = ["{out}"]
/// fence_markers = ["cpp", "c++"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CheckConfig {
    /// Execution limits and pool settings
    pub run: RunConfig,

    /// Language-specific configurations indexed by language name
    pub languages: HashMap<String, LanguageConfig>,
}

/// Execution limits shared by every snippet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Per-invocation timeout for the run stage (and the compile stage unless overridden)
    pub timeout_secs: u64,

    /// Optional separate timeout for the compile stage
    pub compile_timeout_secs: Option<u64>,

    /// Worker pool width; defaults to the number of CPUs
    pub jobs: Option<usize>,

    /// Treat run-stage stderr output from fixed snippets as a failure
    pub strict_stderr: bool,

    /// Maximum bytes captured per output stream
    pub output_limit_bytes: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            compile_timeout_secs: None,
            jobs: None,
            strict_stderr: false,
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
        }
    }
}

impl RunConfig {
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs.unwrap_or(self.timeout_secs))
    }

    pub fn jobs(&self) -> usize {
        self.jobs.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// Toolchain configuration for a specific language.
///
/// Commands are argument vectors, never shell strings. Each element may use
/// the placeholders `{src}`, `{dir}`, `{out}`, `{stem}` and `{class}`, and
/// `${VAR}` environment variable expansion.
///
/// An entry with a non-empty `run` command replaces the built-in toolchain of
/// the same name entirely. An entry without one only adjusts the built-in
/// (`enabled`, `preamble`, `fence_markers`).
///
/// # Security
///
/// Program paths are validated to prevent command injection. Paths cannot
/// contain shell metacharacters or use parent directory traversal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LanguageConfig {
    /// Whether this language is enabled for checking
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Compile command; absent for interpreted languages
    #[serde(default)]
    pub compile: Option<Vec<String>>,

    /// Run command (interpreter invocation or the compiled artifact)
    #[serde(default)]
    pub run: Vec<String>,

    /// Optional preamble to prepend to all snippets
    #[serde(default)]
    pub preamble: Option<String>,

    /// Fence markers that identify this language in markdown; empty means
    /// the built-in markers for the language name
    #[serde(default)]
    pub fence_markers: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl LanguageConfig {
    /// Whether this entry carries its own toolchain commands.
    pub fn defines_commands(&self) -> bool {
        !self.run.is_empty() || self.compile.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Validate the configuration for security and correctness
    pub fn validate(&self) -> Result<()> {
        if self.run.is_empty() {
            anyhow::bail!("Run command cannot be empty");
        }

        validate_command(&self.run).context("Invalid run command")?;

        if let Some(compile) = &self.compile {
            if compile.is_empty() {
                anyhow::bail!("Compile command cannot be empty when present");
            }
            validate_command(compile).context("Invalid compile command")?;
        }

        Ok(())
    }

    fn expand_env(&mut self) {
        for arg in self.run.iter_mut() {
            *arg = expand_env_vars(arg);
        }
        if let Some(compile) = self.compile.as_mut() {
            for arg in compile.iter_mut() {
                *arg = expand_env_vars(arg);
            }
        }
    }
}

fn validate_command(command: &[String]) -> Result<()> {
    let program = command.first().map(String::as_str).unwrap_or_default();

    if program.is_empty() {
        anyhow::bail!("Program path cannot be empty");
    }

    // Ensure program path doesn't contain shell metacharacters
    let dangerous_chars = [';', '|', '&', '`', '\n', '\r'];
    for ch in dangerous_chars {
        if program.contains(ch) {
            anyhow::bail!(
                "Program path contains invalid character '{}': {}",
                ch.escape_default(),
                program
            );
        }
    }

    let program_path = Path::new(program);
    for component in program_path.components() {
        if matches!(component, std::path::Component::ParentDir) {
            anyhow::bail!("Program path cannot contain '..': {}", program);
        }
    }

    Ok(())
}

impl CheckConfig {
    /// Load configuration from a TOML file and expand environment variables.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse configuration from TOML text, expand environment variables and
    /// validate every language that defines its own commands.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: CheckConfig = toml::from_str(content).context("Failed to parse TOML")?;

        for (name, lang_config) in config.languages.iter_mut() {
            lang_config.expand_env();

            if lang_config.defines_commands() {
                lang_config
                    .validate()
                    .with_context(|| format!("Invalid configuration for language '{}'", name))?;
            }
        }

        if config.run.timeout_secs == 0 {
            anyhow::bail!("run.timeout_secs must be greater than zero");
        }

        Ok(config)
    }

    /// Whether any language entry supplies toolchain commands, which means
    /// the file must be approved before it is used.
    pub fn defines_commands(&self) -> bool {
        self.languages.values().any(LanguageConfig::defines_commands)
    }

    /// Get all configured languages
    pub fn languages(&self) -> &HashMap<String, LanguageConfig> {
        &self.languages
    }
}

/// Expand environment variables in a string
/// Supports ${VAR_NAME} syntax
/// This function processes the string in a single pass to avoid re-processing expanded values
fn expand_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'

            let mut var_name = String::new();
            let mut found_close = false;

            for ch in chars.by_ref() {
                if ch == '}' {
                    found_close = true;
                    break;
                }
                var_name.push(ch);
            }

            if found_close {
                match env::var(&var_name) {
                    Ok(value) => result.push_str(&value),
                    Err(_) => {
                        log::warn!(
                            "Environment variable '{}' not found, leaving unexpanded",
                            var_name
                        );
                        result.push_str("${");
                        result.push_str(&var_name);
                        result.push('}');
                    }
                }
            } else {
                // No closing brace found, treat as literal
                result.push_str("${");
                result.push_str(&var_name);
            }
        } else {
            result.push(ch);
        }
    }

    result
}
