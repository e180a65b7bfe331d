//! Common test utilities for integration tests
//!
//! This module contains shared test fixtures and helper functions used across
//! integration tests. These utilities are not compiled into the library.

#![allow(dead_code)]

use anyhow::Result;
use snippet_verdict::{CheckConfig, Report, SnippetChecker};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Toolchains built on `sh` so the tests only need a POSIX shell.
///
/// `shc` stands in for a compiled language: `sh -n` parses the source
/// without running it, which gives a real compile stage. `ghost` points at a
/// program that does not exist.
pub const SHELL_TOOLCHAINS: &str = r#"
[run]
timeout_secs = 5
jobs = 4

[languages.shc]
compile = ["sh", "-n", "{src}"]
run = ["sh", "{src}"]
fence_markers = ["shc"]

[languages.ghost]
run = ["snippet-verdict-no-such-interpreter", "{src}"]
fence_markers = ["ghost"]
"#;

/// Isolated test fixture with automatic cleanup
///
/// Creates a temporary copy of a fixture directory, allowing tests to run
/// in parallel without interfering with each other.
pub struct TestFixture {
    _dir: TempDir,
    path: PathBuf,
}

impl TestFixture {
    /// Create a new test fixture from a directory under tests/fixtures
    pub fn new(name: &str) -> Result<Self> {
        let dir = TempDir::new()?;
        let path = dir.path().join(name);

        copy_dir_all(Path::new("tests/fixtures").join(name), &path)?;

        Ok(Self { _dir: dir, path })
    }

    /// Get the path to the copied markdown directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the shell toolchain config next to the fixture and returns its path
    pub fn write_config(&self) -> Result<PathBuf> {
        let config = self.path.with_file_name("snippets.toml");
        std::fs::write(&config, SHELL_TOOLCHAINS)?;
        Ok(config)
    }
}

/// Config with the shell toolchains and a custom run timeout.
pub fn shell_config(timeout_secs: u64) -> Result<CheckConfig> {
    let mut config = CheckConfig::from_toml_str(SHELL_TOOLCHAINS)?;
    config.run.timeout_secs = timeout_secs;
    Ok(config)
}

/// Runs the checker over a fixture with the shell toolchains.
pub async fn check_fixture(fixture: &TestFixture, timeout_secs: u64) -> Result<Report> {
    let checker = SnippetChecker::new(shell_config(timeout_secs)?);
    checker.run(fixture.path()).await
}

/// Recursively copy all files and directories from src to dst
fn copy_dir_all(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> Result<()> {
    std::fs::create_dir_all(&dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        if ty.is_dir() {
            copy_dir_all(entry.path(), dst.as_ref().join(entry.file_name()))?;
        } else {
            std::fs::copy(entry.path(), dst.as_ref().join(entry.file_name()))?;
        }
    }
    Ok(())
}
