use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use snippet_verdict::{
    approval, exit_codes, print_statistics, render, report_approval_error, report_mismatches,
    CheckConfig, LanguageRegistry, ReportFormat, SnippetChecker,
};
use std::path::{Path, PathBuf};
use std::process::exit;

/// Check that the broken/fixed code snippets of markdown tutorials behave as claimed.
#[derive(Debug, Parser)]
#[command(name = "snippet-verdict", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Extract, run and classify every snippet in a directory of markdown files
    Check(CheckArgs),

    /// Approve a config file so its toolchain commands may run
    Allow {
        /// Path to the config file
        config: PathBuf,
    },

    /// Revoke approval for a config file
    Deny {
        /// Path to the config file
        config: PathBuf,
    },

    /// List approved config files
    ListAllowed,

    /// Show the toolchains that would be used
    Languages {
        /// Optional config file layered over the built-in toolchains
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Directory of markdown files to scan (recursively)
    dir: PathBuf,

    /// Only check these languages (toolchain names or fence tags, comma separated)
    #[arg(long = "lang", value_delimiter = ',')]
    languages: Vec<String>,

    /// Per-snippet timeout in seconds for each toolchain invocation
    #[arg(long)]
    timeout: Option<u64>,

    /// Separate timeout in seconds for the compile stage
    #[arg(long)]
    compile_timeout: Option<u64>,

    /// Number of snippets to run in parallel
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// Report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Table)]
    format: ReportFormat,

    /// Write the report to a file instead of stdout
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// TOML config file with toolchains and limits
    #[arg(long)]
    config: Option<PathBuf>,

    /// Treat stderr output from fixed snippets as a failure
    #[arg(long)]
    strict_stderr: bool,
}

pub fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_codes::TOOLING_ERROR
        }
    };

    exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Check(args) => handle_check(args),
        Command::Allow { config } => {
            approval::approve(&config)?;
            eprintln!("Approved {}", config.display());
            Ok(exit_codes::OK)
        }
        Command::Deny { config } => {
            approval::deny(&config)?;
            eprintln!("Revoked approval for {}", config.display());
            Ok(exit_codes::OK)
        }
        Command::ListAllowed => {
            for path in approval::list_approved()? {
                println!("{}", path);
            }
            Ok(exit_codes::OK)
        }
        Command::Languages { config } => {
            let config = load_config(config.as_deref())?;
            print_languages(&LanguageRegistry::from_config(&config));
            Ok(exit_codes::OK)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<CheckConfig> {
    match path {
        Some(path) => CheckConfig::from_file(path),
        None => Ok(CheckConfig::default()),
    }
}

fn handle_check(args: CheckArgs) -> Result<i32> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(path) = &args.config {
        if config.defines_commands() && !approval::is_approved(path)? {
            report_approval_error(path);
            anyhow::bail!("config not approved");
        }
    }

    if let Some(timeout) = args.timeout {
        anyhow::ensure!(timeout > 0, "--timeout must be greater than zero");
        config.run.timeout_secs = timeout;
    }
    if let Some(timeout) = args.compile_timeout {
        anyhow::ensure!(timeout > 0, "--compile-timeout must be greater than zero");
        config.run.compile_timeout_secs = Some(timeout);
    }
    if let Some(jobs) = args.jobs {
        config.run.jobs = Some(jobs);
    }
    if args.strict_stderr {
        config.run.strict_stderr = true;
    }

    let checker = SnippetChecker::new(config).with_languages(&args.languages);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let report = runtime.block_on(async {
        let cancel = checker.cancel_handle();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupted, letting running snippets finish");
                cancel.cancel();
            }
        });

        let report = checker.run(&args.dir).await;
        ctrl_c.abort();
        report
    })?;

    let rendered = render(&report, args.format)?;
    match &args.output {
        Some(path) => std::fs::write(path, &rendered)
            .with_context(|| format!("Failed to write report to {}", path.display()))?,
        None => print!("{}", rendered),
    }

    report_mismatches(&report);
    print_statistics(&report);

    Ok(report.exit_code())
}

fn print_languages(registry: &LanguageRegistry) {
    for (name, config) in registry.languages() {
        let status = if config.enabled { "" } else { " (disabled)" };
        println!("{}{}", name, status);
        println!("  fences:  {}", config.fence_markers.join(", "));
        if let Some(compile) = &config.compile {
            println!("  compile: {}", compile.join(" "));
        }
        println!("  run:     {}", config.run.join(" "));
    }
}
