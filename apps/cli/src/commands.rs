//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use siren_enrich_core::{ProgressReporter, RunRequest, RunSummary, run_enrichment};
use siren_enrich_input::InputFormat;
use siren_enrich_shared::{AppConfig, FetchConfig, Siren, init_config, load_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// siren-enrich — enrich company identifiers with public registry data.
#[derive(Parser)]
#[command(
    name = "siren-enrich",
    version,
    about = "Enrich a list of SIREN/SIRET identifiers with company data from public registry pages.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Input file format.
#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
pub(crate) enum FormatArg {
    #[default]
    Auto,
    Csv,
    Jsonl,
}

impl From<FormatArg> for InputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Auto => InputFormat::Auto,
            FormatArg::Csv => InputFormat::Csv,
            FormatArg::Jsonl => InputFormat::JsonLines,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Enrich every identifier in INPUT and write rows to OUTPUT.
    Run {
        /// Input file (CSV with a header row, or JSON lines).
        input: PathBuf,

        /// Output CSV file.
        output: PathBuf,

        /// Seconds each worker waits after every request (defaults to config).
        #[arg(long)]
        pace: Option<f64>,

        /// Number of concurrent workers (defaults to config).
        #[arg(short, long)]
        workers: Option<usize>,

        /// Skip identifiers already in OUTPUT and append to it.
        #[arg(long)]
        resume: bool,

        /// Input format.
        #[arg(long, value_enum, default_value = "auto")]
        format: FormatArg,

        /// Company page URL prefix (defaults to config).
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

/// Flags of the `run` subcommand that override config values.
#[derive(Debug, Default)]
pub(crate) struct RunOverrides {
    pub pace: Option<f64>,
    pub workers: Option<usize>,
    pub base_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "siren_enrich=info",
        1 => "siren_enrich=debug",
        _ => "siren_enrich=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            input,
            output,
            pace,
            workers,
            resume,
            format,
            base_url,
        } => {
            let overrides = RunOverrides {
                pace,
                workers,
                base_url,
            };
            cmd_run(&input, &output, format.into(), resume, overrides).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    input: &Path,
    output: &Path,
    format: InputFormat,
    resume: bool,
    overrides: RunOverrides,
) -> Result<()> {
    let config = load_config()?;
    let mut request = build_request(&config, input, output, overrides)?;
    request.format = format;
    request.resume = resume;

    info!(
        input = %input.display(),
        output = %output.display(),
        workers = request.workers,
        pace_ms = request.fetch.pace.as_millis() as u64,
        resume,
        "starting enrichment run"
    );

    let reporter = CliProgress::new();
    let summary = run_enrichment(&request, &reporter).await?;

    print_summary(&summary);
    Ok(())
}

/// Merge config file values with command-line overrides.
pub(crate) fn build_request(
    config: &AppConfig,
    input: &Path,
    output: &Path,
    overrides: RunOverrides,
) -> Result<RunRequest> {
    let mut fetch = FetchConfig::try_from(config)?;

    if let Some(base_url) = overrides.base_url.as_deref() {
        fetch = fetch.with_base_url(base_url)?;
    }
    if let Some(secs) = overrides.pace {
        let pace = Duration::try_from_secs_f64(secs)
            .map_err(|_| eyre!("invalid --pace '{secs}': expected a non-negative number of seconds"))?;
        fetch = fetch.with_pace(pace);
    }

    let workers = overrides
        .workers
        .unwrap_or(config.defaults.workers as usize);
    if workers == 0 {
        return Err(eyre!("--workers must be at least 1"));
    }

    Ok(RunRequest {
        workers,
        fetch,
        ..RunRequest::new(input, output)
    })
}

fn print_summary(summary: &RunSummary) {
    println!();
    if summary.nothing_to_do() {
        println!("  Nothing to do: {}", nothing_to_do_reason(summary));
        println!("  Rows read:  {}", summary.rows_read);
        println!("  Skipped:    {}", summary.skipped_completed);
        println!();
        return;
    }

    println!("  Enrichment finished.");
    println!("  Output:     {}", summary.output.display());
    println!("  Rows read:  {}", summary.rows_read);
    println!("  Unique:     {}", summary.unique_identifiers);
    println!("  Skipped:    {}", summary.skipped_completed);
    println!("  Written:    {}", summary.written);
    println!("  Not found:  {}", summary.not_found);
    println!("  Failed:     {}", summary.failures.len());
    println!("  Time:       {:.1}s", summary.elapsed.as_secs_f64());

    if !summary.failures.is_empty() {
        println!();
        println!("  Failed identifiers (retried by --resume):");
        for failure in &summary.failures {
            println!("    {}  {}", failure.siren, failure.error);
        }
    }
    println!();
}

fn nothing_to_do_reason(summary: &RunSummary) -> &'static str {
    if summary.unique_identifiers == 0 {
        "no valid identifier found in the input."
    } else {
        "every identifier is already enriched."
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter: a spinner while reading, a bar while fetching.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn targets_resolved(&self, total: usize, _skipped: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg} [{elapsed_precise}, eta {eta}]")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
    }

    fn identifier_done(&self, siren: &Siren, current: usize, _total: usize) {
        self.bar.set_position(current as u64);
        self.bar.set_message(siren.to_string());
    }

    fn done(&self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
    }
}
