//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use rulefeed_core::converter::SingBox;
use rulefeed_core::filter::merge_filter_files;
use rulefeed_core::merge::merge_rule_files;
use rulefeed_core::pipeline::{ProgressReporter, RunConfig, RunResult};
use rulefeed_core::publisher::{GitPublisher, NoPublish, Publisher};
use rulefeed_shared::{
    AppConfig, Category, init_config, load_config, load_config_from, validate_config,
};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// rulefeed — aggregate rule feeds into compiled sing-box rule sets.
#[derive(Parser)]
#[command(
    name = "rulefeed",
    version,
    about = "Aggregate ad-block lists and geosite/geoip feeds into compiled sing-box rule sets.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.rulefeed/rulefeed.toml).
    #[arg(short, long, global = true, env = "RULEFEED_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Regenerate every artifact and commit the result.
    Run {
        /// Output directory (overrides `output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Skip the git commit.
        #[arg(long)]
        no_commit: bool,

        /// sing-box executable (overrides `converter.binary`).
        #[arg(long)]
        sing_box: Option<String>,
    },

    /// Merge JSON rule documents into one.
    Merge {
        /// Input rule documents.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output JSON file.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Merge local ad-block lists into one sorted, deduplicated list.
    Filter {
        /// Input text lists.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output text file.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List configured feeds by category.
    Sources,

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

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = ["rulefeed_cli", "rulefeed_core", "rulefeed_fetch", "rulefeed_shared"]
        .map(|target| format!("{target}={level}"))
        .join(",");

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run {
            out,
            no_commit,
            sing_box,
        } => cmd_run(config_path, out, no_commit, sing_box).await,
        Command::Merge { inputs, output } => cmd_merge(&inputs, &output),
        Command::Filter { inputs, output } => cmd_filter(&inputs, &output),
        Command::Sources => cmd_sources(config_path),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

/// Load the config from `--config` if given, else the default location.
fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    config_path: Option<&Path>,
    out: Option<PathBuf>,
    no_commit: bool,
    sing_box: Option<String>,
) -> Result<()> {
    let mut config = resolve_config(config_path)?;

    if let Some(out) = out {
        config.output_dir = out.to_string_lossy().into_owned();
    }
    if let Some(binary) = sing_box {
        config.converter.binary = binary;
    }
    if no_commit {
        config.publish.enabled = false;
    }

    validate_config(&config)?;

    let run_config = RunConfig::from(&config);
    let converter = SingBox::new(&config.converter.binary);

    let cwd = std::env::current_dir()
        .map_err(|e| eyre!("cannot determine working directory: {e}"))?;
    let publisher: Box<dyn Publisher> = if config.publish.enabled {
        Box::new(GitPublisher::new(cwd, config.publish.message.clone()))
    } else {
        Box::new(NoPublish)
    };

    info!(
        output_dir = %config.output_dir,
        adblock_lists = config.adblock_urls.len(),
        sources = config.sources.len(),
        converter = %config.converter.binary,
        commit = config.publish.enabled,
        "starting run"
    );

    let reporter = CliProgress::new()?;
    let result =
        rulefeed_core::pipeline::run(&run_config, &converter, publisher.as_ref(), &reporter)
            .await?;

    println!();
    println!("  Rule sets regenerated!");
    println!("  Ad-block rules: {}", result.adblock_rules);
    println!("  Sources:        {}", result.sources_processed);
    println!(
        "  Committed:      {}",
        if result.committed { "yes" } else { "no" }
    );
    println!("  Time:           {:.1}s", result.elapsed.as_secs_f64());
    println!();
    for artifact in &result.artifacts {
        println!(
            "  {:<28} {:>10} bytes  {}",
            artifact.filename,
            artifact.size_bytes,
            &artifact.sha256[..12]
        );
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Result<Self> {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")?
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Ok(Self { spinner })
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn source_processed(&self, name: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Decompiled [{current}/{total}] {name}"));
    }

    fn done(&self, _result: &RunResult) {
        self.spinner.finish_and_clear();
    }
}

fn cmd_merge(inputs: &[PathBuf], output: &Path) -> Result<()> {
    let merged = merge_rule_files(inputs, output)?;

    let rule = merged.rules.first();
    println!(
        "Merged {} document(s) into {} (version {}, {} field(s))",
        inputs.len(),
        output.display(),
        merged.version.unwrap_or_default(),
        rule.map_or(0, |r| r.len())
    );
    Ok(())
}

fn cmd_filter(inputs: &[PathBuf], output: &Path) -> Result<()> {
    let count = merge_filter_files(inputs, output)?;
    println!(
        "Merged {} list(s) into {} ({count} rules)",
        inputs.len(),
        output.display()
    );
    Ok(())
}

fn cmd_sources(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;

    println!("adblock");
    for url in &config.adblock_urls {
        println!("  {url}");
    }

    for category in Category::ALL {
        println!();
        println!("{category} -> {}", category.artifact_name());
        for source in config.sources_for(category) {
            println!("  {:<28} {}", source.name, source.url);
        }
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
