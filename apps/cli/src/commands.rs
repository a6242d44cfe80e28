//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use sowscribe_core::{
    AssistantSession, Console, HarvestProgress, HarvestReport, PageOutcome, Summarizer,
};
use sowscribe_openai::OpenAiClient;
use sowscribe_shared::{
    AppConfig, AssistantConfig, HarvestConfig, OpenAiConfig, WikiConfig, config_file_path,
    init_config, load_config,
};
use sowscribe_wiki::WikiClient;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SowScribe: harvest contract pages from the wiki and chat with them.
#[derive(Parser)]
#[command(
    name = "sowscribe",
    version,
    about = "Summarize wiki contract pages into files and chat with an assistant over them.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
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

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Summarize every child page of a wiki page into one file per page.
    Harvest {
        /// Root page id (overrides `[harvest].parent_page_id`).
        #[arg(long)]
        parent: Option<String>,

        /// Output directory (overrides `[harvest].output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Maximum number of child pages to process.
        #[arg(long)]
        max_pages: Option<usize>,

        /// Wiki base URL (overrides `[wiki].base_url`).
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Chat with an assistant over the harvested files.
    Chat {
        /// Existing assistant id; an empty value creates a new assistant.
        #[arg(long)]
        assistant: Option<String>,

        /// Existing thread id; an empty value creates a new thread.
        #[arg(long)]
        thread: Option<String>,

        /// Directory uploaded to a new vector store (overrides `[assistant].source_dir`).
        #[arg(long)]
        source_dir: Option<PathBuf>,
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

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so they never mix
/// with the chat transcript.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "sowscribe=info",
        1 => "sowscribe=debug",
        _ => "sowscribe=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
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
        Command::Harvest {
            parent,
            out,
            max_pages,
            base_url,
        } => cmd_harvest(parent, out, max_pages, base_url).await,
        Command::Chat {
            assistant,
            thread,
            source_dir,
        } => cmd_chat(assistant, thread, source_dir).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

async fn cmd_harvest(
    parent: Option<String>,
    out: Option<PathBuf>,
    max_pages: Option<usize>,
    base_url: Option<String>,
) -> Result<()> {
    let mut app = load_config()?;
    if let Some(base_url) = base_url {
        app.wiki.base_url = base_url;
    }

    let mut harvest_config = HarvestConfig::from(&app);
    if let Some(parent) = parent {
        harvest_config.parent_page_id = parent;
    }
    if let Some(out) = out {
        harvest_config.output_dir = out;
    }
    if let Some(max_pages) = max_pages {
        harvest_config.max_pages = max_pages;
    }

    let wiki = WikiClient::new(WikiConfig::from_app(&app)?)?;
    let summarizer = Summarizer::new(OpenAiClient::new(OpenAiConfig::from_app(&app)?)?);

    info!(
        parent = %harvest_config.parent_page_id,
        out = %harvest_config.output_dir.display(),
        max_pages = harvest_config.max_pages,
        "harvesting wiki pages"
    );

    let reporter = CliProgress::new();
    let result = sowscribe_core::harvest(&harvest_config, &wiki, &summarizer, &reporter).await;
    reporter.finish();
    let report = result.wrap_err("harvest aborted")?;

    print_report(&report, &harvest_config);
    Ok(())
}

fn print_report(report: &HarvestReport, config: &HarvestConfig) {
    println!();
    println!("  Harvest finished.");
    println!("  Pages listed:     {}", report.pages_listed);
    println!("  Files written:    {}", report.written);
    println!("  Already present:  {}", report.skipped_existing);
    println!("  Empty summaries:  {}", report.summaries_failed);
    println!("  Output:           {}", config.output_dir.display());
    println!("  Time:             {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

async fn cmd_chat(
    assistant: Option<String>,
    thread: Option<String>,
    source_dir: Option<PathBuf>,
) -> Result<()> {
    let app = load_config()?;
    let mut assistant_config = AssistantConfig::from(&app);
    if let Some(source_dir) = source_dir {
        assistant_config.source_dir = source_dir;
    }

    let client = OpenAiClient::new(OpenAiConfig::from_app(&app)?)?;
    let mut session = AssistantSession::new(client, assistant_config, Console::stdio());
    session.run_chat(assistant, thread).await?;
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
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl HarvestProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn page_started(&self, title: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Summarizing [{current}/{total}] {title}"));
    }

    fn page_finished(&self, title: &str, outcome: PageOutcome) {
        match outcome {
            PageOutcome::Written => {}
            PageOutcome::SkippedExisting => {
                self.spinner.println(format!("  skipped  {title} (already harvested)"));
            }
            PageOutcome::SummaryFailed => {
                self.spinner.println(format!("  empty    {title} (summary failed)"));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let path = config_file_path()?;
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("# {}", path.display());
    println!("{toml_str}");
    Ok(())
}
