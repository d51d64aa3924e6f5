//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use icpqualifier_core::{
    Collaborators, DocumentKnowledgeBase, OllamaClassifier, PipelineOptions, PipelineProgress,
    ProfileGenerator, RunReport, find_companies,
};
use icpqualifier_crawler::HttpScraper;
use icpqualifier_shared::{
    AppConfig, CandidateCompany, ProfileSource, QualifiedCompany, SemanticClassifier, init_config,
    load_config, load_config_from, validate_config,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Territory used when none is given.
const DEFAULT_TERRITORY: &str = "USA";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ICP qualifier: discover, verify and size-check prospective customers.
#[derive(Parser)]
#[command(
    name = "icpqualifier",
    version,
    about = "Find companies in a territory that match your ideal customer profile.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.icpqualifier/icpqualifier.toml).
    #[arg(long, global = true, env = "ICPQUALIFIER_CONFIG")]
    pub config: Option<PathBuf>,

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

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full pipeline for a territory and store new qualified companies.
    Find {
        /// Territory to search (e.g. USA, Canada, Brazil).
        #[arg(default_value = DEFAULT_TERRITORY)]
        territory: String,

        /// Stop after this many new companies qualify.
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Only generate target profiles for a territory and print them.
    Profiles {
        /// Territory to generate profiles for.
        #[arg(default_value = DEFAULT_TERRITORY)]
        territory: String,
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

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "icpqualifier=info",
        1 => "icpqualifier=debug",
        _ => "icpqualifier=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
        Command::Find { territory, limit } => cmd_find(config_path, &territory, limit).await,
        Command::Profiles { territory } => cmd_profiles(config_path, &territory).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

/// Load and validate config. The only fatal failures happen here.
fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    validate_config(&config)?;
    Ok(config)
}

async fn build_profile_source(
    config: &AppConfig,
    classifier: Arc<dyn SemanticClassifier>,
) -> Result<Arc<dyn ProfileSource>> {
    let knowledge =
        DocumentKnowledgeBase::load(Path::new(&config.paths.knowledge_dir), classifier).await?;
    info!(
        documents = knowledge.document_count(),
        dir = %config.paths.knowledge_dir,
        "knowledge base loaded"
    );
    Ok(Arc::new(ProfileGenerator::new(Arc::new(knowledge))))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_find(config_path: Option<&Path>, territory: &str, limit: Option<usize>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let territory = territory.trim();
    if territory.is_empty() {
        return Err(eyre!("territory must not be empty"));
    }

    let classifier: Arc<dyn SemanticClassifier> = Arc::new(OllamaClassifier::new(&config.llm)?);
    let collab = Collaborators {
        search: icpqualifier_search::build_search_provider(&config.search)?,
        scraper: Arc::new(HttpScraper::new(&config.scraper)?),
        profiles: build_profile_source(&config, classifier.clone()).await?,
        classifier,
    };
    let opts = PipelineOptions::from_config(&config, territory, limit);

    info!(territory, ?limit, provider = collab.search.name(), "finding companies");

    let reporter = CliProgress::new();
    let report = find_companies(&opts, &collab, &reporter).await?;

    println!("{}", serde_json::to_string_pretty(&report.qualified)?);

    eprintln!();
    eprintln!("  Territory:  {}", report.territory);
    eprintln!("  Profiles:   {}", report.profiles.len());
    eprintln!("  Stubs:      {}", report.stubs_found);
    eprintln!("  Candidates: {}", report.candidates);
    eprintln!("  Qualified:  {}", report.qualified.len());
    eprintln!("  Stored:     {} ({})", report.store_size, opts.results_path.display());
    eprintln!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
    eprintln!();

    Ok(())
}

async fn cmd_profiles(config_path: Option<&Path>, territory: &str) -> Result<()> {
    let config = resolve_config(config_path)?;

    let classifier: Arc<dyn SemanticClassifier> = Arc::new(OllamaClassifier::new(&config.llm)?);
    let profiles = build_profile_source(&config, classifier).await?;

    info!(territory, "generating profiles only");
    let generated = profiles.get_profiles(territory).await;
    if generated.is_empty() {
        eprintln!("No profiles generated for {territory}.");
    }
    println!("{}", serde_json::to_string_pretty(&generated)?);

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = match config_path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
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
}

impl PipelineProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn profile_started(&self, index: usize, total: usize, profile: &str) {
        self.spinner
            .set_message(format!("Profile [{index}/{total}] {profile}"));
    }

    fn candidate_accepted(&self, candidate: &CandidateCompany) {
        self.spinner
            .println(format!("  relevant: {} ({})", candidate.name, candidate.website));
    }

    fn company_qualified(&self, company: &QualifiedCompany) {
        self.spinner.println(format!(
            "  qualified: {} (${:.1}M)",
            company.name, company.estimated_revenue_in_millions
        ));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}
