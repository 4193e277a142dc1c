//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Report, Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use policytag_artifacts::{document_dir, document_stem, read_chunks, read_pages, write_json};
use policytag_core::chunker::{Chunker, PageChunker};
use policytag_core::parse::DocumentParser;
use policytag_core::pipeline::{
    self, DocumentInput, RunOptions, RunProgress, RunReport, TagReport,
};
use policytag_core::tagger::{SolarClassifier, TagCache, Tagger, TaggerSettings, TaggingProgress};
use policytag_pages::ReconstructOptions;
use policytag_shared::{
    AppConfig, LabelSet, LlmPolicy, PageFormat, PolicyTagError, TermRanges, init_config, load_config,
    require_api_key, resolve_api_key, validate_config,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// policytag: rebuild policy pages and tag their clauses.
#[derive(Parser)]
#[command(
    name = "policytag",
    version,
    about = "Reconstruct insurance-policy pages and tag clauses for retrieval.",
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

/// Per-page file format.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum FormatArg {
    Html,
    Text,
    Markdown,
}

impl From<FormatArg> for PageFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Html => Self::Html,
            FormatArg::Text => Self::Text,
            FormatArg::Markdown => Self::Markdown,
        }
    }
}

/// Term-type page boundaries, in footer numbering.
#[derive(Args, Debug, Clone, Copy)]
pub(crate) struct RangeArgs {
    /// First page of the basic terms.
    #[arg(long)]
    pub basic_start: u32,
    /// Last page of the basic terms.
    #[arg(long)]
    pub basic_end: u32,
    /// First page of the special terms.
    #[arg(long)]
    pub special_start: u32,
    /// Last page of the special terms.
    #[arg(long)]
    pub special_end: u32,
}

impl From<RangeArgs> for TermRanges {
    fn from(r: RangeArgs) -> Self {
        Self {
            basic_start: r.basic_start,
            basic_end: r.basic_end,
            special_start: r.special_start,
            special_end: r.special_end,
        }
    }
}

/// Options shared by the page-building commands.
#[derive(Args, Debug, Clone)]
pub(crate) struct PageArgs {
    /// Policy PDF, or HTML already produced by the parse service.
    pub input: PathBuf,

    #[command(flatten)]
    pub ranges: RangeArgs,

    /// Source file name to use instead of the input's own name
    /// (`<insurer>_<product>_...`).
    #[arg(long)]
    pub file_name: Option<String>,

    /// Output directory (defaults to `defaults.output_dir`).
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Page file format (defaults to `defaults.page_format`).
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Write each page's source markup, not its text, into HTML page files.
    #[arg(long)]
    pub raw_markup: bool,
}

/// Overrides for the `[tagging]` config section.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct TaggingArgs {
    /// LLM escalation policy: always, never, or unknown_or_low_conf.
    #[arg(long)]
    pub policy: Option<LlmPolicy>,

    /// Clause-type vocabulary: basic or extended.
    #[arg(long)]
    pub label_set: Option<LabelSet>,

    /// Rule confidence below which a chunk is escalated.
    #[arg(long)]
    pub threshold: Option<f64>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Send a policy PDF to the document-parse service and save its HTML.
    Parse {
        /// Policy PDF.
        input: PathBuf,

        /// Where to write the HTML (defaults to `<output_dir>/<stem>/<stem>.parsed.html`).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Reconstruct and enrich pages, then write one file per page.
    Pages {
        #[command(flatten)]
        pages: PageArgs,

        /// Also write the enriched pages as a JSON array to this path.
        #[arg(long)]
        dump: Option<PathBuf>,
    },

    /// Tag chunks and write chunk files plus the tagging summary.
    Tag {
        /// JSON array of chunks from an external splitter.
        #[arg(long, conflicts_with = "pages", required_unless_present = "pages")]
        chunks: Option<PathBuf>,

        /// JSON array of enriched pages (from `pages --dump`), one chunk per page.
        #[arg(long)]
        pages: Option<PathBuf>,

        /// Output directory (defaults to `defaults.output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        tagging: TaggingArgs,
    },

    /// Parse, reconstruct, enrich, chunk, and tag one document end to end.
    Run {
        #[command(flatten)]
        pages: PageArgs,

        #[command(flatten)]
        tagging: TaggingArgs,
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
        0 => "policytag=info",
        1 => "policytag=debug",
        _ => "policytag=trace",
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
        Command::Parse { input, out } => cmd_parse(&input, out.as_deref()).await,
        Command::Pages { pages, dump } => cmd_pages(&pages, dump.as_deref()).await,
        Command::Tag {
            chunks,
            pages,
            out,
            tagging,
        } => cmd_tag(chunks.as_deref(), pages.as_deref(), out.as_deref(), &tagging).await,
        Command::Run { pages, tagging } => cmd_run(&pages, &tagging).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

/// Load config and apply command-line tagging overrides.
fn load_with_overrides(tagging: &TaggingArgs) -> Result<AppConfig> {
    let mut config = load_config()?;
    if let Some(policy) = tagging.policy {
        config.tagging.llm_policy = policy;
    }
    if let Some(label_set) = tagging.label_set {
        config.tagging.label_set = label_set;
    }
    if let Some(threshold) = tagging.threshold {
        config.tagging.confidence_threshold = threshold;
    }
    validate_config(&config)?;
    Ok(config)
}

/// Build the tagger; the classifier is present only when a credential is.
fn build_tagger(config: &AppConfig) -> Result<Tagger<SolarClassifier>> {
    let classifier = match resolve_api_key(config) {
        Some(key) => Some(SolarClassifier::new(&config.upstage, key)?),
        None => None,
    };
    Ok(Tagger::new(TaggerSettings::from_config(config), classifier))
}

/// A parser is only built for PDF input.
fn parser_for(input: &DocumentInput, config: &AppConfig) -> Result<Option<DocumentParser>> {
    match input {
        DocumentInput::Pdf(_) => {
            let key = require_api_key(config)?;
            Ok(Some(DocumentParser::new(&config.upstage, key)?))
        }
        DocumentInput::Html(_) => Ok(None),
    }
}

/// Mark errors that stop the whole batch.
fn halted(e: PolicyTagError) -> Report {
    if e.is_batch_fatal() {
        eyre!("batch halted: {e}")
    } else {
        e.into()
    }
}

fn output_dir(out: Option<&Path>, config: &AppConfig) -> PathBuf {
    out.map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&config.defaults.output_dir))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_parse(input: &Path, out: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let parser = DocumentParser::new(&config.upstage, require_api_key(&config)?)?;

    info!(input = %input.display(), "parsing document");
    let reporter = CliProgress::new();
    reporter.phase("Parsing document");
    let parsed = parser.parse_file(input).await?;
    reporter.finish();

    let path = match out {
        Some(p) => p.to_path_buf(),
        None => {
            let file_name = input
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| eyre!("'{}' has no file name", input.display()))?;
            let stem = document_stem(file_name);
            document_dir(Path::new(&config.defaults.output_dir), file_name).join(format!("{stem}.parsed.html"))
        }
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, &parsed.html)?;

    println!();
    println!("  Document parsed.");
    println!("  Chars:  {}", parsed.html.chars().count());
    println!("  HTML:   {}", path.display());
    println!();

    Ok(())
}

async fn cmd_pages(args: &PageArgs, dump: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let input = DocumentInput::from_path(&args.input);
    let parser = parser_for(&input, &config)?;
    let out = output_dir(args.out.as_deref(), &config);
    let format = args.format.map(PageFormat::from).unwrap_or(config.defaults.page_format);

    let reporter = CliProgress::new();
    reporter.phase("Loading document");
    let doc = pipeline::load_document(&input, args.file_name.as_deref(), parser.as_ref()).await?;

    reporter.phase("Reconstructing pages");
    let opts = ReconstructOptions {
        keep_raw_markup: args.raw_markup,
    };
    let pages = pipeline::build_pages(&doc, &args.ranges.into(), &config.product_table(), &opts)?;

    reporter.phase("Writing page files");
    let report = policytag_artifacts::write_page_files(&out, &pages, format)?;
    if let Some(path) = dump {
        write_json(path, &pages)?;
    }
    reporter.finish();

    println!();
    println!("  Pages reconstructed.");
    println!("  Pages:    {}", pages.len());
    println!("  Written:  {}", report.written);
    println!("  Skipped:  {} (already present)", report.skipped);
    println!("  Path:     {}", document_dir(&out, &doc.file_name).display());
    if let Some(path) = dump {
        println!("  Dump:     {}", path.display());
    }
    println!();

    Ok(())
}

async fn cmd_tag(
    chunks: Option<&Path>,
    pages: Option<&Path>,
    out: Option<&Path>,
    tagging: &TaggingArgs,
) -> Result<()> {
    let config = load_with_overrides(tagging)?;
    let out = output_dir(out, &config);

    let chunks = match (chunks, pages) {
        (Some(path), _) => read_chunks(path)?,
        (None, Some(path)) => PageChunker.chunk(&read_pages(path)?),
        (None, None) => return Err(eyre!("either --chunks or --pages is required")),
    };

    let tagger = build_tagger(&config)?;
    let mut cache = TagCache::new(config.tagging.effective_cache_max());

    info!(
        chunks = chunks.len(),
        policy = %config.tagging.llm_policy,
        label_set = config.tagging.label_set.as_str(),
        "tagging chunks"
    );

    let reporter = CliProgress::new();
    reporter.phase("Tagging chunks");
    let report = pipeline::tag_and_write(chunks, &tagger, &mut cache, &out, &reporter)
        .await
        .map_err(halted)?;
    reporter.finish();

    print_tag_report(&report);
    Ok(())
}

async fn cmd_run(args: &PageArgs, tagging: &TaggingArgs) -> Result<()> {
    let config = load_with_overrides(tagging)?;
    let input = DocumentInput::from_path(&args.input);
    let parser = parser_for(&input, &config)?;
    let tagger = build_tagger(&config)?;
    let mut cache = TagCache::new(config.tagging.effective_cache_max());

    let opts = RunOptions {
        output_dir: output_dir(args.out.as_deref(), &config),
        ranges: args.ranges.into(),
        page_format: args.format.map(PageFormat::from).unwrap_or(config.defaults.page_format),
        reconstruct: ReconstructOptions {
            keep_raw_markup: args.raw_markup,
        },
        file_name: args.file_name.clone(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
    };

    info!(input = %args.input.display(), "starting run");

    let reporter = CliProgress::new();
    let result = pipeline::run_document(
        &input,
        &opts,
        parser.as_ref(),
        &config.product_table(),
        &PageChunker,
        &tagger,
        &mut cache,
        &reporter,
    )
    .await
    .map_err(halted)?;

    let m = &result.manifest;
    println!();
    println!("  Run complete!");
    println!("  Run:       {}", m.run_id);
    println!("  Pages:     {} ({} written)", m.page_count, result.pages.written);
    println!("  Chunks:    {}", m.chunk_count);
    println!("  LLM used:  {}", m.llm_used);
    println!("  Cache:     {} hits / {} misses", m.cache_hits, m.cache_misses);
    println!("  Path:      {}", result.document_dir.display());
    println!("  Time:      {:.1}s", result.elapsed.as_secs_f64());
    print_counts("Clause types", result.summary.clause_type.iter());
    print_counts("Term types", result.summary.term_type.iter());
    println!();

    Ok(())
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
// Output
// ---------------------------------------------------------------------------

fn print_tag_report(report: &TagReport) {
    println!();
    println!("  Chunks tagged.");
    println!("  Chunks:    {}", report.chunk_count);
    println!("  LLM used:  {}", report.llm_used);
    println!("  Cache:     {} hits / {} misses", report.cache.hits, report.cache.misses);
    println!("  Summary:   {}", report.summary_path.display());
    print_counts("Clause types", report.summary.clause_type.iter());
    print_counts("Term types", report.summary.term_type.iter());
    println!();
}

fn print_counts<'a>(title: &str, counts: impl Iterator<Item = (&'a str, usize)>) {
    println!("  {title}:");
    for (label, count) in counts {
        println!("    {label:<12} {count}");
    }
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
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl TaggingProgress for CliProgress {
    fn chunks_tagged(&self, done: usize, total: usize, llm_used: usize) {
        self.spinner
            .set_message(format!("Tagging [{done}/{total}] (LLM: {llm_used})"));
    }
}

impl RunProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _report: &RunReport) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_args_parse() {
        let cli = Cli::try_parse_from([
            "policytag",
            "run",
            "meritz_1_maum.pdf",
            "--basic-start",
            "3",
            "--basic-end",
            "20",
            "--special-start",
            "21",
            "--special-end",
            "40",
            "--policy",
            "never",
            "--label-set",
            "extended",
            "--format",
            "text",
        ])
        .unwrap();

        let Command::Run { pages, tagging } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(TermRanges::from(pages.ranges).special_end, 40);
        assert_eq!(tagging.policy, Some(LlmPolicy::Never));
        assert_eq!(tagging.label_set, Some(LabelSet::Extended));
        assert!(matches!(pages.format, Some(FormatArg::Text)));
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let result = Cli::try_parse_from(["policytag", "tag", "--chunks", "c.json", "--policy", "sometimes"]);
        assert!(result.is_err());
    }

    #[test]
    fn tag_needs_an_input() {
        assert!(Cli::try_parse_from(["policytag", "tag"]).is_err());
        assert!(
            Cli::try_parse_from(["policytag", "tag", "--chunks", "a.json", "--pages", "b.json"]).is_err()
        );
    }
}
