//! megadoc - Assemble the files referenced by a review into one document.
//!
//! Usage:
//!   megadoc build REVIEW -o OUT      Build from the files a review references
//!                                    (split into 300 KB parts unless --single-doc)
//!   megadoc files FILE... -o OUT     Build from an explicit file list
//!   megadoc collect DIR... -o OUT    Build from every eligible file in directories
//!   megadoc extract REVIEW           List the paths a review references
//!   megadoc info                     Show configuration and repository details
//!   megadoc --help                   Show help

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result};

use megadoc_build::{BuildOptions, BuildStats, MegaDocumentService};
use megadoc_core::{MegaDocConfig, global};

#[derive(Parser)]
#[command(
    name = "megadoc",
    version,
    about = "Assemble a single mega document from the files referenced by a review",
    long_about = "megadoc reads a free-form review, finds the source files it mentions, \
                  and writes them into one Markdown document with a table of contents.\n\n\
                  Paths are checked against a traversal guard, a depth limit, a size \
                  limit and an extension allow-list before anything is read."
)]
struct Cli {
    /// Directory that referenced paths are resolved against
    #[arg(short, long, global = true, default_value = ".")]
    base: PathBuf,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Allow paths that resolve outside the base directory
    #[arg(long, global = true)]
    allow_traversal: bool,

    /// Maximum number of path separators
    #[arg(long, global = true)]
    max_depth: Option<usize>,

    /// Maximum file size in megabytes
    #[arg(long, global = true)]
    max_size_mb: Option<f64>,

    /// Disable the file metadata cache
    #[arg(long, global = true)]
    no_cache: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct DocumentArgs {
    /// Output document
    #[arg(short, long, default_value = "mega_document.md")]
    output: PathBuf,

    /// Document title
    #[arg(short, long, default_value = "Mega Document")]
    title: String,

    /// Optional description printed under the title
    #[arg(short, long)]
    description: Option<String>,

    /// Maximum content size per part in KB
    #[arg(short, long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(10..))]
    max_size: u64,

    /// Write one document without size-based splitting
    #[arg(short, long)]
    single_doc: bool,

    /// Bug report to include before the table of contents
    #[arg(long)]
    bug_report_file: Option<PathBuf>,
}

impl DocumentArgs {
    fn options(&self) -> BuildOptions {
        let mut options = BuildOptions::new(&self.title);
        if let Some(description) = &self.description {
            options = options.with_description(description);
        }
        if !self.single_doc {
            options = options.with_max_part_bytes(self.max_size * 1024);
        }
        if let Some(report) = &self.bug_report_file {
            options = options.with_bug_report(report);
        }
        options
    }
}

#[derive(Subcommand)]
enum Command {
    /// Build a document from the files a review references
    Build {
        /// Review document
        review: PathBuf,

        #[command(flatten)]
        document: DocumentArgs,
    },

    /// Build a document from an explicit list of files
    Files {
        /// Files to include
        #[arg(required = true)]
        files: Vec<String>,

        #[command(flatten)]
        document: DocumentArgs,
    },

    /// Build a document from every eligible file in directories
    Collect {
        /// Directories to walk
        #[arg(required = true)]
        dirs: Vec<PathBuf>,

        #[command(flatten)]
        document: DocumentArgs,
    },

    /// List the file paths a review references
    Extract {
        /// Review document
        review: PathBuf,
    },

    /// Show configuration, cache and repository details
    Info,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = load_config(&cli)?;
    global::set_config(config);
    let config = global::get_config();

    let mut service = MegaDocumentService::with_base_path(&cli.base, config.clone());

    match &cli.command {
        Command::Build { review, document } => {
            let stats = service
                .create_mega_document(review, &document.output, &document.options())
                .with_context(|| format!("Failed to build from {}", review.display()))?;
            print_stats(&stats, &config, cli.format)?;
        }
        Command::Files { files, document } => {
            let stats = service
                .create_from_files(files, &document.output, &document.options())
                .context("Failed to build from file list")?;
            print_stats(&stats, &config, cli.format)?;
        }
        Command::Collect { dirs, document } => {
            let stats = service
                .create_from_directories(dirs, &document.output, &document.options())
                .context("Failed to build from directories")?;
            print_stats(&stats, &config, cli.format)?;
        }
        Command::Extract { review } => {
            run_extract(&mut service, review, cli.format)?;
        }
        Command::Info => {
            run_info(&service, cli.format)?;
        }
    }

    Ok(())
}

fn setup_logging(verbose: u8) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        match verbose {
            0 => tracing_subscriber::EnvFilter::new("warn"),
            1 => tracing_subscriber::EnvFilter::new("info"),
            2 => tracing_subscriber::EnvFilter::new("debug"),
            _ => tracing_subscriber::EnvFilter::new("trace"),
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Defaults, then the config file, then command-line overrides.
fn load_config(cli: &Cli) -> Result<MegaDocConfig> {
    let mut config = match &cli.config {
        Some(path) => MegaDocConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => MegaDocConfig::default(),
    };

    if cli.allow_traversal {
        config.allow_path_traversal = true;
    }
    if let Some(depth) = cli.max_depth {
        config.max_depth_levels = depth;
    }
    if let Some(size) = cli.max_size_mb {
        config.max_file_size_mb = size;
    }
    if cli.no_cache {
        config.enable_caching = false;
    }
    Ok(config)
}

fn print_stats(stats: &BuildStats, config: &Arc<MegaDocConfig>, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            print!("{}", stats.summary(config));
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(stats).context("Failed to serialize stats")?;
            println!("{json}");
        }
    }
    Ok(())
}

fn run_extract(service: &mut MegaDocumentService, review: &Path, format: OutputFormat) -> Result<()> {
    let paths = service
        .extract_from_review(review)
        .with_context(|| format!("Failed to read {}", review.display()))?;

    match format {
        OutputFormat::Text => {
            if paths.is_empty() {
                eprintln!("No file paths found in {}", review.display());
            }
            for path in &paths {
                println!("{path}");
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&paths).context("Failed to serialize paths")?;
            println!("{json}");
        }
    }
    Ok(())
}

fn run_info(service: &MegaDocumentService, format: OutputFormat) -> Result<()> {
    let info = service.get_system_info();

    match format {
        OutputFormat::Text => {
            let config = service.config();
            println!();
            println!("{}", "─".repeat(60));
            println!(" megadoc {}", env!("CARGO_PKG_VERSION"));
            println!("{}", "─".repeat(60));
            println!();
            println!(" Repository:      {}", info.repository_type);
            println!(" Base path:       {}", info.base_path.display());
            println!(
                " Max file size:   {}",
                format_limit(config.get_max_file_size_bytes())
            );
            println!(" Max depth:       {}", config.max_depth_levels);
            println!(
                " Traversal:       {}",
                if config.allow_path_traversal { "allowed" } else { "blocked" }
            );
            println!(
                " Encodings:       {} then {}",
                config.default_encoding,
                config
                    .get_encoding_options()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!(
                " Cache:           {} ({}/{} entries)",
                if info.cache_stats.cache_enabled { "enabled" } else { "disabled" },
                info.cache_stats.cached_files,
                info.cache_stats.cache_size_limit
            );
            println!(
                " Extensions:      {}",
                config
                    .supported_extensions()
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(" ")
            );
            println!();
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&info).context("Failed to serialize info")?;
            println!("{json}");
        }
    }
    Ok(())
}

/// Format a byte limit, which may be negative.
fn format_limit(bytes: i64) -> String {
    match u64::try_from(bytes) {
        Ok(bytes) => humansize::format_size(bytes, humansize::BINARY),
        Err(_) => format!("{bytes} bytes (rejects every file)"),
    }
}
