//! CLI parser and dispatch to command-specific modules.

mod cache;
mod config_cmd;
mod pipeline;
mod query;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};
use crate::dedup::DedupKeyStrategy;
use crate::warehouse::{GroupBy, WriteMode};

#[derive(Parser)]
#[command(name = "brewpipe")]
#[command(about = "Brewery data ETL with cached query serving")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides config file and BREWPIPE_DATA_DIR)
    #[arg(long, short = 'd', global = true)]
    data: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Extract normalized records from the first working source
    Extract {
        /// Stop after this many records
        #[arg(short, long)]
        limit: Option<usize>,
        /// Handoff file to write (default: <data>/handoff/extracted.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate and deduplicate an extracted handoff file
    Transform {
        /// Handoff file to read (default: <data>/handoff/extracted.json)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Handoff file to write (default: <data>/handoff/transformed.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load a transformed handoff file into the warehouse
    Load {
        /// Handoff file to read (default: <data>/handoff/transformed.json)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// replace_all or append
        #[arg(short, long, default_value = "replace_all")]
        mode: WriteMode,
    },

    /// Extract, transform, load and deduplicate in one go
    Run {
        #[arg(short, long)]
        limit: Option<usize>,
        /// replace_all or append
        #[arg(short, long, default_value = "replace_all")]
        mode: WriteMode,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Collapse duplicate rows in the warehouse
    Dedupe {
        /// Only list duplicate groups, change nothing
        #[arg(long)]
        check: bool,
        /// Override the configured key (identity_and_name or identity)
        #[arg(short, long)]
        key: Option<DedupKeyStrategy>,
    },

    /// Aggregate warehouse records
    Summary {
        /// category, subcategory or source
        #[arg(short, long, default_value = "category")]
        group_by: GroupBy,
        /// Restrict to one category (ale, lager, other)
        #[arg(long)]
        category: Option<crate::transform::Category>,
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Search breweries through the cache
    Search {
        query: String,
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Print the raw payload as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP query server
    Serve {
        /// Port, host, or host:port
        #[arg(default_value = "127.0.0.1:3030")]
        bind: String,
    },

    /// Manage the response cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show cache counters and tier contents
    Stats,
    /// Remove every cached entry
    Clear,
    /// Remove the entry for one request
    Invalidate {
        /// TTL namespace (search, geographic_data, ...)
        namespace: String,
        /// Request URL without query string
        url: String,
        /// Query parameters as key=value
        #[arg(short, long = "param", value_parser = super::helpers::parse_pair)]
        params: Vec<(String, String)>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the resolved settings
    Show {
        /// Output format: json or toml
        #[arg(short, long, default_value = "json")]
        format: String,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data: cli.data,
    };
    let (settings, config) = load_settings_with_options(options)
        .await
        .map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Extract { limit, output } => {
            pipeline::cmd_extract(settings, limit, output).await
        }
        Commands::Transform { input, output } => {
            pipeline::cmd_transform(settings, input, output).await
        }
        Commands::Load { input, mode } => pipeline::cmd_load(settings, input, mode).await,
        Commands::Run { limit, mode, json } => pipeline::cmd_run(settings, limit, mode, json).await,
        Commands::Dedupe { check, key } => pipeline::cmd_dedupe(settings, check, key).await,
        Commands::Summary {
            group_by,
            category,
            limit,
        } => pipeline::cmd_summary(settings, group_by, category, limit).await,
        Commands::Search { query, limit, json } => {
            query::cmd_search(settings, &query, limit, json).await
        }
        Commands::Serve { bind } => serve::cmd_serve(settings, &bind).await,
        Commands::Cache { command } => match command {
            CacheCommands::Stats => cache::cmd_cache_stats(settings).await,
            CacheCommands::Clear => cache::cmd_cache_clear(settings).await,
            CacheCommands::Invalidate {
                namespace,
                url,
                params,
            } => cache::cmd_cache_invalidate(settings, &namespace, &url, &params).await,
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show { format } => config_cmd::cmd_config_show(&settings, &config, &format),
        },
    }
}
