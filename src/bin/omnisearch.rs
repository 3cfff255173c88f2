//! CLI binary for omnisearch.
//!
//! Loads a TOML source registry and runs fan-out searches against it.
//! Results and listings go to stdout as JSON; logs go to stderr.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use omnisearch::{
    RegistryFile, SearchOptions, SearchOrchestrator, SearchQuery, SourceCategory, SourceConfig,
};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// omnisearch: federated search across a registry of sources.
#[derive(Debug, Parser)]
#[command(name = "omnisearch", version, about)]
struct Cli {
    /// Path to the TOML source registry.
    #[arg(short, long, default_value = "sources.toml")]
    registry: PathBuf,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Search the selected sources and print per-source results.
    Search {
        /// Query text.
        query: String,

        /// Only query this source (repeatable).
        #[arg(long = "source")]
        sources: Vec<String>,

        /// Only query sources in this category (repeatable).
        #[arg(long = "category")]
        categories: Vec<SourceCategory>,

        /// Maximum number of sources to query.
        #[arg(long)]
        max_sources: Option<usize>,

        /// Maximum results requested from each source.
        #[arg(long)]
        limit: Option<usize>,

        /// Keep duplicate URLs reported by several sources.
        #[arg(long)]
        no_dedup: bool,
    },

    /// List registered sources, highest priority first.
    Sources {
        /// Only list sources in this category.
        #[arg(long)]
        category: Option<SourceCategory>,
    },

    /// Validate the registry and print the effective configuration.
    Check,
}

impl Command {
    fn search_options(
        sources: Vec<String>,
        categories: Vec<SourceCategory>,
        max_sources: Option<usize>,
        no_dedup: bool,
    ) -> SearchOptions {
        let mut options = SearchOptions::default().with_deduplication(!no_dedup);
        if !sources.is_empty() {
            options = options.with_source_ids(sources);
        }
        if !categories.is_empty() {
            options = options.with_categories(categories);
        }
        if let Some(max) = max_sources {
            options = options.with_max_sources(max);
        }
        options
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let file = RegistryFile::from_file(&cli.registry)?;
    info!(
        registry = %cli.registry.display(),
        sources = file.sources.len(),
        "registry loaded"
    );

    match cli.command {
        Command::Check => {
            // from_file has already validated it.
            println!("{}", file.to_toml_string()?);
            Ok(())
        }
        Command::Sources { category } => {
            let orchestrator = SearchOrchestrator::from_registry_file(file)?;
            let listed = list_sources(&orchestrator, category);
            println!("{}", serde_json::to_string_pretty(&listed)?);
            Ok(())
        }
        Command::Search {
            query,
            sources,
            categories,
            max_sources,
            limit,
            no_dedup,
        } => {
            let orchestrator = SearchOrchestrator::from_registry_file(file)?;
            orchestrator.start()?;

            let mut search = SearchQuery::new(query);
            if let Some(limit) = limit {
                search = search.with_limit(limit);
            }
            let options = Command::search_options(sources, categories, max_sources, no_dedup);
            let outcome = orchestrator.search_sources(&search, &options).await;
            orchestrator.shutdown().await;

            let results = outcome?;
            let output = json!({
                "query": search.query,
                "total_results": results.total_results(),
                "sources": results,
                "stats": orchestrator.get_aggregate_stats(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}

fn list_sources(
    orchestrator: &SearchOrchestrator,
    category: Option<SourceCategory>,
) -> Vec<serde_json::Value> {
    let mut sources: Vec<SourceConfig> = match category {
        Some(category) => orchestrator.registry().sources_by_category(category),
        None => orchestrator.registry().all_sources(),
    };
    sources.sort_by(|a, b| b.priority.cmp(&a.priority));
    sources
        .into_iter()
        .map(|source| {
            json!({
                "id": source.id,
                "name": source.name,
                "category": source.category,
                "type": source.source_type,
                "priority": source.priority,
                "enabled": source.enabled,
                "healthy": orchestrator
                    .get_source_health(&source.id)
                    .is_some_and(|h| h.is_healthy),
            })
        })
        .collect()
}
