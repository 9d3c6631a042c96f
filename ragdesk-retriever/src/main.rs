use clap::{Parser, Subcommand};
use ragdesk_retriever::{Retrieved, Retriever, RetrieverConfig, VectorPrecision};
use serde::Serialize;
use std::path::PathBuf;
use std::process;

/// A CLI tool to build and query a ragdesk document index.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory containing .txt and .pdf documents
    #[arg(long, global = true)]
    documents_dir: Option<PathBuf>,

    /// Base path of the persisted index
    #[arg(long, global = true)]
    index_path: Option<PathBuf>,

    /// Embedding model identifier
    #[arg(long, global = true)]
    model: Option<String>,

    /// Precision of stored vectors (f32 or f16)
    #[arg(long, global = true)]
    precision: Option<VectorPrecision>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load the persisted index, building it first if it does not exist
    Index,
    /// Rebuild the index from the documents directory, overwriting it
    Rebuild,
    /// Retrieve the documents most similar to a query
    Search {
        /// Query text
        query: String,
        /// Maximum number of results (defaults to the configured top_k)
        #[arg(short, long)]
        k: Option<usize>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show index statistics
    Stats {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    results: &'a [Retrieved],
}

#[derive(Serialize)]
struct StatsOutput {
    index_path: PathBuf,
    documents_dir: PathBuf,
    model: String,
    precision: VectorPrecision,
    rows: usize,
    documents: usize,
    dimension: usize,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(args: &Args) -> anyhow::Result<RetrieverConfig> {
    let mut config = RetrieverConfig::load_or_default(args.config.as_deref())?;
    if let Some(dir) = &args.documents_dir {
        config = config.with_documents_dir(dir);
    }
    if let Some(path) = &args.index_path {
        config = config.with_index_path(path);
    }
    if let Some(model) = &args.model {
        config = config.with_model(model);
    }
    if let Some(precision) = args.precision {
        config = config.with_precision(precision);
    }
    config.validate()?;
    Ok(config)
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = resolve_config(&args)?;
    let retriever = Retriever::from_config(config).await?;

    match args.command {
        Commands::Index => {
            let existed = retriever.store().exists();
            let stats = retriever.ensure_ready().await?;
            let action = if existed { "Loaded" } else { "Built" };
            println!(
                "{} index with {} documents ({} dimensions) at {}",
                action,
                stats.rows,
                stats.dimension,
                retriever.store().vectors_path().display()
            );
            Ok(())
        }
        Commands::Rebuild => {
            let stats = retriever.rebuild().await?;
            println!(
                "Rebuilt index with {} documents ({} dimensions) at {}",
                stats.rows,
                stats.dimension,
                retriever.store().vectors_path().display()
            );
            Ok(())
        }
        Commands::Search { query, k, format } => {
            let results = match k {
                Some(k) => retriever.retrieve(&query, k).await?,
                None => retriever.search(&query).await?,
            };

            match format {
                OutputFormat::Json => {
                    let output = SearchOutput {
                        query: &query,
                        results: &results,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Summary => {
                    println!("Found {} results:", results.len());
                    for (rank, result) in results.iter().enumerate() {
                        println!(
                            "  {}. Score: {:.4} | Row: {} | {}",
                            rank + 1,
                            result.score,
                            result.row,
                            preview(&result.document, 100)
                        );
                    }
                }
            }
            Ok(())
        }
        Commands::Stats { format } => {
            let stats = retriever.ensure_ready().await?;
            let config = retriever.config();
            let output = StatsOutput {
                index_path: config.index_path.clone(),
                documents_dir: config.documents_dir.clone(),
                model: config.embedding.model.clone(),
                precision: config.precision,
                rows: stats.rows,
                documents: stats.documents,
                dimension: stats.dimension,
            };

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Summary => {
                    println!("Index Statistics:");
                    println!("  Index path: {}", output.index_path.display());
                    println!("  Documents dir: {}", output.documents_dir.display());
                    println!("  Model: {}", output.model);
                    println!("  Precision: {}", output.precision);
                    println!("  Rows: {}", output.rows);
                    println!("  Documents: {}", output.documents);
                    println!("  Dimension: {}", output.dimension);
                }
            }
            Ok(())
        }
    }
}

/// First `max_chars` characters on a single line.
fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > max_chars {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        flat
    }
}
