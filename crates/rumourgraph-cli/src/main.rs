//! Rumourgraph CLI
//!
//! Staged pipeline over a PHEME-style rumour dataset:
//! - `prepare`: raw thread records → per-thread tables
//! - `structure`: tables → nested reply trees
//! - `graph`: reply trees → binary graph snapshot
//! - `features`: snapshot → flat per-message feature table
//! - `authors`: snapshot → author activity/centrality report
//! - `run`: every stage in one process

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rumourgraph_features::{author_report, extract_all, OutputFormat};
use rumourgraph_graph::RumourGraph;
use rumourgraph_ingest::read_tables;
use tracing_subscriber::EnvFilter;

mod config;
mod pipeline;

use config::PipelineConfig;

#[derive(Parser)]
#[command(name = "rumourgraph")]
#[command(author, version, about = "Rumourgraph: reply graphs and features for rumour threads")]
struct Cli {
    /// Pipeline config (JSON). Flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace). `RUST_LOG` wins when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk a raw dataset and write one table per thread
    Prepare {
        /// Dataset root (contains `rumours/` and `non-rumours/` thread directories)
        input: Option<PathBuf>,
        /// Output directory for `<thread_id>.json` tables
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Assemble reply trees from thread tables
    Structure {
        /// Directory of thread tables
        tables: Option<PathBuf>,
        /// Output directory for tree documents
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Build the message/author graph from tree documents
    Graph {
        /// Directory of tree documents
        trees: Option<PathBuf>,
        /// Output snapshot path
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Extract the feature table from a graph snapshot
    Features {
        /// Graph snapshot
        graph: Option<PathBuf>,
        /// Output table path
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// jsonl, json or cbor
        #[arg(long)]
        format: Option<OutputFormat>,
    },

    /// Report author activity, rumour involvement and betweenness
    Authors {
        /// Graph snapshot
        graph: Option<PathBuf>,
        /// Output report path
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Print the N most central authors
        #[arg(long, default_value_t = 10)]
        top: usize,
    },

    /// Run every stage: dataset → feature table
    Run {
        /// Dataset root
        input: Option<PathBuf>,
        /// Output directory
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[arg(long)]
        format: Option<OutputFormat>,
        /// Do not write thread tables and tree documents
        #[arg(long)]
        no_intermediates: bool,
        /// Do not write the author report
        #[arg(long)]
        no_authors: bool,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let mut config = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Prepare { input, out } => {
            let dataset = dataset_path(input, &config)?;
            let out = out.unwrap_or_else(|| config.tables_dir());
            cmd_prepare(&dataset, &out)
        }
        Commands::Structure { tables, out } => {
            let tables = tables.unwrap_or_else(|| config.tables_dir());
            let out = out.unwrap_or_else(|| config.trees_dir());
            cmd_structure(&tables, &out)
        }
        Commands::Graph { trees, out } => {
            let trees = trees.unwrap_or_else(|| config.trees_dir());
            let out = out.unwrap_or_else(|| config.graph_path());
            cmd_graph(&trees, &out)
        }
        Commands::Features { graph, out, format } => {
            if let Some(format) = format {
                config.format = format;
            }
            let graph = graph.unwrap_or_else(|| config.graph_path());
            let out = out.unwrap_or_else(|| config.features_path());
            cmd_features(&graph, &out, config.format)
        }
        Commands::Authors { graph, out, top } => {
            let graph = graph.unwrap_or_else(|| config.graph_path());
            let out = out.unwrap_or_else(|| config.authors_path());
            cmd_authors(&graph, &out, top)
        }
        Commands::Run {
            input,
            out,
            format,
            no_intermediates,
            no_authors,
        } => {
            if input.is_some() {
                config.dataset = input;
            }
            if let Some(out) = out {
                config.output_dir = out;
            }
            if let Some(format) = format {
                config.format = format;
            }
            config.keep_intermediates &= !no_intermediates;
            config.author_report &= !no_authors;
            cmd_run(&config)
        }
    }
}

fn dataset_path(input: Option<PathBuf>, config: &PipelineConfig) -> Result<PathBuf> {
    match input.or_else(|| config.dataset.clone()) {
        Some(path) => Ok(path),
        None => bail!("no dataset given (pass a path or set `dataset` in the config)"),
    }
}

fn cmd_prepare(dataset: &Path, out: &Path) -> Result<()> {
    println!("{} {}", "Preparing".green().bold(), dataset.display());
    let tables = pipeline::prepare(dataset, Some(out))?;
    let rows: usize = tables.iter().map(|t| t.len()).sum();
    let rumours = tables.iter().filter(|t| t.is_rumour).count();
    println!("  {} {}", "→".cyan(), out.display());
    println!(
        "  {} {} threads ({} rumour), {} messages",
        "→".yellow(),
        tables.len(),
        rumours,
        rows
    );
    Ok(())
}

fn cmd_structure(tables_dir: &Path, out: &Path) -> Result<()> {
    println!("{} {}", "Structuring".green().bold(), tables_dir.display());
    let tables = read_tables(tables_dir)
        .with_context(|| format!("reading thread tables from {}", tables_dir.display()))?;
    let trees = pipeline::structure(&tables, Some(out))?;
    let deepest = trees.iter().map(|t| t.depth()).max().unwrap_or(0);
    println!("  {} {}", "→".cyan(), out.display());
    println!(
        "  {} {} trees, deepest reply chain {}",
        "→".yellow(),
        trees.len(),
        deepest
    );
    Ok(())
}

fn cmd_graph(trees_dir: &Path, out: &Path) -> Result<()> {
    println!("{} {}", "Building graph".green().bold(), trees_dir.display());
    let trees = pipeline::read_trees(trees_dir)?;
    let graph = pipeline::build_graph(&trees);
    graph
        .save(out)
        .with_context(|| format!("saving graph snapshot {}", out.display()))?;
    print_graph_stats(&graph);
    println!("  {} {}", "→".cyan(), out.display());
    Ok(())
}

fn cmd_features(graph_path: &Path, out: &Path, format: OutputFormat) -> Result<()> {
    println!("{} {}", "Extracting features".green().bold(), graph_path.display());
    let graph = load_graph(graph_path)?;
    write_features(&graph, out, format)
}

fn cmd_authors(graph_path: &Path, out: &Path, top: usize) -> Result<()> {
    println!("{} {}", "Ranking authors".green().bold(), graph_path.display());
    let graph = load_graph(graph_path)?;
    write_authors(&graph, out, top)
}

fn cmd_run(config: &PipelineConfig) -> Result<()> {
    let dataset = dataset_path(None, config)?;
    println!(
        "{} {} → {}",
        "Running".green().bold(),
        dataset.display(),
        config.output_dir.display()
    );

    let tables_dir = config.tables_dir();
    let trees_dir = config.trees_dir();
    let keep = config.keep_intermediates;

    let tables = pipeline::prepare(&dataset, keep.then_some(tables_dir.as_path()))?;
    println!("  {} {} thread tables", "→".yellow(), tables.len());

    let trees = pipeline::structure(&tables, keep.then_some(trees_dir.as_path()))?;
    println!("  {} {} reply trees", "→".yellow(), trees.len());

    let graph = pipeline::build_graph(&trees);
    print_graph_stats(&graph);
    if keep {
        let path = config.graph_path();
        graph
            .save(&path)
            .with_context(|| format!("saving graph snapshot {}", path.display()))?;
        println!("  {} {}", "→".cyan(), path.display());
    }

    write_features(&graph, &config.features_path(), config.format)?;
    if config.author_report {
        write_authors(&graph, &config.authors_path(), 5)?;
    }
    Ok(())
}

fn load_graph(path: &Path) -> Result<RumourGraph> {
    RumourGraph::load(path).with_context(|| format!("loading graph snapshot {}", path.display()))
}

fn write_features(graph: &RumourGraph, out: &Path, format: OutputFormat) -> Result<()> {
    let table = extract_all(graph).context("extracting features")?;
    table
        .write(out, format)
        .with_context(|| format!("writing feature table {}", out.display()))?;
    println!("  {} {} ({})", "→".cyan(), out.display(), format);
    println!(
        "  {} {} rows, {} rumour",
        "→".yellow(),
        table.len(),
        table.rumour_count()
    );
    Ok(())
}

fn write_authors(graph: &RumourGraph, out: &Path, top: usize) -> Result<()> {
    let report = author_report(graph);
    report
        .write(out)
        .with_context(|| format!("writing author report {}", out.display()))?;
    println!("  {} {}", "→".cyan(), out.display());
    for author in report.top_by_betweenness(top) {
        let flag = if author.rumour_involved {
            "rumour".red().to_string()
        } else {
            "-".dimmed().to_string()
        };
        println!(
            "    {:<24} betweenness={:.6} posted={} mentioned={} {}",
            author.handle.bold(),
            author.betweenness,
            author.posted,
            author.mentioned,
            flag
        );
    }
    Ok(())
}

fn print_graph_stats(graph: &RumourGraph) {
    let stats = graph.stats();
    println!(
        "  {} {} messages, {} authors; edges: {} posted, {} mention, {} replies",
        "→".yellow(),
        stats.messages,
        stats.authors,
        stats.posted,
        stats.mentions,
        stats.replies
    );
}
