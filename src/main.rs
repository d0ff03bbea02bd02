use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, Level};

mod cli;
mod config;
mod embed;
mod error;
mod exclude;
mod indexer;
mod mcp;
mod model;
mod parsers;
mod query;
mod store;
mod walker;

#[derive(Parser)]
#[command(name = "codectx")]
#[command(version)]
#[command(about = "Semantic + structural project-context index for AI agents via MCP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Project directory (shorthand for 'codectx start <project>')
    #[arg(value_name = "PROJECT")]
    project: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server (auto-index + watch) - default command
    Start {
        /// Project directory to index
        #[arg(default_value = ".")]
        project: String,

        /// Disable file watching
        #[arg(long)]
        no_watch: bool,

        /// Force rebuild of the index
        #[arg(short, long)]
        rebuild: bool,
    },

    /// Start MCP server without indexing first
    Serve {
        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Index a project
    Index {
        /// Project directory to index
        #[arg(short, long, default_value = ".")]
        project: String,

        /// Watch for changes after indexing
        #[arg(short, long)]
        watch: bool,

        /// Rebuild the entire index
        #[arg(short, long)]
        rebuild: bool,
    },

    /// Query the index (semantic by default)
    Search {
        /// Query text (or name pattern with --structural)
        query: String,

        /// Structural search over element names instead of semantic
        #[arg(short, long)]
        structural: bool,

        /// Filter by element kind (function, class, heading, ...)
        #[arg(short, long)]
        kind: Option<String>,

        /// Filter by language
        #[arg(short, long)]
        language: Option<String>,

        /// Similarity threshold for semantic search
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Maximum number of results
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,

        /// Print results as JSON
        #[arg(long)]
        json: bool,

        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Show the indexed context around a file
    Context {
        /// File path relative to the project root
        file: String,

        /// Dependency hops to include
        #[arg(short, long, default_value_t = 1)]
        radius: usize,

        /// Print as JSON
        #[arg(long)]
        json: bool,

        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Show the project structure with element counts
    Structure {
        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Show dependency edges and manifest files
    Deps {
        /// Print as JSON
        #[arg(long)]
        json: bool,

        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: String,
    },

    /// Show index statistics
    Stats {
        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: String,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Remove persisted index state for a project
    Clean {
        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: String,

        /// Actually delete (default is a dry run)
        #[arg(long)]
        yes: bool,
    },
}

fn init_logging(debug: bool, verbose: bool) {
    let level = if debug {
        Level::DEBUG
    } else if verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug, cli.verbose);

    info!("codectx v{} starting...", env!("CARGO_PKG_VERSION"));

    // Handle shorthand: codectx <project>
    let command = if let Some(cmd) = cli.command {
        cmd
    } else if let Some(project) = cli.project {
        Commands::Start {
            project,
            no_watch: false,
            rebuild: false,
        }
    } else {
        Commands::Start {
            project: ".".to_string(),
            no_watch: false,
            rebuild: false,
        }
    };

    match command {
        Commands::Start {
            project,
            no_watch,
            rebuild,
        } => {
            cli::start::start_server(project, !no_watch, rebuild).await?;
        }

        Commands::Serve { project } => {
            cli::serve::serve_stdio(project).await?;
        }

        Commands::Index {
            project,
            watch,
            rebuild,
        } => {
            cli::index::index_project(project, watch, rebuild).await?;
        }

        Commands::Search {
            query,
            structural,
            kind,
            language,
            threshold,
            limit,
            json,
            project,
        } => {
            cli::search::run_search(project, query, structural, kind, language, threshold, limit, json)
                .await?;
        }

        Commands::Context {
            file,
            radius,
            json,
            project,
        } => {
            cli::context::show_context(project, file, radius, json).await?;
        }

        Commands::Structure { project } => {
            cli::structure::show_structure(project).await?;
        }

        Commands::Deps { json, project } => {
            cli::deps::show_dependencies(project, json).await?;
        }

        Commands::Stats { project, verbose } => {
            cli::stats::show_stats(project, verbose).await?;
        }

        Commands::Clean { project, yes } => {
            cli::clean::clean(project, !yes).await?;
        }
    }

    Ok(())
}
