//! CLI module for S.A.G.E
//!
//! Provides command-line interface parsing for the sage-server binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod init;
pub mod output;

use crate::research::query::{CitationStyle, Query, QueryConstraints, SourceType};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// S.A.G.E - Specialized Agent Graph Engine
///
/// Plans a research query into scrape, summarize, fact-check, translate,
/// sentiment and citation tasks, runs them and assembles a report.
#[derive(Parser, Debug)]
#[command(
    name = "sage-server",
    version,
    about = "S.A.G.E - Specialized Agent Graph Engine",
    long_about = "A multi-agent research coordinator. Each query becomes a dependency graph\n\
                  of capability tasks whose results are assembled into a structured report.\n\n\
                  Run without arguments to start the server, or use 'research' for a one-off query.",
    after_help = "EXAMPLES:\n    \
                  sage-server init                                   # Write a default sage.toml\n    \
                  sage-server research \"coral reef bleaching\" --lang es\n    \
                  sage-server research \"CRISPR\" --source-type academic --style mla\n    \
                  sage-server                                        # Start the server\n    \
                  sage-server --config my.toml config --validate"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "sage.toml", global = true)]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server (the default)
    Serve,

    /// Run one research query and print the report
    Research(ResearchArgs),

    /// Initialize a new S.A.G.E project with a default sage.toml
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite existing files
        #[arg(short, long)]
        force: bool,

        /// LLM provider to configure (ollama or openai)
        #[arg(long, default_value = "ollama")]
        provider: String,

        /// Host address for the server
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port for the server
        #[arg(long, default_value = "3000")]
        port: u16,
    },

    /// Show configuration information
    Config {
        /// Show the full configuration
        #[arg(short = 'f', long)]
        full: bool,

        /// Validate the configuration file
        #[arg(long)]
        validate: bool,
    },
}

/// Arguments of the `research` subcommand
#[derive(clap::Args, Debug)]
pub struct ResearchArgs {
    /// The research question or topic
    pub query: String,

    /// Translate the summary into this language (repeatable)
    #[arg(short, long = "lang")]
    pub languages: Vec<String>,

    /// Source channel to search: web, academic or pdf (repeatable)
    #[arg(long = "source-type")]
    pub source_types: Vec<SourceType>,

    /// Extra URL to scrape (repeatable)
    #[arg(long = "source")]
    pub sources: Vec<String>,

    /// Citation style: apa, mla or chicago
    #[arg(long)]
    pub style: Option<CitationStyle>,

    /// Number of summary bullet points
    #[arg(long)]
    pub bullets: Option<usize>,

    /// Print the run summary and report as JSON
    #[arg(long)]
    pub json: bool,

    /// Also write the report as markdown to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ResearchArgs {
    pub fn to_query(&self) -> Query {
        Query::new(self.query.clone()).with_constraints(QueryConstraints {
            languages: self.languages.clone(),
            source_types: self.source_types.clone(),
            sources: self.sources.clone(),
            citation_style: self.style,
            summary_bullets: self.bullets,
        })
    }
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
