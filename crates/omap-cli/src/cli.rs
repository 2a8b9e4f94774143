use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "omap",
    about = "omap: rule-driven object-graph mapping from declarative documents",
    version
)]
pub struct Cli {
    /// Log compiled entries and dispatch decisions to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the rule set of a mapping document and report every issue
    Check {
        /// Mapping document (.toml or .json)
        document: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the compiled mapping entries of a document
    Entries {
        /// Mapping document (.toml or .json)
        document: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Map a JSON object graph with the rules of a document
    Map {
        /// Mapping document (.toml or .json)
        document: String,

        /// Source object JSON path
        #[arg(long)]
        input: String,

        /// Requested target type (an upper bound unless --into is given)
        #[arg(long)]
        target: String,

        /// Declared source type (defaults to the input's "$type")
        #[arg(long)]
        source: Option<String>,

        /// Existing target object JSON path; maps in place
        #[arg(long)]
        into: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
