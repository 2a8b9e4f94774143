//! omap CLI: the `omap` command.

mod cli;
mod commands;
mod support;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    support::init_logging(cli.verbose);

    match cli.command {
        Commands::Check { document, json } => commands::check::run(document, json),

        Commands::Entries { document, json } => commands::entries::run(document, json),

        Commands::Map {
            document,
            input,
            target,
            source,
            into,
            json,
        } => commands::map::run(commands::map::Args {
            document,
            input,
            target,
            source,
            into,
            json,
        }),
    }
}
