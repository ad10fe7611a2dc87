// KNX-Lens - headless client
//
// Parses the command line, sets up logging and hands over to the command
// handlers in `cli`. Config commands run before logging is initialized so
// their output stays clean.

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, WatchArgs};
use knx_lens::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Config { show, reset, path }) = cli.command {
        return cli::handle_config(show, reset, path);
    }

    let config = Config::from_env();

    // The guard must be kept alive for the duration of the program to ensure logs flush
    let _file_guard = knx_lens::logging::init(&config.logging);

    match cli.command.unwrap_or_else(|| Commands::Watch(WatchArgs::default())) {
        Commands::Watch(args) => {
            // One thread is enough: the engine is driven by a single timer
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(cli::handle_watch(config, args))
        }
        Commands::Stats(args) => cli::handle_stats(config, args),
        Commands::Filters { action } => cli::handle_filters(config, action),
        Commands::Config { .. } => Ok(()),
    }
}
