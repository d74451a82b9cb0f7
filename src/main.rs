//! Simmer CLI: browse HN lists and find discussions that are still simmering.

use anyhow::Result;
use clap::Parser;
use simmer::engine::arg_parser::Cli;
use simmer::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
