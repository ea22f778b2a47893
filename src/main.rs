//! `idgen`: allocate and inspect company and entity identifiers.

use clap::Parser;

mod cli;

fn main() -> anyhow::Result<()> {
    cli::Cli::parse().run()
}
