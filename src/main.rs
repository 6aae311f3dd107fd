mod cli;
mod models;
mod services;

use cli::cli;
use services::shared::logger::init_logger;

fn run_tallybox() -> anyhow::Result<()> {
    init_logger();
    cli()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    run_tallybox()?;
    Ok(())
}
