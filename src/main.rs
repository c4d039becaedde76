mod app;
mod cli;
mod config;
mod fetch;
mod inventory;
mod notice;
mod remote;
mod selection;
mod ui;

use anyhow::Result;

fn main() -> Result<()> {
    cli::run()
}
