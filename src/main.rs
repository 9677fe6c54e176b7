mod cli;
mod color;
mod db;
mod error;
mod rate;
mod report;
mod tracking;
mod types;
mod week;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Logs go to stderr so command output stays clean (controlled by RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli_opts = cli::Cli::parse();
    let db_path = cli_opts.db.clone().unwrap_or_else(db::default_db_path);
    let conn = db::init(&db_path)?;
    cli::run(cli_opts, &conn)
}
