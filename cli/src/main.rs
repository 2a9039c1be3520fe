/*!

This is the command line interface for inspecting the provider catalog, previewing how tests are
parametrized and setting providers up on an appliance.

!*/

mod collect;
mod list;
mod runner;
mod setup;
mod templates;

use anyhow::Result;
use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;
use runner::{RunnerArgs, Workspace};
use std::path::PathBuf;

/// The command line interface for the provider harness.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Args {
    /// Set logging verbosity [trace|debug|info|warn|error]. If the environment variable `RUST_LOG`
    /// is present, it overrides the default logging behavior. See https://docs.rs/env_logger/latest
    #[clap(long = "log-level", default_value = "info")]
    log_level: LevelFilter,
    /// Catalog file. Repeat to layer files; later files override earlier ones key by key.
    #[clap(long = "conf", required = true)]
    conf: Vec<PathBuf>,
    /// Credential store file.
    #[clap(long = "credentials")]
    credentials: Option<PathBuf>,
    #[clap(flatten)]
    runner: RunnerArgs,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// List catalog providers matching filters.
    List(list::List),
    /// Show how a test with the given provider marker would be parametrized.
    Collect(collect::Collect),
    /// Load the usable templates of every provider from the tracker or the cache.
    Templates(templates::Templates),
    /// Set up a provider on an appliance, or clear providers from it.
    Setup(setup::Setup),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(args.log_level);
    if let Err(e) = run(args).await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let workspace = Workspace::load(&args.conf, args.credentials.as_deref(), args.runner)?;
    match args.command {
        Command::List(list) => list.run(&workspace),
        Command::Collect(collect) => collect.run(&workspace),
        Command::Templates(templates) => templates.run(&workspace).await,
        Command::Setup(setup) => setup.run(workspace).await,
    }
}

/// Initialize the logger with the value passed by `--log-level` (or its default) when the
/// `RUST_LOG` environment variable is not present. If present, the `RUST_LOG` environment variable
/// overrides `--log-level`/`level`.
fn init_logger(level: LevelFilter) {
    match std::env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        Some(_) => {
            // RUST_LOG exists; env_logger will use it.
            Builder::from_default_env().init();
        }
        None => {
            // RUST_LOG does not exist; use the level for this crate and the harness libraries.
            let mut builder = Builder::new();
            for module in [
                env!("CARGO_CRATE_NAME"),
                "provsys_model",
                "provider_agent",
                "test_agent",
            ] {
                builder.filter(Some(module), level);
            }
            builder.init();
        }
    }
}
