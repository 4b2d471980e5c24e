use anyhow::Result;
use clap::{Parser, Subcommand};
use testenv::cli::{self, CheckOptions, UpOptions};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(
    name = "testenv",
    version,
    about = "Provision container environments for integration tests"
)]
struct Cli {
    /// Container engine binary (docker, or a compatible CLI such as podman)
    #[arg(long, env = "TESTENV_ENGINE", default_value = "docker", global = true)]
    engine: String,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the project and its test cases, then tear them down on Enter
    Up(UpOptions),
    /// Parse and validate an environment file
    Check(CheckOptions),
    /// Print a host port the engine considers free
    FreePort,
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let filter = if args.verbose {
        "testenv=debug"
    } else {
        "testenv=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match args.command {
        Commands::Up(options) => cli::up::run(options, cli::engine(&args.engine)?),
        Commands::Check(options) => cli::check::run(options),
        Commands::FreePort => cli::free_port::run(cli::engine(&args.engine)?),
    }
}
