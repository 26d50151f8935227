//! CLI entry point.
//!
//! Loads `.env`, parses arguments, initialises logging, composes the
//! adapters through [`bootstrap`] and dispatches to a handler.

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use gemi_cli::handlers::setup::SetupArgs;
use gemi_cli::{Cli, CliConfig, CliError, Commands, bootstrap, handlers};

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .ok();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let Some(command) = cli.command.as_ref() else {
        Cli::command().print_help().ok();
        return Ok(());
    };

    let settings = cli.settings()?;
    let (installer, installer_args) = match command {
        Commands::Setup {
            installer,
            installer_args,
            ..
        } => (installer.clone(), installer_args.clone()),
        _ => (None, Vec::new()),
    };
    let ctx = bootstrap(CliConfig {
        settings,
        installer,
        installer_args,
    });

    match command {
        Commands::Detect => handlers::detect::execute(&ctx),
        Commands::Paths => {
            handlers::paths::execute(&ctx);
            Ok(())
        }
        Commands::Probe { timeout_ms, json } => {
            handlers::probe::execute(&ctx, *timeout_ms, *json).await
        }
        Commands::Setup { watch, json, .. } => {
            let args = SetupArgs {
                watch: *watch,
                json: *json,
            };
            handlers::setup::execute(&ctx, &args).await
        }
        Commands::Load => handlers::load::execute(&ctx).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables before clap reads them
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}
