// src/main.rs
// LimboDancer.MCP - ontology-grounded MCP server

mod cli;

use std::process::ExitCode;

use clap::Parser;
use limbodancer::config::Settings;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use cli::{Cli, CliError, Commands, DbAction, KgAction, OntologyAction, VectorAction};

#[tokio::main]
async fn main() -> ExitCode {
    // Environment overrides from .env, never overriding real env vars.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Logs go to stderr everywhere; stdout is the wire in stdio mode.
    let log_level = match &cli.command {
        Some(Commands::Serve { verbose: true, .. }) => Level::DEBUG,
        // Quiet on stdio: the protocol owns stdout, logs stay terse.
        Some(Commands::Serve { stdio: true, .. }) => Level::WARN,
        Some(Commands::Serve { .. }) | None => Level::INFO,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let settings = Settings::from_env();

    let result: Result<(), CliError> = match cli.command {
        Some(Commands::Serve {
            stdio,
            tenant,
            package,
            channel,
            verbose: _,
        }) => {
            if stdio {
                cli::run_stdio_server(settings, tenant, package, channel).await
            } else {
                cli::run_http_server(settings).await
            }
        }
        None => cli::run_http_server(settings).await,
        Some(Commands::Db { action }) => match action {
            DbAction::Migrate => cli::db::run_migrate(&settings).await,
        },
        Some(Commands::Vector { action }) => match action {
            VectorAction::Init => cli::vector::run_init(&settings).await,
        },
        Some(Commands::Kg { action }) => match action {
            KgAction::Ping => cli::kg::run_ping().await,
        },
        Some(Commands::Ontology { action }) => match action {
            OntologyAction::Validate {
                tenant,
                package,
                channel,
            } => cli::ontology::run_validate(&settings, &tenant, &package, &channel).await,
            OntologyAction::Export {
                tenant,
                package,
                channel,
                format,
            } => cli::ontology::run_export(&settings, &tenant, &package, &channel, &format).await,
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if !matches!(err, CliError::Canceled) {
                eprintln!("[limbodancer] {err}");
            }
            ExitCode::from(err.exit_code())
        }
    }
}
