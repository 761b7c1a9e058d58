// src/cli/mod.rs
// CLI surface: serve, db migrate, vector init, kg ping, ontology verbs.

use clap::{Parser, Subcommand};

pub mod db;
pub mod kg;
pub mod ontology;
pub mod serve;
pub mod vector;

pub use serve::{run_http_server, run_stdio_server};

/// Exit codes: 0 success, 1 generic, 3 dependency unavailable, 4 expected
/// endpoint missing, 130 canceled.
#[derive(Debug)]
pub enum CliError {
    Generic(anyhow::Error),
    DependencyUnavailable(String),
    EndpointMissing(String),
    Canceled,
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Generic(_) => 1,
            CliError::DependencyUnavailable(_) => 3,
            CliError::EndpointMissing(_) => 4,
            CliError::Canceled => 130,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Generic(e) => write!(f, "{e:#}"),
            CliError::DependencyUnavailable(dep) => write!(f, "dependency unavailable: {dep}"),
            CliError::EndpointMissing(what) => write!(f, "expected endpoint missing: {what}"),
            CliError::Canceled => write!(f, "canceled"),
        }
    }
}

impl From<anyhow::Error> for CliError {
    fn from(e: anyhow::Error) -> Self {
        CliError::Generic(e)
    }
}

#[derive(Parser)]
#[command(name = "limbodancer")]
#[command(about = "Ontology-grounded MCP server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the server (HTTP by default, line-delimited stdio with --stdio)
    Serve {
        /// Speak newline-delimited JSON-RPC on stdin/stdout
        #[arg(long)]
        stdio: bool,

        /// Tenant pinned for stdio mode (or LIMBO_TENANT)
        #[arg(long, env = "LIMBO_TENANT")]
        tenant: Option<String>,

        /// Package for the pinned scope (or LIMBO_PACKAGE)
        #[arg(long, env = "LIMBO_PACKAGE")]
        package: Option<String>,

        /// Channel for the pinned scope (or LIMBO_CHANNEL)
        #[arg(long, env = "LIMBO_CHANNEL")]
        channel: Option<String>,

        /// Verbose logging to stderr
        #[arg(short, long)]
        verbose: bool,
    },

    /// History database maintenance
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Vector index maintenance
    Vector {
        #[command(subcommand)]
        action: VectorAction,
    },

    /// Knowledge graph connectivity
    Kg {
        #[command(subcommand)]
        action: KgAction,
    },

    /// Ontology catalog operations
    Ontology {
        #[command(subcommand)]
        action: OntologyAction,
    },
}

#[derive(Subcommand)]
pub enum DbAction {
    /// Apply the history store schema
    Migrate,
}

#[derive(Subcommand)]
pub enum VectorAction {
    /// Create the vector collection if it does not exist
    Init,
}

#[derive(Subcommand)]
pub enum KgAction {
    /// Probe graph store connectivity
    Ping,
}

#[derive(Subcommand)]
pub enum OntologyAction {
    /// Validate a scope's catalog
    Validate {
        #[arg(long)]
        tenant: String,
        #[arg(long, default_value = "core")]
        package: String,
        #[arg(long, default_value = "main")]
        channel: String,
    },
    /// Export a scope's catalog to stdout
    Export {
        #[arg(long)]
        tenant: String,
        #[arg(long, default_value = "core")]
        package: String,
        #[arg(long, default_value = "main")]
        channel: String,
        /// jsonld or turtle
        #[arg(long, default_value = "jsonld")]
        format: String,
    },
}
