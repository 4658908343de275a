use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod client;
mod compare;
mod setup;

use client::GateClient;

#[derive(Parser)]
#[command(name = "facegate")]
#[command(version, about = "FaceGate face authentication: models, descriptors, daemon")]
struct Cli {
    /// Talk to a daemon on the session bus (development mode, also set by
    /// FACEGATE_SESSION_BUS)
    #[arg(long, global = true)]
    session: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the face models and store them in the local model directory
    Setup {
        /// Model directory (defaults to FACEGATE_MODEL_DIR or the data dir)
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
    /// Compare two descriptor files offline
    Compare {
        stored: PathBuf,
        candidate: PathBuf,
        #[arg(long, default_value_t = facegate_core::descriptor::DEFAULT_MATCH_THRESHOLD)]
        threshold: f32,
    },
    /// Show daemon status
    Status,
    /// Create a user (root only on the system bus)
    CreateUser {
        username: String,
        /// user, admin or super_admin
        #[arg(long, default_value = "user")]
        role: String,
    },
    /// Enroll a face descriptor file for a user (root only on the system bus)
    Enroll {
        username: String,
        descriptor: PathBuf,
    },
    /// Log in as an admin with a descriptor file
    Login {
        username: String,
        descriptor: PathBuf,
    },
    /// Show recent audit log entries
    Audit {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let session_bus = cli.session || std::env::var("FACEGATE_SESSION_BUS").is_ok();

    match cli.command {
        Commands::Setup { model_dir } => setup::run(model_dir).await,
        Commands::Compare {
            stored,
            candidate,
            threshold,
        } => {
            if !compare::run(&stored, &candidate, threshold)? {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Status => {
            let client = GateClient::connect(session_bus).await?;
            print_json(&client.status().await?);
            Ok(())
        }
        Commands::CreateUser { username, role } => {
            let client = GateClient::connect(session_bus).await?;
            let uid = client.create_user(&username, &role).await?;
            println!("created {username} ({role}): {uid}");
            Ok(())
        }
        Commands::Enroll {
            username,
            descriptor,
        } => {
            let descriptor = compare::read_descriptor(&descriptor)?;
            let client = GateClient::connect(session_bus).await?;
            client.enroll_face(&username, &descriptor.encode()).await?;
            println!("face enrolled for {username}");
            Ok(())
        }
        Commands::Login {
            username,
            descriptor,
        } => {
            let descriptor = compare::read_descriptor(&descriptor)?;
            let client = GateClient::connect(session_bus).await?;
            print_json(&client.login_admin(&username, &descriptor.encode()).await?);
            Ok(())
        }
        Commands::Audit { limit } => {
            let client = GateClient::connect(session_bus).await?;
            print_json(&client.recent_audit(limit).await?);
            Ok(())
        }
    }
}

/// Pretty-print a JSON reply, falling back to the raw text.
fn print_json(raw: &str) {
    match serde_json::from_str::<serde_json::Value>(raw)
        .and_then(|v| serde_json::to_string_pretty(&v))
    {
        Ok(pretty) => println!("{pretty}"),
        Err(_) => println!("{raw}"),
    }
}
