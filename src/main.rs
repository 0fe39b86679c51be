//! resilient-client CLI
//!
//! Session management and ad-hoc requests against a configured API, using a
//! file-backed session so a login survives between invocations.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

use resilient_client::config::{load_config, ClientConfig};
use resilient_client::observability::{logging, metrics};
use resilient_client::resilience::with_retry;
use resilient_client::session::Credentials;
use resilient_client::transport::RequestOptions;
use resilient_client::ApiClient;

#[derive(Parser)]
#[command(name = "resilient-client")]
#[command(about = "Session and request CLI for the resilient API client", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the API base URL
    #[arg(short, long)]
    url: Option<String>,

    /// Session file, used when the configuration sets no storage path
    #[arg(long, default_value = ".resilient-client/session.json")]
    session_file: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and persist the session
    Login {
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// End the session locally and remotely
    Logout,
    /// Show the current session
    Status,
    /// Exchange the session token for a fresh one
    Refresh,
    /// GET an endpoint with the session token, retrying transient failures
    Get { endpoint: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };
    if let Some(url) = cli.url {
        config.api.base_url = url;
    }
    if config.session.storage_path.is_none() {
        config.session.storage_path = Some(cli.session_file);
    }

    logging::init_logging(&config.observability);

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let client = ApiClient::new(config)?;
    let session = client.session();

    match cli.command {
        Commands::Login { email, password } => {
            let record = session.login(&Credentials::new(email, password)).await?;
            println!("Logged in as {}", describe_user(&record.user.0));
        }
        Commands::Logout => {
            if session.is_authenticated() {
                session.logout().await;
                println!("Logged out");
            } else {
                println!("Not logged in");
            }
        }
        Commands::Status => match session.record() {
            Some(record) => {
                let max_age = chrono::Duration::seconds(client.config().session.max_age_secs as i64);
                println!("State:      {:?}", session.state());
                println!("User:       {}", describe_user(&record.user.0));
                println!("Issued at:  {}", record.issued_at.to_rfc3339());
                println!("Expires at: {}", (record.issued_at + max_age).to_rfc3339());
            }
            None => println!("State:      {:?}", session.state()),
        },
        Commands::Refresh => {
            session.refresh().await?;
            println!("Session refreshed");
        }
        Commands::Get { endpoint } => {
            let transport = client.transport();
            let value: Value = with_retry(
                || transport.send(&endpoint, RequestOptions::get()),
                &client.retry_policy(),
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}

fn describe_user(user: &Value) -> String {
    ["email", "name", "id"]
        .iter()
        .find_map(|key| match user.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| user.to_string())
}
