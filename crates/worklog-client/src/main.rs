//! Worklog client binary.

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use worklog_client::{resolve_token, send_update, ClientError, UpdateRequest, TOKEN_ENV};

#[derive(Parser)]
#[command(name = "worklog-client", about = "Post a status update to a worklog server")]
struct Cli {
    /// Server address, `host:port` or `:port`
    #[arg(long, default_value = ":8080")]
    addr: String,
    /// Auth token; falls back to the AUTH_TOKEN environment variable
    #[arg(long)]
    token: Option<String>,
    /// Message to send
    #[arg(short = 'm', default_value = "")]
    message: String,
    /// Comma-separated list of tags
    #[arg(short = 't')]
    tags: Option<String>,
}

async fn run(cli: Cli) -> Result<(), ClientError> {
    let token = resolve_token(cli.token, std::env::var(TOKEN_ENV).ok())?;
    let request = UpdateRequest::new(cli.message, cli.tags.as_deref())?;

    let response = send_update(&cli.addr, &token, &request).await?;
    tracing::info!(status = %response.status, body = response.body.trim_end(), "response");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
