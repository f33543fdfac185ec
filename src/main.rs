use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use todoist_mcp::{config::ApiConfig, mcp, TodoistClient};

#[derive(Parser)]
#[command(name = "todoist-mcp")]
#[command(about = "MCP server exposing Todoist to AI assistants")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server via stdio (default)
    Mcp,
    /// Verify the API token with one authenticated call
    Check,
}

/// Initialize tracing with output to stderr; stdout carries the protocol.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "todoist_mcp=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = ApiConfig::from_env();
    tracing::debug!(base_url = %config.base_url, "Loaded configuration");
    let client = TodoistClient::new(config)?;

    match cli.command.unwrap_or(Commands::Mcp) {
        Commands::Mcp => {
            if !client.has_token() {
                tracing::warn!("TODOIST_API_TOKEN is not set; tool calls will fail until it is");
            }
            mcp::run_stdio_server(client).await?;
        }
        Commands::Check => {
            let page = client.list_projects(None).await?;
            println!(
                "Token OK: {} project(s) on the first page",
                page.results.len()
            );
            for status in client.rate_limit_status() {
                println!(
                    "{:<5} {} request(s) left, resets at {}",
                    status.class.as_str(),
                    status.remaining,
                    status.reset_time.to_rfc3339()
                );
            }
        }
    }

    Ok(())
}
