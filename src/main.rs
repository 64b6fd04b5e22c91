use std::io::IsTerminal;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use guidelight::banner::{BannerInfo, print_banner, status_line};
use guidelight::consts::{DEFAULT_CONNECT_TIMEOUT, ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_URL};
use guidelight::spinner;
use guidelight::{Client, Config, Payload};

#[derive(Parser)]
#[command(name = "guidelight", version, about = "Talk to an Endeavor server.")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Base URL of the Endeavor server
    #[arg(long, env = ENV_URL, global = true)]
    url: Option<String>,

    /// Client ID of your API key
    #[arg(long, env = ENV_CLIENT_ID, global = true)]
    client_id: Option<String>,

    /// Client secret of your API key
    #[arg(long, env = ENV_CLIENT_SECRET, hide_env_values = true, global = true)]
    client_secret: Option<String>,

    /// Request timeout in seconds
    #[arg(short, long, default_value_t = 30, global = true)]
    timeout: u64,

    /// Retries when a connection cannot be established
    #[arg(long, default_value_t = 0, global = true)]
    retries: u32,

    /// Log requests and token exchanges (overridden by RUST_LOG)
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Connect and print the server status (default)
    Status {
        /// Print the reply body as received
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Authenticated GET against a /v1 endpoint, e.g. `guidelight get agents`
    Get {
        #[arg(required = true)]
        endpoint: Vec<String>,
    },
    /// Show the resolved endpoint and whether the API key is accepted
    Whoami,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = build_config(&cli)?;

    match cli.command.unwrap_or(Command::Status { json: false }) {
        Command::Status { json } => {
            let client = spinner::wrap("connecting", guidelight::connect_with(config))
                .await
                .context("failed to connect to Endeavor")?;
            let status = spinner::wrap("checking status", client.status())
                .await
                .context("status request failed")?;
            if json {
                print_payload(status.raw)?;
            } else {
                println!("{}: {}", client.host(), status_line(&status));
            }
        }
        Command::Get { endpoint } => {
            let client = Client::new(config)?;
            let parts: Vec<&str> = endpoint.iter().map(String::as_str).collect();
            let payload = spinner::wrap("requesting", client.get(&parts, &[]))
                .await
                .with_context(|| format!("GET {} failed", client.endpoint(&parts, &[])))?;
            print_payload(payload)?;
        }
        Command::Whoami => {
            let client = Client::new(config)?;
            let auth_status = match spinner::wrap("authenticating", client.authenticate()).await {
                Ok(()) => "authenticated ✓".to_string(),
                Err(e) => format!("✗ {e}"),
            };
            print_banner(&BannerInfo {
                endpoint: client.base_url().as_str(),
                host: client.host(),
                client_id: &client.config().client_id,
                auth_status: &auth_status,
            });
        }
    }

    Ok(())
}

/// Configuration comes from flags, which fall back to the environment.
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let config = Config::from_lookup(|key| match key {
        ENV_URL => cli.url.clone(),
        ENV_CLIENT_ID => cli.client_id.clone(),
        ENV_CLIENT_SECRET => cli.client_secret.clone(),
        _ => None,
    })
    .context("incomplete Endeavor configuration")?;

    Ok(config
        .with_timeouts(DEFAULT_CONNECT_TIMEOUT, Duration::from_secs(cli.timeout))
        .with_max_retries(cli.retries))
}

fn print_payload(payload: Payload) -> anyhow::Result<()> {
    match payload {
        Payload::Empty => eprintln!("(no content)"),
        Payload::Json(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Payload::Bytes(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "guidelight=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .try_init();
}
