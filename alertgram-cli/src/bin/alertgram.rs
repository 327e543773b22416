use std::path::PathBuf;

use alertgram_cli::{
    input::{CliError, CliResult, load_config, load_event, partial_show_secret},
    output::{OutputFormat, format_reports, format_routes},
};
use alertgram_core::{DestinationRegistry, Relay, route};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(author, version, about = "Route Sentry alerts to Telegram chats", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the relay configuration
    #[arg(
        short,
        long,
        default_value = "alertgram.json",
        env = "ALERTGRAM_CONFIG",
        global = true
    )]
    config: PathBuf,

    /// Default bot token, overrides the one in the configuration
    #[arg(long, env = "ALERTGRAM_API_TOKEN", hide_env_values = true, global = true)]
    api_token: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the configuration and list the destinations it defines
    Validate,

    /// Show which destinations an event would be sent to, without sending
    Route(EventArgs),

    /// Deliver an event to every matching destination
    Send(EventArgs),
}

#[derive(Parser)]
struct EventArgs {
    /// Event JSON file, `-` for stdin
    #[arg(short, long)]
    event: PathBuf,
}

fn validate(cli: &Cli) -> CliResult<()> {
    let config = load_config(&cli.config, cli.api_token.as_deref())?;
    let registry = DestinationRegistry::load(&config)?;

    println!(
        "Configuration OK: {} destination(s)",
        registry.len()
    );
    for destination in registry.all() {
        println!(
            "  {}\tbot {} ({}){}",
            destination.label(),
            partial_show_secret(&destination.bot.api_token),
            destination.bot.api_origin,
            if destination.fallback { "\tfallback" } else { "" }
        );
    }
    Ok(())
}

fn dry_run(cli: &Cli, args: &EventArgs) -> CliResult<()> {
    let config = load_config(&cli.config, cli.api_token.as_deref())?;
    let registry = DestinationRegistry::load(&config)?;
    let event = load_event(&args.event)?;

    let routed = route(&event, registry.all());
    debug!(matched = routed.len(), "Routed event");
    println!("{}", format_routes(&routed, cli.output));
    Ok(())
}

async fn send(cli: &Cli, args: &EventArgs) -> CliResult<()> {
    let config = load_config(&cli.config, cli.api_token.as_deref())?;
    let relay = Relay::from_config(&config)?;
    let event = load_event(&args.event)?;

    let reports = relay.process(&event).await;
    println!("{}", format_reports(&reports, cli.output));

    let failed = reports.iter().filter(|r| !r.result.is_delivered()).count();
    if failed > 0 {
        return Err(CliError::DeliveryFailed {
            failed,
            total: reports.len(),
        });
    }
    info!(delivered = reports.len(), "All deliveries succeeded");
    Ok(())
}

async fn run(cli: &Cli) -> CliResult<()> {
    match &cli.command {
        Commands::Validate => validate(cli),
        Commands::Route(args) => dry_run(cli, args),
        Commands::Send(args) => send(cli, args).await,
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenv::dotenv();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
