use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{load_settings, ClientEvent, Coordinator, Product};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Drives the client from a terminal. Views and events are printed as JSON
/// lines on stdout; logs go to stderr.
#[derive(Parser, Debug)]
struct Cli {
    /// Settings file; `client.toml` in the working directory when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    api_base_url: Option<String>,
    #[arg(long)]
    product: Option<Product>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolves a location, e.g. `/product/42`.
    Open { path: String },
    Login {
        username: String,
        #[arg(long)]
        password: String,
    },
    Register {
        username: String,
        email: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    /// Prints the persisted identity, re-checked against the backend.
    Whoami,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings(cli.config.as_deref()).context("failed to load settings")?;
    if let Some(api_base_url) = cli.api_base_url {
        settings.api_base_url = api_base_url;
    }
    if let Some(product) = cli.product {
        settings.product = product;
    }
    info!(api = %settings.api_base_url, product = ?settings.product, "console starting");

    let coordinator = Coordinator::open(settings).await?;
    let mut events = coordinator.subscribe_events();
    let session = coordinator.session().load_persisted().await;

    match cli.command {
        Command::Open { path } => {
            let state = coordinator.navigate(&path).await;
            print_events(&mut events)?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Command::Login { username, password } => {
            let response = coordinator.login(&username, &password).await;
            print_events(&mut events)?;
            if !response.is_success() {
                anyhow::bail!(
                    "login failed: {}",
                    response.message().unwrap_or("request failed")
                );
            }
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            let response = coordinator.register(&username, &email, &password).await;
            print_events(&mut events)?;
            if !response.is_success() {
                anyhow::bail!(
                    "register failed: {}",
                    response.message().unwrap_or("request failed")
                );
            }
        }
        Command::Logout => {
            coordinator.logout().await;
            print_events(&mut events)?;
        }
        Command::Whoami => {
            if !session.is_authenticated() {
                println!("not logged in");
                return Ok(());
            }
            if !coordinator.refresh_current_user().await {
                warn!("could not refresh the current user");
            }
            print_events(&mut events)?;
            match coordinator.session().snapshot().await.user() {
                Some(user) => println!("{}", serde_json::to_string_pretty(user)?),
                None => println!("not logged in"),
            }
        }
    }

    Ok(())
}

fn print_events(events: &mut broadcast::Receiver<ClientEvent>) -> Result<()> {
    loop {
        match events.try_recv() {
            Ok(event) => println!("{}", serde_json::to_string(&event)?),
            Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "dropped events"),
            Err(TryRecvError::Empty | TryRecvError::Closed) => return Ok(()),
        }
    }
}
