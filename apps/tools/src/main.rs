use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shared::domain::User;
use storage::{keys, prepare_database_url, SessionStore, Storage, DEFAULT_DATABASE_URL};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = DEFAULT_DATABASE_URL)]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lists every persisted key.
    Show {
        /// Print the token in full instead of a prefix.
        #[arg(long)]
        reveal: bool,
    },
    /// Prints the persisted user.
    Whoami,
    /// Erases the persisted session.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let database_url = prepare_database_url(&cli.database_url)?;
    let storage = Storage::new(&database_url).await?;
    storage.health_check().await?;

    match cli.command {
        Command::Show { reveal } => {
            let entries = storage.entries().await?;
            if entries.is_empty() {
                println!("no persisted session");
            }
            for entry in entries {
                let value = if entry.key == keys::AUTH_TOKEN && !reveal {
                    mask(&entry.value)
                } else {
                    entry.value
                };
                println!("{} = {} (updated {})", entry.key, value, entry.updated_at);
            }
        }
        Command::Whoami => match storage.get(keys::CURRENT_USER).await? {
            Some(raw) => {
                let user: User =
                    serde_json::from_str(&raw).context("persisted user is unreadable")?;
                println!("user_id={} username={} role={}", user.id, user.username, user.role);
            }
            None => println!("not logged in"),
        },
        Command::Clear => {
            storage.remove(&keys::ALL).await?;
            println!("cleared persisted session in {database_url}");
        }
    }

    Ok(())
}

fn mask(token: &str) -> String {
    let prefix: String = token.chars().take(4).collect();
    format!("{prefix}...")
}
