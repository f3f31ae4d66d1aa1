//! Pawdia CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Apply database migrations
//! pawdia migrate
//!
//! # Insert the default catalogue
//! pawdia seed products
//!
//! # Grant or revoke admin access
//! pawdia admin grant --email owner@example.com
//! pawdia admin revoke --email owner@example.com
//!
//! # Add (or remove, with a negative amount) credits
//! pawdia credits add --email user@example.com --amount 25 --reason "support goodwill"
//!
//! # Delete expired verification short links
//! pawdia short-links purge
//! ```
//!
//! All commands read `DATABASE_URL` from the environment (or `.env`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "pawdia")]
#[command(author, version, about = "Pawdia CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Seed the database
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
    /// Manage admin access
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Manage user credits
    Credits {
        #[command(subcommand)]
        action: CreditsAction,
    },
    /// Manage verification short links
    ShortLinks {
        #[command(subcommand)]
        action: ShortLinksAction,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Insert the default portrait catalogue (skips existing names)
    Products,
}

#[derive(Subcommand)]
enum AdminAction {
    /// Give a user admin access
    Grant {
        /// User email address
        #[arg(short, long)]
        email: String,
    },
    /// Remove a user's admin access
    Revoke {
        /// User email address
        #[arg(short, long)]
        email: String,
    },
}

#[derive(Subcommand)]
enum CreditsAction {
    /// Adjust a user's balance (negative amounts remove credits)
    Add {
        /// User email address
        #[arg(short, long)]
        email: String,

        /// Credits to add
        #[arg(short, long, allow_negative_numbers = true)]
        amount: i32,

        /// Note stored on the ledger entry
        #[arg(short, long)]
        reason: Option<String>,
    },
}

#[derive(Subcommand)]
enum ShortLinksAction {
    /// Delete expired short links
    Purge,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed { target } => match target {
            SeedTarget::Products => {
                commands::seed::products().await?;
            }
        },
        Commands::Admin { action } => match action {
            AdminAction::Grant { email } => commands::admin::set_admin(&email, true).await?,
            AdminAction::Revoke { email } => commands::admin::set_admin(&email, false).await?,
        },
        Commands::Credits { action } => match action {
            CreditsAction::Add {
                email,
                amount,
                reason,
            } => {
                commands::credits::add(&email, amount, reason.as_deref()).await?;
            }
        },
        Commands::ShortLinks { action } => match action {
            ShortLinksAction::Purge => {
                commands::short_links::purge().await?;
            }
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_negative_credit_amount() {
        let cli = Cli::try_parse_from([
            "pawdia", "credits", "add", "--email", "a@b.co", "--amount", "-5",
        ]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Credits {
                action: CreditsAction::Add { amount: -5, .. }
            })
        ));
    }

    #[test]
    fn test_short_links_subcommand_name() {
        assert!(Cli::try_parse_from(["pawdia", "short-links", "purge"]).is_ok());
    }
}
