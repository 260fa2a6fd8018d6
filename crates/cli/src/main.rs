//! MobiMarket CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! mm-cli migrate
//!
//! # Insert the sample catalog (skipped when products already exist)
//! mm-cli seed
//!
//! # Give a user the admin role
//! mm-cli user promote 3
//! ```
//!
//! # Environment Variables
//!
//! - `MOBIMARKET_DATABASE_URL` - `PostgreSQL` connection string
//!   (falls back to `DATABASE_URL`)

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "mm-cli")]
#[command(author, version, about = "MobiMarket CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Insert a sample catalog
    Seed {
        /// Seed even if the catalog already has products
        #[arg(long)]
        force: bool,
    },
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Give a user the admin role
    Promote {
        /// User id
        id: i32,
    },
    /// Return an admin to the regular user role
    Demote {
        /// User id
        id: i32,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed { force } => commands::seed::catalog(force).await?,
        Commands::User { action } => match action {
            UserAction::Promote { id } => commands::user::promote(id).await?,
            UserAction::Demote { id } => commands::user::demote(id).await?,
        },
    }
    Ok(())
}
