//! Change the role of a user account.
//!
//! ```text
//! manage-user --username alice --role librarian
//! ```

use anyhow::Context;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use librarium_server::{
    config::AppConfig, models::user::Role, repository::Repository, services::Services,
};

#[derive(Parser, Debug)]
#[command(name = "manage-user", version, about = "Manage Librarium user roles")]
struct Cli {
    /// Account to update
    #[arg(long)]
    username: String,

    /// New role: member or librarian
    #[arg(long, value_parser = parse_role)]
    role: Role,

    /// Database URL (defaults to the server configuration)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

fn parse_role(s: &str) -> Result<Role, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "librarium_server=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load().context("Failed to load configuration")?;
    let url = cli.database_url.unwrap_or_else(|| config.database.url.clone());

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .context("Failed to connect to database")?;

    let services = Services::new(Repository::new(pool, None), config.auth.clone());
    let user = services
        .users
        .set_role(&cli.username, cli.role)
        .await
        .with_context(|| format!("Failed to update user '{}'", cli.username))?;

    println!("{} is now {}", user.username, user.role);
    Ok(())
}
