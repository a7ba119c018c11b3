//! Fill a database with a bulk catalogue for local development.
//!
//! ```text
//! seed --authors 50 --books 500
//! ```
//!
//! Does nothing when the catalogue already holds more than 100 books,
//! unless `--force` is given.

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use rand::Rng;
use sqlx::postgres::PgPoolOptions;

use librarium_server::config::AppConfig;

const POPULATED_THRESHOLD: i64 = 100;

#[derive(Parser, Debug)]
#[command(name = "seed", version, about = "Seed Librarium with sample authors and books")]
struct Cli {
    /// Number of authors to create
    #[arg(long, default_value_t = 50)]
    authors: u32,

    /// Number of books to create
    #[arg(long, default_value_t = 500)]
    books: u32,

    /// Seed even if the catalogue is already populated
    #[arg(long)]
    force: bool,

    /// Database URL (defaults to the server configuration)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

/// ISBN-13 in the 978-3-16 range, unique per `index`
fn seeded_isbn(index: u32) -> String {
    let body = format!("978316{:06}", index % 1_000_000);
    let sum: u32 = body
        .chars()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { d } else { d * 3 })
        .sum();
    format!("{}{}", body, (10 - sum % 10) % 10)
}

fn random_date(rng: &mut impl Rng) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        rng.gen_range(1974..=2023),
        rng.gen_range(1..=12),
        rng.gen_range(1..=28),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seed=info,librarium_server=info".into()),
        )
        .init();

    let cli = Cli::parse();
    if cli.authors == 0 && cli.books > 0 {
        anyhow::bail!("Books need at least one author");
    }

    let config = AppConfig::load().context("Failed to load configuration")?;
    let url = cli.database_url.unwrap_or_else(|| config.database.url.clone());

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
        .fetch_one(&pool)
        .await
        .context("Failed to count books")?;
    if existing > POPULATED_THRESHOLD && !cli.force {
        tracing::info!("Catalogue already holds {} books, nothing to seed", existing);
        return Ok(());
    }

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    let mut rng = rand::thread_rng();

    let mut author_ids = Vec::with_capacity(cli.authors as usize);
    for i in 1..=cli.authors {
        let id: i32 = sqlx::query_scalar("INSERT INTO authors (name, bio) VALUES ($1, $2) RETURNING id")
            .bind(format!("Author {}", i))
            .bind(format!("This is the biography for Author {}.", i))
            .fetch_one(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert author {}", i))?;
        author_ids.push(id);
    }
    tracing::info!("{} authors seeded", author_ids.len());

    for i in 1..=cli.books {
        let published = random_date(&mut rng).context("Generated an invalid date")?;
        let author_id = author_ids[rng.gen_range(0..author_ids.len())];

        sqlx::query(
            r#"
            INSERT INTO books (title, published_date, isbn, stock, author_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (isbn) DO NOTHING
            "#,
        )
        .bind(format!("Book Title {}", i))
        .bind(published)
        .bind(seeded_isbn(i))
        .bind(rng.gen_range(0..20_i32))
        .bind(author_id)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert book {}", i))?;
    }
    tracing::info!("{} books seeded", cli.books);

    tx.commit().await.context("Failed to commit seed data")?;
    tracing::info!("Database seeding complete");
    Ok(())
}
