use std::env;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing_subscriber::EnvFilter;

use owlery::{config::AppConfig, db, onboarding, workflow};

const USAGE: &str = "Usage: maintenance <migrate|purge-expired-keys|check-stage-logs>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    let command = match args.next() {
        Some(command) => command,
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    };

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        command = %command,
        database_url = %config.redacted_database_url(),
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    match command.as_str() {
        "migrate" => {
            let applied = db::run_migrations(&mut conn)?;
            println!("Applied {} migration(s).", applied.len());
            for version in applied {
                println!("  {version}");
            }
        }
        "purge-expired-keys" => {
            let removed = onboarding::purge_expired(&mut conn, Utc::now().naive_utc())
                .context("failed to purge onboarding keys")?;
            tracing::info!(removed, "purged expired onboarding keys");
            println!("Removed {removed} expired onboarding key(s).");
        }
        "check-stage-logs" => {
            let broken = workflow::inconsistent_cases(&mut conn)
                .context("failed to inspect stage logs")?;
            if broken.is_empty() {
                println!("All stage logs are consistent.");
            } else {
                tracing::warn!(cases = broken.len(), "cases with inconsistent stage logs");
                println!("{} case(s) have inconsistent stage logs:", broken.len());
                for case_id in &broken {
                    println!("  {case_id}");
                }
                std::process::exit(2);
            }
        }
        other => {
            eprintln!("Unknown command: {other}\n{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
