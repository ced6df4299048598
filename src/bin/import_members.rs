use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use member_ingest::config::IngestConfig;
use member_ingest::db::run_migrations;
use member_ingest::ingest::ProgressSnapshot;
use member_ingest::models::BatchItem;
use member_ingest::service::IngestService;
use member_ingest::store::{InMemoryMemberStore, MemberStore, PgMemberStore};

#[derive(Parser, Debug)]
#[command(
    name = "import_members",
    about = "Bulk-import members into an organization from a JSON file"
)]
struct Args {
    /// Address of the organization receiving the members.
    #[arg(long)]
    org: String,

    /// JSON array of member records.
    #[arg(long)]
    file: PathBuf,

    /// Run as a background job and poll it instead of streaming progress.
    #[arg(long = "async")]
    run_async: bool,

    /// Delay between polls in `--async` mode.
    #[arg(long, default_value_t = 500)]
    poll_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let raw = std::fs::read_to_string(&args.file)?;
    let items: Vec<BatchItem> = serde_json::from_str(&raw)?;
    let config = IngestConfig::from_env()?;

    let store: Arc<dyn MemberStore> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&database_url)
                .await?;
            run_migrations(&pool).await?;
            Arc::new(PgMemberStore::new(pool))
        }
        Err(_) => {
            log::warn!("DATABASE_URL not set; dry run against an in-memory store");
            Arc::new(InMemoryMemberStore::new())
        }
    };

    let service = IngestService::from_config(&config, store)?;

    let last = if args.run_async {
        poll_job(&service, &args, items).await?
    } else {
        stream_batch(&service, &args, items).await?
    };

    println!(
        "Imported {}/{} members into '{}' with {} errors",
        last.added,
        last.total,
        args.org,
        last.errors.len()
    );

    if last.errors.iter().any(|e| e.starts_with("ingestion ")) {
        writeln!(io::stderr(), "error: batch did not run to completion")?;
        std::process::exit(1);
    }

    Ok(())
}

async fn stream_batch(
    service: &IngestService,
    args: &Args,
    items: Vec<BatchItem>,
) -> Result<ProgressSnapshot, Box<dyn std::error::Error>> {
    let mut stream = service.submit_batch(&args.org, items)?;
    while let Some(snapshot) = stream.next().await {
        report(&snapshot);
    }

    match stream.finish().await {
        Ok(snapshot) => Ok(snapshot),
        Err(err) => {
            writeln!(io::stderr(), "error: {err}")?;
            std::process::exit(1);
        }
    }
}

async fn poll_job(
    service: &IngestService,
    args: &Args,
    items: Vec<BatchItem>,
) -> Result<ProgressSnapshot, Box<dyn std::error::Error>> {
    let job_id = service.submit_batch_async(&args.org, items)?;
    log::info!("submitted job {}", job_id);

    let interval = Duration::from_millis(args.poll_interval_ms.max(1));
    loop {
        tokio::time::sleep(interval).await;
        match service.poll_job(&job_id) {
            Some(snapshot) if snapshot.is_complete() => {
                report(&snapshot);
                return Ok(snapshot);
            }
            Some(snapshot) => report(&snapshot),
            None => {
                writeln!(io::stderr(), "error: job {job_id} expired before completion was seen")?;
                std::process::exit(1);
            }
        }
    }
}

fn report(snapshot: &ProgressSnapshot) {
    log::info!(
        "{:>3}% {}/{} added, {} errors",
        snapshot.progress,
        snapshot.added,
        snapshot.total,
        snapshot.errors.len()
    );
}
