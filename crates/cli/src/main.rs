//! storehouse command-line entry point.
//!
//! Runs single cache operations and sweeps against the configured bucket.
//! Command output goes to stdout as JSON; logs go to stderr.

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::{Map, Value, json};
use storehouse_core::cache::entry::{CREATED_AT, EXPIRES_AT};
use storehouse_core::{AppConfig, CacheConnection, CacheEntry, Error, SweepReport};
use tracing_subscriber::EnvFilter;

mod args;

use args::{Cli, Commands, WriteArgs};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if let Some(bucket) = cli.bucket {
        config.bucket = bucket;
        config.validate()?;
    }

    tracing::debug!(bucket = %config.bucket, command = ?cli.command, "running storehouse command");

    let conn = CacheConnection::open(&config)
        .await
        .with_context(|| format!("opening bucket {}", config.bucket))?;

    let output = match cli.command {
        Commands::Read(args) => entry_json(conn.read(&args.key, args.raw).await?),
        Commands::Write(args) => {
            let entry = build_entry(&args, chrono::Utc::now().timestamp())?;
            match conn.write(&args.key.key, &entry, args.key.raw).await? {
                Some(record) => json!({ "key": record.key, "indexes": record.indexes }),
                None => bail!("write to {} was refused", args.key.key),
            }
        }
        Commands::Delete(args) => entry_json(conn.delete(&args.key, args.raw).await?),
        Commands::Expire(args) => match conn.expire(&args.key, args.raw).await? {
            Some(record) => json!({ "key": record.key, "indexes": record.indexes }),
            None => bail!("expire of {} was refused", args.key),
        },
        Commands::Clean(args) => report_json(conn.clean(args.namespace.as_deref()).await?),
        Commands::Clear(args) => report_json(conn.clear(args.namespace.as_deref()).await?),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

/// Parse the payload of a write and fill in missing timestamps.
fn build_entry(args: &WriteArgs, now: i64) -> Result<CacheEntry, Error> {
    let fields: Map<String, Value> = match serde_json::from_str(&args.json) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err(Error::InvalidInput("payload must be a JSON object".to_string())),
        Err(e) => return Err(Error::InvalidInput(format!("payload is not valid JSON: {e}"))),
    };

    let entry = CacheEntry::from_fields(args.key.key.clone(), fields);
    let created_at = if entry.get(CREATED_AT).is_some() { entry.created_at() } else { now };
    let expires_at = if entry.get(EXPIRES_AT).is_some() { entry.expires_at() } else { now + args.ttl };

    Ok(CacheEntry::new(args.key.key.clone(), entry.payload(), created_at, expires_at))
}

fn entry_json(entry: CacheEntry) -> Value {
    Value::Object(entry.into_fields())
}

fn report_json(report: SweepReport) -> Value {
    json!({
        "windows": report.windows,
        "matched": report.matched,
        "deleted": report.deleted,
        "expired": report.expired,
    })
}
