//! Command-line surface for `storehouse`.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "storehouse", version, about = "Page cache maintenance for bucketed key/value stores", long_about = None)]
pub struct Cli {
    /// Bucket to operate on (overrides STOREHOUSE_BUCKET and the config file)
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the entry stored under a key
    Read(KeyArgs),
    /// Store a JSON object under a key
    Write(WriteArgs),
    /// Delete a key and print the entry it held
    Delete(KeyArgs),
    /// Mark a key as expired without deleting it
    Expire(KeyArgs),
    /// Delete expired entries and soft-expire the rest
    #[command(visible_alias = "expire-all")]
    Clean(SweepArgs),
    /// Delete every entry
    Clear(SweepArgs),
}

#[derive(Parser, Debug)]
pub struct KeyArgs {
    /// Cache key
    pub key: String,

    /// Use the key as a store key without escaping it
    #[arg(long)]
    pub raw: bool,
}

#[derive(Parser, Debug)]
pub struct WriteArgs {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Entry payload as a JSON object
    pub json: String,

    /// Seconds until expiry, used when the payload has no `expires_at`
    #[arg(long, default_value_t = 3600)]
    pub ttl: i64,
}

#[derive(Parser, Debug)]
pub struct SweepArgs {
    /// Only touch keys starting with this prefix (escaped like keys)
    #[arg(long, short)]
    pub namespace: Option<String>,
}
