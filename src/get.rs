//! Query record lookup for the `rag get` command.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::models::QueryRecord;
use crate::records::create_record_store;

/// Fetch a record from the configured record store.
pub async fn get_record(config: &Config, query_id: &str) -> Result<QueryRecord> {
    let store = create_record_store(config).await?;
    match store.get_item(query_id).await? {
        Some(record) => Ok(record),
        None => bail!("query not found: {}", query_id),
    }
}

/// CLI entry point for `rag get`.
pub async fn run_get(config: &Config, query_id: &str) -> Result<()> {
    let record = get_record(config, query_id).await?;

    println!("--- Query ---");
    println!("query_id:    {}", record.query_id);
    println!("created_at:  {}", format_ts_iso(record.create_time));
    println!("complete:    {}", record.is_complete);
    println!("question:    {}", record.query_text);
    println!();

    println!("--- Answer ---");
    println!("{}", record.answer_text.as_deref().unwrap_or("(pending)"));
    println!();

    println!("--- Sources ({}) ---", record.sources.len());
    for source in &record.sources {
        println!("{}", source);
    }

    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
