//! Loader Service - Loads a collected trade CSV into the relational store
//!
//! Responsibilities:
//! - Read a collector-produced CSV (byte-order-mark tolerant)
//! - Validate that every natural-key column is present before touching the DB
//! - Upsert each row into real_estate_trade (insert or update-on-key-conflict)
//! - Report inserted / updated / unchanged / skipped counts for the run
//!
//! Usage:
//!   # Scripted:
//!   cargo run --bin loader -- --csv-path data/real_estate_202407_11110.csv
//!
//!   # Interactive (prompts, blank input picks the default path):
//!   cargo run --bin loader

use anyhow::{Context, Result};
use clap::Parser;
use encoding_rs::UTF_8;
use serde::{Deserialize, Deserializer};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(name = "loader", about = "Loads a trade CSV into real_estate_trade")]
struct Args {
    /// CSV file to load (prompted when omitted)
    #[arg(long)]
    csv_path: Option<String>,
}

const DEFAULT_CSV_PATH: &str = "data/real_estate_202407_11110.csv";

#[derive(Debug, Clone)]
struct DbConfig {
    host: String,
    port: u16,
    user: String,
    password: String,
    database: String,
    charset: String,
}

impl DbConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: std::env::var("DB_HOST").context("DB_HOST env var missing")?,
            port: std::env::var("DB_PORT")
                .context("DB_PORT env var missing")?
                .parse()
                .context("DB_PORT must be a port number")?,
            user: std::env::var("DB_USER").context("DB_USER env var missing")?,
            password: std::env::var("DB_PASSWORD").context("DB_PASSWORD env var missing")?,
            database: std::env::var("DB_NAME").context("DB_NAME env var missing")?,
            charset: std::env::var("DB_CHARSET").unwrap_or_else(|_| "utf8mb4".to_string()),
        })
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .charset(&self.charset)
    }
}

#[derive(Debug, Error)]
enum LoadError {
    #[error("schema validation failed: {0}")]
    Validation(String),
    #[error("database connection failed: {0}")]
    Connection(#[source] sqlx::Error),
}

// =============================================================================
// Trade Schema
// =============================================================================

/// All target table columns, in insert order.
const TABLE_COLUMNS: [&str; 19] = [
    "deal_year",
    "deal_month",
    "deal_day",
    "sgg_cd",
    "apt_nm",
    "jibun",
    "apt_dong",
    "exclu_use_ar",
    "floor",
    "deal_amount",
    "build_year",
    "cdeal_type",
    "cdeal_day",
    "dealing_gbn",
    "estate_agent_sgg_nm",
    "rgst_date",
    "sler_gbn",
    "buyer_gbn",
    "land_leasehold_gbn",
];

/// Columns that make up the table's natural key, plus the amount. A CSV
/// missing any of these cannot be loaded at all.
const REQUIRED_COLUMNS: [&str; 10] = [
    "deal_year",
    "deal_month",
    "deal_day",
    "sgg_cd",
    "apt_nm",
    "jibun",
    "apt_dong",
    "exclu_use_ar",
    "floor",
    "deal_amount",
];

/// Non-key descriptive columns, refreshed on key conflict.
const MUTABLE_COLUMNS: [&str; 9] = [
    "build_year",
    "cdeal_type",
    "cdeal_day",
    "dealing_gbn",
    "estate_agent_sgg_nm",
    "rgst_date",
    "sler_gbn",
    "buyer_gbn",
    "land_leasehold_gbn",
];

/// Empty or whitespace-only text reads as NULL, so a field that round-trips
/// through the CSV as "" and one that was never written behave the same.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// One CSV row headed for the store. Every field is defaulted so that rows
/// deserialize even from an incomplete CSV; the column validator decides
/// whether the batch is loadable.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
struct CsvTrade {
    #[serde(default)]
    deal_year: Option<i32>,
    #[serde(default)]
    deal_month: Option<i32>,
    #[serde(default)]
    deal_day: Option<i32>,
    #[serde(default, deserialize_with = "empty_as_none")]
    sgg_cd: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    apt_nm: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    jibun: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    apt_dong: Option<String>,
    #[serde(default)]
    exclu_use_ar: Option<f64>,
    #[serde(default)]
    floor: Option<i32>,
    #[serde(default)]
    deal_amount: Option<i64>,
    #[serde(default)]
    build_year: Option<i32>,
    #[serde(default, deserialize_with = "empty_as_none")]
    cdeal_type: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    cdeal_day: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    dealing_gbn: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    estate_agent_sgg_nm: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    rgst_date: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    sler_gbn: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    buyer_gbn: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    land_leasehold_gbn: Option<String>,
}

// =============================================================================
// CSV Reader
// =============================================================================

/// Read a collector CSV back into rows, returning the header schema alongside.
fn read_trades_csv(path: &Path) -> Result<(Vec<String>, Vec<CsvTrade>)> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    // BOM-aware decode: the collector writes utf-8 with a byte-order mark.
    let (text, _, had_errors) = UTF_8.decode(&bytes);
    if had_errors {
        anyhow::bail!("CSV at {} is not valid UTF-8", path.display());
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(String::from)
        .collect();

    let mut rows = Vec::new();
    for (line_idx, result) in reader.deserialize().enumerate() {
        let row: CsvTrade =
            result.with_context(|| format!("CSV line {} is malformed", line_idx + 2))?;
        rows.push(row);
    }

    Ok((headers, rows))
}

// =============================================================================
// Validator
// =============================================================================

/// Schema-level check: every natural-key column must exist in the CSV header.
/// This guards against loading output from an incompatible collector version;
/// it is not a per-row null check.
fn validate_columns(headers: &[String]) -> Result<(), LoadError> {
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .copied()
        .collect();

    if !missing.is_empty() {
        return Err(LoadError::Validation(format!(
            "required columns missing from CSV: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

// =============================================================================
// Upserter
// =============================================================================

const UPSERT_SQL: &str = r#"
INSERT INTO real_estate_trade (
    deal_year, deal_month, deal_day, sgg_cd, apt_nm, jibun, apt_dong,
    exclu_use_ar, floor, deal_amount, build_year, cdeal_type, cdeal_day,
    dealing_gbn, estate_agent_sgg_nm, rgst_date, sler_gbn, buyer_gbn,
    land_leasehold_gbn)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
ON DUPLICATE KEY UPDATE
    build_year = VALUES(build_year),
    cdeal_type = VALUES(cdeal_type),
    cdeal_day = VALUES(cdeal_day),
    dealing_gbn = VALUES(dealing_gbn),
    estate_agent_sgg_nm = VALUES(estate_agent_sgg_nm),
    rgst_date = VALUES(rgst_date),
    sler_gbn = VALUES(sler_gbn),
    buyer_gbn = VALUES(buyer_gbn),
    land_leasehold_gbn = VALUES(land_leasehold_gbn)
"#;

/// Outcome of one upsert attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RowOutcome {
    Inserted,
    Updated,
    Unchanged,
    Skipped(String),
}

/// MySQL reports 1 affected row for a fresh insert, 2 for an update through
/// the key-conflict clause, and 0 when the conflict changed nothing.
fn classify_affected(rows_affected: u64) -> RowOutcome {
    match rows_affected {
        1 => RowOutcome::Inserted,
        2 => RowOutcome::Updated,
        _ => RowOutcome::Unchanged,
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct LoadReport {
    total: usize,
    inserted: usize,
    updated: usize,
    unchanged: usize,
    skipped: usize,
}

impl LoadReport {
    fn from_outcomes(outcomes: &[RowOutcome]) -> Self {
        let mut report = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome {
                RowOutcome::Inserted => report.inserted += 1,
                RowOutcome::Updated => report.updated += 1,
                RowOutcome::Unchanged => report.unchanged += 1,
                RowOutcome::Skipped(_) => report.skipped += 1,
            }
        }
        report
    }
}

/// Upsert every row inside one transaction, committed once at the end.
///
/// A failing statement skips that row and the batch continues; key conflicts
/// are not errors at all, the statement itself turns them into updates.
async fn upsert_trades(pool: &MySqlPool, rows: &[CsvTrade]) -> Result<LoadReport> {
    let mut tx = pool.begin().await.context("Failed to open transaction")?;
    let mut outcomes = Vec::with_capacity(rows.len());

    for (index, row) in rows.iter().enumerate() {
        let result = sqlx::query(UPSERT_SQL)
            .bind(row.deal_year)
            .bind(row.deal_month)
            .bind(row.deal_day)
            .bind(&row.sgg_cd)
            .bind(&row.apt_nm)
            .bind(&row.jibun)
            .bind(&row.apt_dong)
            .bind(row.exclu_use_ar)
            .bind(row.floor)
            .bind(row.deal_amount)
            .bind(row.build_year)
            .bind(&row.cdeal_type)
            .bind(&row.cdeal_day)
            .bind(&row.dealing_gbn)
            .bind(&row.estate_agent_sgg_nm)
            .bind(&row.rgst_date)
            .bind(&row.sler_gbn)
            .bind(&row.buyer_gbn)
            .bind(&row.land_leasehold_gbn)
            .execute(&mut *tx)
            .await;

        match result {
            Ok(done) => outcomes.push(classify_affected(done.rows_affected())),
            Err(e) => {
                eprintln!("  ✗ row {}: skipped: {}", index + 1, e);
                outcomes.push(RowOutcome::Skipped(e.to_string()));
            }
        }
    }

    tx.commit().await.context("Failed to commit batch")?;
    Ok(LoadReport::from_outcomes(&outcomes))
}

// =============================================================================
// Input Handling
// =============================================================================

fn prompt_with_default(prompt: &str, default: &str) -> Result<String> {
    println!("{prompt} (blank for default {default})");
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("Failed to read stdin")?;
    let trimmed = line.trim();
    Ok(if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config = DbConfig::from_env()?;

    println!("=== Apartment Trade Loader ===");

    let csv_path = match args.csv_path {
        Some(value) => value,
        None => prompt_with_default("CSV file to load", DEFAULT_CSV_PATH)?,
    };
    let path = Path::new(&csv_path);
    if !path.exists() {
        anyhow::bail!("CSV file '{}' not found", path.display());
    }

    println!("\nReading {}...", path.display());
    let (headers, rows) = read_trades_csv(path)?;
    println!("Read {} rows, {} columns", rows.len(), headers.len());

    validate_columns(&headers)?;
    println!("Required columns present");

    println!(
        "Connecting to {} at {}:{}...",
        config.database, config.host, config.port
    );
    let pool = MySqlPoolOptions::new()
        .max_connections(5)
        .connect_with(config.connect_options())
        .await
        .map_err(LoadError::Connection)?;
    println!("Connected");

    println!("Upserting into real_estate_trade...");
    let report = upsert_trades(&pool, &rows).await?;

    println!("\n=== Load Complete ===");
    println!("Processed: {}", report.total);
    println!("Inserted:  {}", report.inserted);
    println!("Updated:   {}", report.updated);
    println!("Unchanged: {}", report.unchanged);
    if report.skipped > 0 {
        println!("Skipped:   {}", report.skipped);
    }

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
