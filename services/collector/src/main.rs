//! Collector Service - Fetches apartment trade records into a normalized CSV
//!
//! Responsibilities:
//! - Call the public RTMS apartment-trade API for one year-month/region pair
//! - Parse the XML payload into raw trade records
//! - Normalize records into the 19-column trade schema
//! - Write the normalized rows to data/real_estate_{year_month}_{region}.csv
//!
//! Usage:
//!   # Scripted:
//!   cargo run --bin collector -- --year-month 202407 --region-code 11110
//!
//!   # Interactive (prompts, blank input picks the defaults):
//!   cargo run --bin collector

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(name = "collector", about = "Collects apartment trade records into a CSV")]
struct Args {
    /// Deal year-month to collect, YYYYMM (prompted when omitted)
    #[arg(long)]
    year_month: Option<String>,

    /// Region code, first 5 digits of the legal-dong code (prompted when omitted)
    #[arg(long)]
    region_code: Option<String>,
}

const API_URL: &str =
    "https://apis.data.go.kr/1613000/RTMSDataSvcAptTrade/getRTMSDataSvcAptTrade";
const NUM_OF_ROWS: &str = "1000";
const REQUEST_TIMEOUT_SECS: u64 = 15;

const DEFAULT_YEAR_MONTH: &str = "202407";
const DEFAULT_REGION_CODE: &str = "11110";

#[derive(Debug, Clone)]
struct Config {
    service_key: String,
}

impl Config {
    fn from_env() -> Result<Self> {
        Ok(Self {
            service_key: std::env::var("SERVICE_KEY")
                .context("SERVICE_KEY env var missing")?,
        })
    }
}

#[derive(Debug, Error)]
enum CollectError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("response parse failure: {0}")]
    Parse(String),
    #[error("no trade records in response")]
    EmptyResult,
}

// =============================================================================
// Trade Schema
// =============================================================================

/// Target column names, in the fixed CSV/table order.
const SCHEMA_COLUMNS: [&str; 19] = [
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

/// Provider field name -> schema column name, 1:1.
const PROVIDER_TO_SCHEMA: [(&str, &str); 19] = [
    ("dealYear", "deal_year"),
    ("dealMonth", "deal_month"),
    ("dealDay", "deal_day"),
    ("sggCd", "sgg_cd"),
    ("aptNm", "apt_nm"),
    ("jibun", "jibun"),
    ("aptDong", "apt_dong"),
    ("excluUseAr", "exclu_use_ar"),
    ("floor", "floor"),
    ("dealAmount", "deal_amount"),
    ("buildYear", "build_year"),
    ("cdealType", "cdeal_type"),
    ("cdealDay", "cdeal_day"),
    ("dealingGbn", "dealing_gbn"),
    ("estateAgentSggNm", "estate_agent_sgg_nm"),
    ("rgstDate", "rgst_date"),
    ("slerGbn", "sler_gbn"),
    ("buyerGbn", "buyer_gbn"),
    ("landLeaseholdGbn", "land_leasehold_gbn"),
];

// Defaults for the columns the provider may omit or leave blank.
const JIBUN_DEFAULT: &str = "0";
const APT_DONG_DEFAULT: &str = "0";
const EXCLU_USE_AR_DEFAULT: f64 = 0.0;
const FLOOR_DEFAULT: i32 = 0;

/// One trade as returned by the provider. Every field is optional on the
/// wire; normalization decides which absences are acceptable.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawTrade {
    #[serde(rename = "dealYear")]
    deal_year: Option<String>,
    #[serde(rename = "dealMonth")]
    deal_month: Option<String>,
    #[serde(rename = "dealDay")]
    deal_day: Option<String>,
    #[serde(rename = "sggCd")]
    sgg_cd: Option<String>,
    #[serde(rename = "aptNm")]
    apt_nm: Option<String>,
    jibun: Option<String>,
    #[serde(rename = "aptDong")]
    apt_dong: Option<String>,
    #[serde(rename = "excluUseAr")]
    exclu_use_ar: Option<String>,
    floor: Option<String>,
    #[serde(rename = "dealAmount")]
    deal_amount: Option<String>,
    #[serde(rename = "buildYear")]
    build_year: Option<String>,
    #[serde(rename = "cdealType")]
    cdeal_type: Option<String>,
    #[serde(rename = "cdealDay")]
    cdeal_day: Option<String>,
    #[serde(rename = "dealingGbn")]
    dealing_gbn: Option<String>,
    #[serde(rename = "estateAgentSggNm")]
    estate_agent_sgg_nm: Option<String>,
    #[serde(rename = "rgstDate")]
    rgst_date: Option<String>,
    #[serde(rename = "slerGbn")]
    sler_gbn: Option<String>,
    #[serde(rename = "buyerGbn")]
    buyer_gbn: Option<String>,
    #[serde(rename = "landLeaseholdGbn")]
    land_leasehold_gbn: Option<String>,
}

/// One normalized trade row. Field order matches SCHEMA_COLUMNS, which is
/// also the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TradeRow {
    deal_year: i32,
    deal_month: i32,
    deal_day: i32,
    sgg_cd: String,
    apt_nm: String,
    jibun: String,
    apt_dong: String,
    exclu_use_ar: f64,
    floor: i32,
    deal_amount: i64,
    build_year: i32,
    cdeal_type: String,
    cdeal_day: String,
    dealing_gbn: String,
    estate_agent_sgg_nm: String,
    rgst_date: String,
    sler_gbn: String,
    buyer_gbn: String,
    land_leasehold_gbn: String,
}

// =============================================================================
// Transport
// =============================================================================

/// Build the HTTP client for the legacy provider endpoint.
///
/// The endpoint rejects modern handshakes, so the client pins TLS to exactly
/// version 1.2. Keeping the pin here means fetch and normalize logic never
/// have to know about it.
fn build_client() -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
        .max_tls_version(reqwest::tls::Version::TLS_1_2)
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()?;
    Ok(client)
}

/// Fetch one year-month/region page of trades, returning the raw XML body.
async fn fetch_month(
    client: &reqwest::Client,
    service_key: &str,
    year_month: &str,
    region_code: &str,
) -> Result<String, CollectError> {
    let response = client
        .get(API_URL)
        .query(&[
            ("serviceKey", service_key),
            ("LAWD_CD", region_code),
            ("DEAL_YMD", year_month),
            ("numOfRows", NUM_OF_ROWS),
        ])
        .send()
        .await?
        .error_for_status()?;

    Ok(response.text().await?)
}

// =============================================================================
// XML Parsing
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    header: ResponseHeader,
    body: Option<ResponseBody>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseHeader {
    #[serde(rename = "resultCode", default)]
    result_code: String,
    #[serde(rename = "resultMsg", default)]
    result_msg: String,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    items: Option<Items>,
    #[serde(rename = "totalCount", default)]
    total_count: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct Items {
    #[serde(default)]
    item: Vec<RawTrade>,
}

/// Parse the provider response envelope into raw trade records.
fn parse_items(xml: &str) -> Result<(ResponseHeader, Option<u32>, Vec<RawTrade>), CollectError> {
    let response: ApiResponse = quick_xml::de::from_str(xml)
        .map_err(|e| CollectError::Parse(format!("unreadable XML payload: {e}")))?;

    let (total_count, records) = match response.body {
        Some(body) => (
            body.total_count,
            body.items.map(|i| i.item).unwrap_or_default(),
        ),
        None => (None, Vec::new()),
    };

    Ok((response.header, total_count, records))
}

// =============================================================================
// Normalizer
// =============================================================================

/// Optional string column: trim, blank/missing -> default.
fn text_or_default(value: Option<&str>, default: &str) -> String {
    match value.map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => default.to_string(),
    }
}

/// Descriptive string column: missing -> empty string, value kept as-is.
fn text_or_empty(value: Option<&str>) -> String {
    value.unwrap_or("").to_string()
}

/// Numeric column: non-parseable or missing -> default.
fn int_or_default(value: Option<&str>, default: i32) -> i32 {
    value.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

fn float_or_default(value: Option<&str>, default: f64) -> f64 {
    value.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

/// Mandatory amount column: strip thousands separators, parse. A value that
/// still fails to parse fails the whole run, not just the record.
fn parse_deal_amount(value: Option<&str>, index: usize) -> Result<i64, CollectError> {
    let raw = value.ok_or_else(|| {
        CollectError::Parse(format!("record {}: dealAmount missing", index + 1))
    })?;
    raw.trim().replace(',', "").parse().map_err(|_| {
        CollectError::Parse(format!(
            "record {}: dealAmount '{}' is not numeric",
            index + 1,
            raw
        ))
    })
}

/// Normalize raw provider records into schema rows.
///
/// Output order matches input order and no record is ever dropped; the only
/// zero-row outcome is zero input records, reported as EmptyResult.
fn normalize(records: &[RawTrade]) -> Result<Vec<TradeRow>, CollectError> {
    if records.is_empty() {
        return Err(CollectError::EmptyResult);
    }

    let mut rows = Vec::with_capacity(records.len());
    for (index, raw) in records.iter().enumerate() {
        rows.push(TradeRow {
            deal_year: int_or_default(raw.deal_year.as_deref(), 0),
            deal_month: int_or_default(raw.deal_month.as_deref(), 0),
            deal_day: int_or_default(raw.deal_day.as_deref(), 0),
            sgg_cd: text_or_empty(raw.sgg_cd.as_deref()),
            apt_nm: text_or_empty(raw.apt_nm.as_deref()),
            jibun: text_or_default(raw.jibun.as_deref(), JIBUN_DEFAULT),
            apt_dong: text_or_default(raw.apt_dong.as_deref(), APT_DONG_DEFAULT),
            exclu_use_ar: float_or_default(raw.exclu_use_ar.as_deref(), EXCLU_USE_AR_DEFAULT),
            floor: int_or_default(raw.floor.as_deref(), FLOOR_DEFAULT),
            deal_amount: parse_deal_amount(raw.deal_amount.as_deref(), index)?,
            build_year: int_or_default(raw.build_year.as_deref(), 0),
            cdeal_type: text_or_empty(raw.cdeal_type.as_deref()),
            cdeal_day: text_or_empty(raw.cdeal_day.as_deref()),
            dealing_gbn: text_or_empty(raw.dealing_gbn.as_deref()),
            estate_agent_sgg_nm: text_or_empty(raw.estate_agent_sgg_nm.as_deref()),
            rgst_date: text_or_empty(raw.rgst_date.as_deref()),
            sler_gbn: text_or_empty(raw.sler_gbn.as_deref()),
            buyer_gbn: text_or_empty(raw.buyer_gbn.as_deref()),
            land_leasehold_gbn: text_or_empty(raw.land_leasehold_gbn.as_deref()),
        });
    }

    Ok(rows)
}

// =============================================================================
// CSV Writer
// =============================================================================

fn output_path(year_month: &str, region_code: &str) -> PathBuf {
    PathBuf::from(format!("data/real_estate_{year_month}_{region_code}.csv"))
}

/// Write normalized rows to the output CSV, overwriting any previous run.
///
/// The file starts with a UTF-8 byte-order mark so spreadsheet tools pick up
/// the localized text correctly.
fn write_trades_csv(rows: &[TradeRow], path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let mut file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(b"\xEF\xBB\xBF")?;

    let mut writer = csv::Writer::from_writer(file);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
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

fn validate_year_month(token: &str) -> Result<()> {
    if token.len() != 6 || !token.chars().all(|c| c.is_ascii_digit()) {
        anyhow::bail!("year-month must be 6 digits in YYYYMM form, got '{token}'");
    }
    NaiveDate::parse_from_str(&format!("{token}01"), "%Y%m%d")
        .map_err(|_| anyhow::anyhow!("'{token}' does not name a calendar month"))?;
    Ok(())
}

fn validate_region_code(code: &str) -> Result<()> {
    if code.len() != 5 || !code.chars().all(|c| c.is_ascii_digit()) {
        anyhow::bail!("region code must be 5 digits, got '{code}'");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config = Config::from_env()?;

    println!("=== Apartment Trade Collector ===");

    let year_month = match args.year_month {
        Some(value) => value,
        None => prompt_with_default("Deal year-month to collect, YYYYMM", DEFAULT_YEAR_MONTH)?,
    };
    let region_code = match args.region_code {
        Some(value) => value,
        None => prompt_with_default(
            "Region code, first 5 digits of the legal-dong code",
            DEFAULT_REGION_CODE,
        )?,
    };
    validate_year_month(&year_month)?;
    validate_region_code(&region_code)?;

    println!("\nCollecting {} trades for region {}...", year_month, region_code);

    let client = build_client()?;
    println!("Transport: TLS pinned to 1.2 for the legacy endpoint");

    let body = fetch_month(&client, &config.service_key, &year_month, &region_code)
        .await
        .context("API call failed")?;
    println!("Received {} bytes", body.len());

    let (header, total_count, records) = parse_items(&body)?;
    if !header.result_code.is_empty() {
        println!("API result: {} {}", header.result_code, header.result_msg);
    }
    println!("Fetched {} raw records", records.len());

    if let Some(total) = total_count {
        if total as usize > records.len() {
            eprintln!(
                "Warning: response reports {} trades in total; only the first {} are collected",
                total,
                records.len()
            );
        }
    }

    let rows = match normalize(&records) {
        Ok(rows) => rows,
        Err(CollectError::EmptyResult) => {
            println!("No trade records returned for this period; nothing to write.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let path = output_path(&year_month, &region_code);
    write_trades_csv(&rows, &path)?;

    println!("\n=== Collection Complete ===");
    println!("Saved {} rows to {}", rows.len(), path.display());
    println!(
        "Load with: cargo run --bin loader -- --csv-path {}",
        path.display()
    );

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn full_raw() -> RawTrade {
        RawTrade {
            deal_year: Some("2024".into()),
            deal_month: Some("7".into()),
            deal_day: Some("15".into()),
            sgg_cd: Some("11110".into()),
            apt_nm: Some("경희궁의아침".into()),
            jibun: Some("71".into()),
            apt_dong: Some("101".into()),
            exclu_use_ar: Some("84.97".into()),
            floor: Some("12".into()),
            deal_amount: Some("142,500".into()),
            build_year: Some("2004".into()),
            cdeal_type: None,
            cdeal_day: None,
            dealing_gbn: Some("중개거래".into()),
            estate_agent_sgg_nm: Some("서울 종로구".into()),
            rgst_date: Some("24.07.30".into()),
            sler_gbn: Some("개인".into()),
            buyer_gbn: Some("개인".into()),
            land_leasehold_gbn: Some("N".into()),
        }
    }

    // -------------------------------------------------------------------------
    // NORMALIZER TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_normalize_empty_input_is_reported() {
        let result = normalize(&[]);
        assert!(matches!(result, Err(CollectError::EmptyResult)));
    }

    #[test]
    fn test_normalize_full_record() {
        let rows = normalize(&[full_raw()]).unwrap();
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.deal_year, 2024);
        assert_eq!(row.deal_month, 7);
        assert_eq!(row.deal_day, 15);
        assert_eq!(row.sgg_cd, "11110");
        assert_eq!(row.apt_nm, "경희궁의아침");
        assert_eq!(row.jibun, "71");
        assert_eq!(row.apt_dong, "101");
        assert_eq!(row.exclu_use_ar, 84.97);
        assert_eq!(row.floor, 12);
        assert_eq!(row.deal_amount, 142500);
        assert_eq!(row.build_year, 2004);
        assert_eq!(row.dealing_gbn, "중개거래");
    }

    #[test]
    fn test_normalize_missing_optionals_get_defaults() {
        let raw = RawTrade {
            deal_amount: Some("5,000".into()),
            ..Default::default()
        };
        let rows = normalize(&[raw]).unwrap();

        let row = &rows[0];
        assert_eq!(row.jibun, "0");
        assert_eq!(row.apt_dong, "0");
        assert_eq!(row.exclu_use_ar, 0.0);
        assert_eq!(row.floor, 0);
    }

    #[test]
    fn test_normalize_blank_optionals_get_defaults() {
        let raw = RawTrade {
            jibun: Some("   ".into()),
            apt_dong: Some("".into()),
            exclu_use_ar: Some("not-a-number".into()),
            floor: Some("".into()),
            deal_amount: Some("1000".into()),
            ..Default::default()
        };
        let rows = normalize(&[raw]).unwrap();

        let row = &rows[0];
        assert_eq!(row.jibun, "0");
        assert_eq!(row.apt_dong, "0");
        assert_eq!(row.exclu_use_ar, 0.0);
        assert_eq!(row.floor, 0);
    }

    #[test]
    fn test_normalize_optional_values_are_trimmed() {
        let raw = RawTrade {
            jibun: Some("  71-2  ".into()),
            deal_amount: Some("1000".into()),
            ..Default::default()
        };
        let rows = normalize(&[raw]).unwrap();
        assert_eq!(rows[0].jibun, "71-2");
    }

    #[test]
    fn test_deal_amount_thousands_separators_stripped() {
        let raw = RawTrade {
            deal_amount: Some("1,234,000".into()),
            ..Default::default()
        };
        let rows = normalize(&[raw]).unwrap();
        assert_eq!(rows[0].deal_amount, 1234000);
    }

    #[test]
    fn test_deal_amount_non_numeric_fails_the_run() {
        let raw = RawTrade {
            deal_amount: Some("gratis".into()),
            ..Default::default()
        };
        let result = normalize(&[raw]);
        assert!(matches!(result, Err(CollectError::Parse(_))));
    }

    #[test]
    fn test_deal_amount_missing_fails_the_run() {
        let result = normalize(&[RawTrade::default()]);
        assert!(matches!(result, Err(CollectError::Parse(_))));
    }

    #[test]
    fn test_deal_amount_failure_names_the_record() {
        let records = vec![
            RawTrade {
                deal_amount: Some("1000".into()),
                ..Default::default()
            },
            RawTrade {
                deal_amount: Some("oops".into()),
                ..Default::default()
            },
        ];
        let err = normalize(&records).unwrap_err();
        assert!(err.to_string().contains("record 2"));
    }

    #[test]
    fn test_integer_columns_parse_or_zero() {
        let raw = RawTrade {
            deal_year: Some("????".into()),
            build_year: None,
            deal_amount: Some("1000".into()),
            ..Default::default()
        };
        let rows = normalize(&[raw]).unwrap();
        assert_eq!(rows[0].deal_year, 0);
        assert_eq!(rows[0].build_year, 0);
    }

    #[test]
    fn test_descriptive_columns_missing_become_empty() {
        let raw = RawTrade {
            deal_amount: Some("1000".into()),
            ..Default::default()
        };
        let rows = normalize(&[raw]).unwrap();
        assert_eq!(rows[0].cdeal_type, "");
        assert_eq!(rows[0].estate_agent_sgg_nm, "");
        assert_eq!(rows[0].land_leasehold_gbn, "");
    }

    #[test]
    fn test_normalize_preserves_input_order() {
        let records: Vec<RawTrade> = ["가락", "나산", "다정"]
            .iter()
            .map(|name| RawTrade {
                apt_nm: Some((*name).into()),
                deal_amount: Some("1000".into()),
                ..Default::default()
            })
            .collect();

        let rows = normalize(&records).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].apt_nm, "가락");
        assert_eq!(rows[1].apt_nm, "나산");
        assert_eq!(rows[2].apt_nm, "다정");
    }

    // -------------------------------------------------------------------------
    // RENAME TABLE TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_rename_table_has_19_unique_entries() {
        assert_eq!(PROVIDER_TO_SCHEMA.len(), 19);

        let providers: std::collections::HashSet<_> =
            PROVIDER_TO_SCHEMA.iter().map(|(p, _)| *p).collect();
        let schemas: std::collections::HashSet<_> =
            PROVIDER_TO_SCHEMA.iter().map(|(_, s)| *s).collect();
        assert_eq!(providers.len(), 19);
        assert_eq!(schemas.len(), 19);
    }

    #[test]
    fn test_rename_table_matches_schema_column_order() {
        let renamed: Vec<&str> = PROVIDER_TO_SCHEMA.iter().map(|(_, s)| *s).collect();
        assert_eq!(renamed, SCHEMA_COLUMNS);
    }

    // -------------------------------------------------------------------------
    // XML PARSING TESTS
    // -------------------------------------------------------------------------

    const THREE_ITEM_RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<response>
  <header>
    <resultCode>000</resultCode>
    <resultMsg>OK</resultMsg>
  </header>
  <body>
    <items>
      <item>
        <aptDong>101</aptDong>
        <aptNm>광화문풍림스페이스본</aptNm>
        <buildYear>2008</buildYear>
        <buyerGbn>개인</buyerGbn>
        <cdealDay></cdealDay>
        <cdealType></cdealType>
        <dealAmount>155,000</dealAmount>
        <dealDay>2</dealDay>
        <dealMonth>7</dealMonth>
        <dealYear>2024</dealYear>
        <dealingGbn>중개거래</dealingGbn>
        <estateAgentSggNm>서울 종로구</estateAgentSggNm>
        <excluUseAr>94.51</excluUseAr>
        <floor>5</floor>
        <jibun>72</jibun>
        <landLeaseholdGbn>N</landLeaseholdGbn>
        <rgstDate>24.07.22</rgstDate>
        <sggCd>11110</sggCd>
        <slerGbn>개인</slerGbn>
        <umdNm>사직동</umdNm>
      </item>
      <item>
        <aptDong>102</aptDong>
        <aptNm>경희궁의아침2단지</aptNm>
        <buildYear>2004</buildYear>
        <buyerGbn>개인</buyerGbn>
        <dealAmount>142,500</dealAmount>
        <dealDay>9</dealDay>
        <dealMonth>7</dealMonth>
        <dealYear>2024</dealYear>
        <dealingGbn>중개거래</dealingGbn>
        <estateAgentSggNm>서울 종로구</estateAgentSggNm>
        <excluUseAr>84.97</excluUseAr>
        <floor>12</floor>
        <jibun>71</jibun>
        <landLeaseholdGbn>N</landLeaseholdGbn>
        <rgstDate>24.07.30</rgstDate>
        <sggCd>11110</sggCd>
        <slerGbn>개인</slerGbn>
        <umdNm>내수동</umdNm>
      </item>
      <item>
        <aptNm>무악현대</aptNm>
        <buildYear>2000</buildYear>
        <buyerGbn>개인</buyerGbn>
        <dealAmount>98,000</dealAmount>
        <dealDay>20</dealDay>
        <dealMonth>7</dealMonth>
        <dealYear>2024</dealYear>
        <dealingGbn>직거래</dealingGbn>
        <excluUseAr>84.9</excluUseAr>
        <landLeaseholdGbn>N</landLeaseholdGbn>
        <sggCd>11110</sggCd>
        <slerGbn>개인</slerGbn>
        <umdNm>무악동</umdNm>
      </item>
    </items>
    <numOfRows>1000</numOfRows>
    <pageNo>1</pageNo>
    <totalCount>3</totalCount>
  </body>
</response>"#;

    #[test]
    fn test_parse_items_reads_envelope() {
        let (header, total_count, records) = parse_items(THREE_ITEM_RESPONSE).unwrap();
        assert_eq!(header.result_code, "000");
        assert_eq!(header.result_msg, "OK");
        assert_eq!(total_count, Some(3));
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].apt_nm.as_deref(), Some("광화문풍림스페이스본"));
        assert_eq!(records[0].deal_amount.as_deref(), Some("155,000"));
    }

    #[test]
    fn test_parse_items_empty_items_yields_no_records() {
        let xml = r#"<response>
  <header><resultCode>000</resultCode><resultMsg>OK</resultMsg></header>
  <body><items></items><totalCount>0</totalCount></body>
</response>"#;
        let (_, total_count, records) = parse_items(xml).unwrap();
        assert_eq!(total_count, Some(0));
        assert!(records.is_empty());
    }

    #[test]
    fn test_parse_items_missing_body_yields_no_records() {
        let xml = r#"<response>
  <header><resultCode>03</resultCode><resultMsg>NODATA_ERROR</resultMsg></header>
</response>"#;
        let (header, _, records) = parse_items(xml).unwrap();
        assert_eq!(header.result_code, "03");
        assert!(records.is_empty());
    }

    #[test]
    fn test_parse_items_garbage_is_a_parse_error() {
        let result = parse_items("this is not xml at all <<<");
        assert!(matches!(result, Err(CollectError::Parse(_))));
    }

    #[test]
    fn test_three_item_fixture_end_to_end() {
        // Two complete items plus one missing floor, jibun and aptDong.
        let (_, _, records) = parse_items(THREE_ITEM_RESPONSE).unwrap();
        let rows = normalize(&records).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].deal_amount, 155000);
        assert_eq!(rows[1].deal_amount, 142500);

        let third = &rows[2];
        assert_eq!(third.floor, 0);
        assert_eq!(third.jibun, "0");
        assert_eq!(third.apt_dong, "0");
        assert_eq!(third.deal_amount, 98000);
        assert_eq!(third.apt_nm, "무악현대");
    }

    // -------------------------------------------------------------------------
    // CSV WRITER TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_output_path_format() {
        assert_eq!(
            output_path("202407", "11110"),
            PathBuf::from("data/real_estate_202407_11110.csv")
        );
    }

    #[test]
    fn test_write_trades_csv_emits_bom_and_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");

        let rows = normalize(&[full_raw()]).unwrap();
        write_trades_csv(&rows, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..3], b"\xEF\xBB\xBF");

        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        let header_line = text.lines().next().unwrap();
        assert_eq!(header_line, SCHEMA_COLUMNS.join(","));
    }

    #[test]
    fn test_write_trades_csv_overwrites_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");

        let rows = normalize(&[full_raw(), full_raw()]).unwrap();
        write_trades_csv(&rows, &path).unwrap();
        write_trades_csv(&rows[..1], &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        // Header plus exactly one data line after the second write.
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_csv_round_trip_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");

        let (_, _, records) = parse_items(THREE_ITEM_RESPONSE).unwrap();
        let written = normalize(&records).unwrap();
        write_trades_csv(&written, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let stripped = text.strip_prefix('\u{feff}').unwrap_or(&text);

        let mut reader = csv::Reader::from_reader(stripped.as_bytes());
        let read_back: Vec<TradeRow> = reader.deserialize().collect::<Result<_, _>>().unwrap();

        assert_eq!(read_back, written);
    }

    // -------------------------------------------------------------------------
    // INPUT VALIDATION TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_validate_year_month_accepts_real_months() {
        assert!(validate_year_month("202407").is_ok());
        assert!(validate_year_month("199901").is_ok());
    }

    #[test]
    fn test_validate_year_month_rejects_bad_tokens() {
        assert!(validate_year_month("2024").is_err());
        assert!(validate_year_month("2024-7").is_err());
        assert!(validate_year_month("202413").is_err());
        assert!(validate_year_month("abc123").is_err());
    }

    #[test]
    fn test_validate_region_code() {
        assert!(validate_region_code("11110").is_ok());
        assert!(validate_region_code("1111").is_err());
        assert!(validate_region_code("111100").is_err());
        assert!(validate_region_code("1111o").is_err());
    }
}
