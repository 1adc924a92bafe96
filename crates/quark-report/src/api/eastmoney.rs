//! East Money public JSON API client
//!
//! Covers four endpoint families: the real-time quote snapshot, daily candle
//! history, daily fund flow and the data-center report tables (financial
//! indicators, core concept boards). Records are returned in provider units;
//! callers convert.
//!
//! Numeric cells arrive either as JSON numbers or as strings, with `"-"` or an
//! empty string standing for "no value". [`cell_f64`] normalizes all of them.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ReportConfig;
use crate::error::{ProviderError, ReportError};
use crate::identifier::Identifier;

type Result<T> = std::result::Result<T, ProviderError>;

const USER_AGENT: &str = concat!("quark/", env!("CARGO_PKG_VERSION"));

const SNAPSHOT_FIELDS: &str = "f43,f44,f45,f46,f47,f48,f57,f58,f84,f85,f116,f117,f127,f130,f133,f162,f163,f164,f167,f168,f169,f170";
const KLINE_FIELDS: &str = "f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61";
const FLOW_FIELDS: &str = "f51,f52,f53,f54,f55,f56";

const FINANCE_REPORT: &str = "RPT_F10_FINANCE_MAINFINADATA";
const BOARD_REPORT: &str = "RPT_F10_CORETHEME_BOARDTYPE";

/// Real-time quote snapshot (`fltt=2`: prices already in CNY)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub code: String,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub open: Option<f64>,
    /// Lots of 100 shares
    pub volume: Option<f64>,
    /// CNY
    pub amount: Option<f64>,
    /// Shares
    pub total_shares: Option<f64>,
    pub float_shares: Option<f64>,
    /// CNY
    pub total_market_cap: Option<f64>,
    pub float_market_cap: Option<f64>,
    pub industry: Option<String>,
    pub pe_dynamic: Option<f64>,
    pub pe_static: Option<f64>,
    pub pe_ttm: Option<f64>,
    pub pb: Option<f64>,
    pub ps: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub turnover_rate: Option<f64>,
    pub change: Option<f64>,
    pub change_pct: Option<f64>,
}

/// One daily candle, forward-adjusted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub date: String,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    /// Lots of 100 shares
    pub volume: f64,
    /// CNY
    pub amount: f64,
    pub change_pct: Option<f64>,
    pub change: Option<f64>,
    pub turnover_rate: Option<f64>,
}

/// Net inflow by order size for one session, CNY
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundFlow {
    pub date: String,
    pub main: Option<f64>,
    pub small: Option<f64>,
    pub medium: Option<f64>,
    pub large: Option<f64>,
    pub super_large: Option<f64>,
}

/// Latest main financial indicators row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinanceIndicators {
    /// `YYYY-MM-DD`
    pub report_date: Option<String>,
    /// CNY
    pub revenue: Option<f64>,
    /// Net profit attributable to the parent, CNY
    pub net_profit: Option<f64>,
    pub gross_margin: Option<f64>,
    pub net_margin: Option<f64>,
    pub roe: Option<f64>,
    pub roa: Option<f64>,
    pub debt_ratio: Option<f64>,
    pub current_ratio: Option<f64>,
    pub quick_ratio: Option<f64>,
    pub revenue_yoy: Option<f64>,
    pub net_profit_yoy: Option<f64>,
    pub inventory_turnover: Option<f64>,
    pub receivable_turnover: Option<f64>,
    pub total_asset_turnover: Option<f64>,
}

/// Core theme board membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub name: String,
    /// Provider board category, e.g. `行业` or `概念`
    pub kind: Option<String>,
}

impl Board {
    pub fn is_industry(&self) -> bool {
        self.kind.as_deref().is_some_and(|k| k.contains("行业"))
    }
}

/// East Money API client
#[derive(Debug, Clone)]
pub struct EastMoneyClient {
    client: Client,
    config: ReportConfig,
}

impl EastMoneyClient {
    /// Create a client from engine configuration
    pub fn new(config: &ReportConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ReportError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Fetch the real-time quote snapshot
    pub async fn quote_snapshot(&self, code: &Identifier) -> Result<QuoteSnapshot> {
        let url = format!("{}/api/qt/stock/get", self.config.endpoints.quote);
        let body = self
            .get_json(
                "quote",
                &url,
                &[
                    ("secid", code.secid()),
                    ("fltt", "2".to_string()),
                    ("invt", "2".to_string()),
                    ("fields", SNAPSHOT_FIELDS.to_string()),
                ],
            )
            .await?;
        parse_snapshot(code, &body)
    }

    /// Fetch up to `limit` daily candles, oldest first
    pub async fn daily_candles(&self, code: &Identifier, limit: usize) -> Result<Vec<Candle>> {
        let url = format!("{}/api/qt/stock/kline/get", self.config.endpoints.history);
        let body = self
            .get_json(
                "kline",
                &url,
                &[
                    ("secid", code.secid()),
                    ("fields1", "f1,f2,f3,f4,f5,f6".to_string()),
                    ("fields2", KLINE_FIELDS.to_string()),
                    ("klt", "101".to_string()),
                    ("fqt", "1".to_string()),
                    ("end", "20500101".to_string()),
                    ("lmt", limit.to_string()),
                ],
            )
            .await?;
        parse_candles(code, &body)
    }

    /// Fetch the most recent daily fund-flow row
    pub async fn latest_fund_flow(&self, code: &Identifier) -> Result<FundFlow> {
        let url = format!("{}/api/qt/stock/fflow/daykline/get", self.config.endpoints.quote);
        let body = self
            .get_json(
                "fund_flow",
                &url,
                &[
                    ("secid", code.secid()),
                    ("lmt", "0".to_string()),
                    ("klt", "101".to_string()),
                    ("fields1", "f1,f2,f3,f7".to_string()),
                    ("fields2", FLOW_FIELDS.to_string()),
                ],
            )
            .await?;
        parse_fund_flow(code, &body)
    }

    /// Fetch the latest main financial indicators row
    pub async fn finance_indicators(&self, code: &Identifier) -> Result<FinanceIndicators> {
        let rows = self
            .datacenter(code, FINANCE_REPORT, "REPORT_DATE", "-1", 1)
            .await?;
        let row = rows
            .first()
            .ok_or_else(|| ProviderError::NotFound(format!("no financial report for {code}")))?;
        Ok(parse_finance_row(row))
    }

    /// Fetch core theme boards the security belongs to
    pub async fn concept_boards(&self, code: &Identifier) -> Result<Vec<Board>> {
        let rows = self
            .datacenter(code, BOARD_REPORT, "BOARD_RANK", "1", 50)
            .await?;
        Ok(parse_boards(&rows))
    }

    async fn datacenter(
        &self,
        code: &Identifier,
        report: &str,
        sort_column: &str,
        sort_type: &str,
        page_size: usize,
    ) -> Result<Vec<Value>> {
        let url = format!(
            "{}/securities/api/data/v1/get",
            self.config.endpoints.datacenter
        );
        let body = self
            .get_json(
                "datacenter",
                &url,
                &[
                    ("reportName", report.to_string()),
                    ("columns", "ALL".to_string()),
                    ("filter", format!("(SECUCODE=\"{}\")", code.secucode())),
                    ("sortColumns", sort_column.to_string()),
                    ("sortTypes", sort_type.to_string()),
                    ("pageNumber", "1".to_string()),
                    ("pageSize", page_size.to_string()),
                    ("source", "HSF10".to_string()),
                    ("client", "PC".to_string()),
                ],
            )
            .await?;
        parse_datacenter_rows(code, report, &body)
    }

    /// GET a JSON document, retrying transient failures with doubling backoff
    async fn get_json(
        &self,
        endpoint: &'static str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Value> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.get_once(endpoint, url, query).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    let backoff = self.config.retry_backoff(attempt - 1);
                    warn!(
                        endpoint,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Upstream request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(
        &self,
        endpoint: &'static str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Value> {
        debug!(endpoint, url, "GET");
        let response = self.client.get(url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        if status == StatusCode::NO_CONTENT {
            return Err(ProviderError::NotFound(format!("{endpoint} returned no content")));
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Normalize a provider cell into a number
///
/// `"-"`, empty strings, null and unparsable text become `None`. Thousands
/// separators and a trailing `%` are stripped.
pub fn cell_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => {
            let cleaned: String = s.trim().chars().filter(|c| !matches!(c, ',' | '%')).collect();
            if cleaned.is_empty() || cleaned == "-" || cleaned == "--" {
                return None;
            }
            cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}

fn cell_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty() && s != "-").then(|| s.to_string())
        }
        _ => None,
    }
}

/// `data` object of a push2 envelope; `data: null` means the code is unknown
fn envelope_data<'a>(code: &Identifier, body: &'a Value) -> Result<&'a Value> {
    let Some(object) = body.as_object() else {
        return Err(ProviderError::Malformed("response is not a JSON object".to_string()));
    };
    match object.get("data") {
        Some(Value::Null) => Err(ProviderError::NotFound(format!("no quote data for {code}"))),
        Some(data @ Value::Object(_)) => Ok(data),
        Some(_) => Err(ProviderError::Malformed("`data` is not an object".to_string())),
        None => Err(ProviderError::Malformed("missing `data` field".to_string())),
    }
}

fn parse_snapshot(code: &Identifier, body: &Value) -> Result<QuoteSnapshot> {
    let data = envelope_data(code, body)?;
    let num = |field: &str| cell_f64(&data[field]);

    Ok(QuoteSnapshot {
        code: cell_string(&data["f57"]).unwrap_or_else(|| code.to_string()),
        name: cell_string(&data["f58"]),
        price: num("f43"),
        high: num("f44"),
        low: num("f45"),
        open: num("f46"),
        volume: num("f47"),
        amount: num("f48"),
        total_shares: num("f84"),
        float_shares: num("f85"),
        total_market_cap: num("f116"),
        float_market_cap: num("f117"),
        industry: cell_string(&data["f127"]),
        ps: num("f130"),
        dividend_yield: num("f133"),
        pe_dynamic: num("f162"),
        pe_static: num("f163"),
        pe_ttm: num("f164"),
        pb: num("f167"),
        turnover_rate: num("f168"),
        change: num("f169"),
        change_pct: num("f170"),
    })
}

fn kline_rows<'a>(code: &Identifier, body: &'a Value) -> Result<Vec<&'a str>> {
    let data = envelope_data(code, body)?;
    let klines = data
        .get("klines")
        .and_then(Value::as_array)
        .ok_or_else(|| ProviderError::Malformed("missing `klines` array".to_string()))?;

    klines
        .iter()
        .map(|row| {
            row.as_str()
                .ok_or_else(|| ProviderError::Malformed("kline row is not a string".to_string()))
        })
        .collect()
}

fn parse_candles(code: &Identifier, body: &Value) -> Result<Vec<Candle>> {
    let rows = kline_rows(code, body)?;
    if rows.is_empty() {
        return Err(ProviderError::NotFound(format!("no daily candles for {code}")));
    }

    rows.into_iter().map(parse_candle_row).collect()
}

fn parse_candle_row(row: &str) -> Result<Candle> {
    let cells: Vec<&str> = row.split(',').collect();
    if cells.len() < 7 {
        return Err(ProviderError::Malformed(format!(
            "kline row has {} cells, expected at least 7: {row:?}",
            cells.len()
        )));
    }

    let required = |index: usize, name: &str| {
        cells[index].trim().parse::<f64>().map_err(|_| {
            ProviderError::Malformed(format!("kline {name} {:?} is not a number", cells[index]))
        })
    };
    let optional = |index: usize| {
        cells
            .get(index)
            .and_then(|cell| cell_f64(&Value::String((*cell).to_string())))
    };

    Ok(Candle {
        date: cells[0].trim().to_string(),
        open: required(1, "open")?,
        close: required(2, "close")?,
        high: required(3, "high")?,
        low: required(4, "low")?,
        volume: required(5, "volume")?,
        amount: required(6, "amount")?,
        change_pct: optional(8),
        change: optional(9),
        turnover_rate: optional(10),
    })
}

fn parse_fund_flow(code: &Identifier, body: &Value) -> Result<FundFlow> {
    let rows = kline_rows(code, body)?;
    let Some(latest) = rows.last() else {
        return Err(ProviderError::NotFound(format!("no fund flow for {code}")));
    };

    let cells: Vec<&str> = latest.split(',').collect();
    if cells.len() < 6 {
        return Err(ProviderError::Malformed(format!(
            "fund flow row has {} cells, expected 6: {latest:?}",
            cells.len()
        )));
    }
    let num = |index: usize| cell_f64(&Value::String(cells[index].to_string()));

    Ok(FundFlow {
        date: cells[0].trim().to_string(),
        main: num(1),
        small: num(2),
        medium: num(3),
        large: num(4),
        super_large: num(5),
    })
}

fn parse_datacenter_rows(code: &Identifier, report: &str, body: &Value) -> Result<Vec<Value>> {
    if !body.is_object() {
        return Err(ProviderError::Malformed("response is not a JSON object".to_string()));
    }

    // The data center answers "no rows" with `success: false` and `result: null`
    match &body["result"] {
        Value::Null => Err(ProviderError::NotFound(format!("{report} has no rows for {code}"))),
        result => match result.get("data") {
            Some(Value::Array(rows)) if rows.is_empty() => Err(ProviderError::NotFound(format!(
                "{report} has no rows for {code}"
            ))),
            Some(Value::Array(rows)) => Ok(rows.clone()),
            Some(Value::Null) => Err(ProviderError::NotFound(format!(
                "{report} has no rows for {code}"
            ))),
            _ => Err(ProviderError::Malformed(format!(
                "{report} result carries no `data` array"
            ))),
        },
    }
}

fn parse_finance_row(row: &Value) -> FinanceIndicators {
    let num = |field: &str| cell_f64(&row[field]);

    FinanceIndicators {
        // "2024-03-31 00:00:00" → "2024-03-31"
        report_date: cell_string(&row["REPORT_DATE"])
            .map(|d| d.split_whitespace().next().unwrap_or_default().to_string()),
        revenue: num("TOTALOPERATEREVE"),
        net_profit: num("PARENTNETPROFIT"),
        gross_margin: num("XSMLL"),
        net_margin: num("XSJLL"),
        roe: num("ROEJQ"),
        roa: num("ZZCJLL"),
        debt_ratio: num("ZCFZL"),
        current_ratio: num("LD"),
        quick_ratio: num("SD"),
        revenue_yoy: num("TOTALOPERATEREVETZ"),
        net_profit_yoy: num("PARENTNETPROFITTZ"),
        inventory_turnover: num("CHZZL"),
        receivable_turnover: num("YSZKZZL"),
        total_asset_turnover: num("TOAZZL"),
    }
}

fn parse_boards(rows: &[Value]) -> Vec<Board> {
    rows.iter()
        .filter_map(|row| {
            cell_string(&row["BOARD_NAME"]).map(|name| Board {
                name,
                kind: cell_string(&row["BOARD_TYPE"]),
            })
        })
        .collect()
}
