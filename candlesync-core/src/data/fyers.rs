//! Fyers API v3 history client.
//!
//! Fetches daily candles from `{base_url}/history`. One request per call, no
//! retries: the fetch loop decides what a failure means for the run.
//!
//! The payload is loosely typed (`candles` is an array of six-number arrays),
//! so every row goes through [`parse_candle_row`] and malformed rows are
//! dropped individually instead of failing the whole ticker.

use super::auth::AccessToken;
use super::provider::{FetchError, MarketDataClient, Resolution};
use crate::domain::{DateRange, RawCandle, Ticker, DEFAULT_EXCHANGE, DEFAULT_INSTRUMENT_SUFFIX};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Provider error codes that mean the access token is unusable.
const AUTH_ERROR_CODES: &[i64] = &[-8, -15, -16, -17];

/// Connection settings for the history endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub exchange: String,
    pub instrument_suffix: String,
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-t1.fyers.in/data".into(),
            exchange: DEFAULT_EXCHANGE.into(),
            instrument_suffix: DEFAULT_INSTRUMENT_SUFFIX.into(),
            request_delay_ms: 500,
            timeout_secs: 30,
        }
    }
}

/// `/history` response body.
#[derive(Debug, Deserialize)]
struct HistoryResponse {
    s: String,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    candles: Option<Vec<Value>>,
}

/// Why a single candle row was rejected.
#[derive(Debug, Error, PartialEq)]
pub enum RowParseError {
    #[error("expected an array of 6 values, got {0}")]
    Shape(String),

    #[error("field {index} is not a number: {value}")]
    NotNumber { index: usize, value: String },

    #[error("field {index} must be a non-negative integer, got {value}")]
    NotInteger { index: usize, value: String },
}

/// Strictly parse one `[ts, open, high, low, close, volume]` row.
pub fn parse_candle_row(row: &Value) -> Result<RawCandle, RowParseError> {
    let fields = match row.as_array() {
        Some(f) if f.len() == 6 => f,
        _ => return Err(RowParseError::Shape(row.to_string())),
    };

    let number = |index: usize| -> Result<f64, RowParseError> {
        fields[index]
            .as_f64()
            .ok_or_else(|| RowParseError::NotNumber {
                index,
                value: fields[index].to_string(),
            })
    };
    let not_integer = |index: usize| RowParseError::NotInteger {
        index,
        value: fields[index].to_string(),
    };
    // Whole-number floats are accepted only when they convert exactly.
    let whole = |index: usize, min: f64, max: f64| -> Result<f64, RowParseError> {
        let v = number(index)?;
        if !v.is_finite() || v.fract() != 0.0 || v < min || v >= max {
            return Err(not_integer(index));
        }
        Ok(v)
    };

    let timestamp = match fields[0].as_i64() {
        Some(v) => v,
        None => whole(0, i64::MIN as f64, i64::MAX as f64)? as i64,
    };
    let volume = match fields[5].as_u64() {
        Some(v) => v,
        None if fields[5].as_i64().is_some() => return Err(not_integer(5)),
        None => whole(5, 0.0, u64::MAX as f64)? as u64,
    };

    Ok(RawCandle {
        timestamp,
        open: number(1)?,
        high: number(2)?,
        low: number(3)?,
        close: number(4)?,
        volume,
    })
}

/// Fyers history client bound to one access token.
pub struct FyersClient {
    client: reqwest::blocking::Client,
    config: ProviderConfig,
    app_id: String,
    token: AccessToken,
}

impl FyersClient {
    pub fn new(config: ProviderConfig, app_id: &str, token: AccessToken) -> reqwest::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            app_id: app_id.to_string(),
            token,
        })
    }

    fn history_url(&self) -> String {
        format!("{}/history", self.config.base_url.trim_end_matches('/'))
    }

    /// Turn a decoded body into candles, classifying provider-level failures.
    fn parse_response(symbol: &str, resp: HistoryResponse) -> Result<Vec<RawCandle>, FetchError> {
        if resp.s != "ok" {
            let message = format!(
                "status '{}' (code {}): {}",
                resp.s,
                resp.code.map_or_else(|| "-".to_string(), |c| c.to_string()),
                resp.message.as_deref().unwrap_or("no message")
            );
            if resp.code.is_some_and(|c| AUTH_ERROR_CODES.contains(&c)) {
                return Err(FetchError::Auth {
                    symbol: symbol.to_string(),
                    message,
                });
            }
            if resp.s == "no_data" {
                return Ok(Vec::new());
            }
            return Err(FetchError::Provider {
                symbol: symbol.to_string(),
                message,
            });
        }

        let rows = resp.candles.unwrap_or_default();
        let mut candles = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            match parse_candle_row(row) {
                Ok(c) => candles.push(c),
                Err(e) => log::warn!("{symbol}: dropping malformed candle row {i}: {e}"),
            }
        }
        Ok(candles)
    }
}

impl MarketDataClient for FyersClient {
    fn name(&self) -> &str {
        "fyers"
    }

    fn fetch(
        &self,
        ticker: &Ticker,
        resolution: Resolution,
        range: DateRange,
    ) -> Result<Vec<RawCandle>, FetchError> {
        let symbol = ticker.provider_symbol(&self.config.exchange, &self.config.instrument_suffix);
        let range_from = range.from().format("%Y-%m-%d").to_string();
        let range_to = range.to().format("%Y-%m-%d").to_string();

        let transport = |e: reqwest::Error| FetchError::Transport {
            symbol: symbol.clone(),
            message: e.to_string(),
        };

        let resp = self
            .client
            .get(self.history_url())
            .header(
                reqwest::header::AUTHORIZATION,
                format!("{}:{}", self.app_id, self.token.secret()),
            )
            .query(&[
                ("symbol", symbol.as_str()),
                ("resolution", resolution.provider_code()),
                ("date_format", "1"),
                ("range_from", range_from.as_str()),
                ("range_to", range_to.as_str()),
                ("cont_flag", "1"),
            ])
            .send()
            .map_err(transport)?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(FetchError::Auth {
                symbol,
                message: format!("HTTP {status}"),
            });
        }

        let body = resp.text().map_err(transport)?;
        let decoded: Result<HistoryResponse, _> = serde_json::from_str(&body);

        if !status.is_success() {
            // Auth failures are sometimes reported in the body with another status.
            if let Ok(parsed) = decoded {
                if parsed.code.is_some_and(|c| AUTH_ERROR_CODES.contains(&c)) {
                    return Self::parse_response(&symbol, parsed);
                }
            }
            return Err(FetchError::Provider {
                symbol,
                message: format!("HTTP {status}"),
            });
        }

        let parsed = decoded.map_err(|e| FetchError::Provider {
            symbol: symbol.clone(),
            message: format!("malformed response: {e}"),
        })?;
        Self::parse_response(&symbol, parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;

    fn response(body: Value) -> HistoryResponse {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn parses_well_formed_row() {
        let row = json!([1718323200, 100.5, 102.0, 99.0, 101.25, 12345]);
        let c = parse_candle_row(&row).unwrap();
        assert_eq!(c.timestamp, 1718323200);
        assert_eq!(c.open, 100.5);
        assert_eq!(c.close, 101.25);
        assert_eq!(c.volume, 12345);
    }

    #[test]
    fn accepts_integral_float_volume() {
        let row = json!([1718323200, 1, 2, 0.5, 1.5, 2500.0]);
        assert_eq!(parse_candle_row(&row).unwrap().volume, 2500);
    }

    #[test]
    fn large_volumes_are_exact_or_rejected() {
        let row = json!([1718323200, 1, 2, 0.5, 1.5, 18446744073709551615u64]);
        assert_eq!(parse_candle_row(&row).unwrap().volume, u64::MAX);

        let row = json!([1718323200, 1, 2, 0.5, 1.5, 1.0e20]);
        assert!(matches!(
            parse_candle_row(&row),
            Err(RowParseError::NotInteger { index: 5, .. })
        ));

        let row = json!([1.0e19, 1, 2, 0.5, 1.5, 10]);
        assert!(matches!(
            parse_candle_row(&row),
            Err(RowParseError::NotInteger { index: 0, .. })
        ));
    }

    #[test]
    fn rejects_malformed_rows() {
        assert!(matches!(
            parse_candle_row(&json!([1, 2, 3])),
            Err(RowParseError::Shape(_))
        ));
        assert!(matches!(
            parse_candle_row(&json!({"t": 1})),
            Err(RowParseError::Shape(_))
        ));
        assert!(matches!(
            parse_candle_row(&json!([1718323200, "x", 2, 1, 1, 10])),
            Err(RowParseError::NotNumber { index: 1, .. })
        ));
        assert!(matches!(
            parse_candle_row(&json!([1718323200, 1, 2, 1, 1, 10.5])),
            Err(RowParseError::NotInteger { index: 5, .. })
        ));
        assert!(matches!(
            parse_candle_row(&json!([1718323200, 1, 2, 1, 1, -3])),
            Err(RowParseError::NotInteger { index: 5, .. })
        ));
    }

    #[test]
    fn ok_response_drops_only_bad_rows() {
        let resp = response(json!({
            "s": "ok",
            "candles": [
                [1718323200, 10, 12, 9, 11, 100],
                [1718409600, 11, "bad", 10, 12, 200],
                [1718496000, 12, 13, 11, 12.5, 300]
            ]
        }));
        let candles = FyersClient::parse_response("NSE:ABC-EQ", resp).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].timestamp, 1718496000);
    }

    #[test]
    fn error_status_is_provider_error() {
        let resp = response(json!({"s": "error", "code": -300, "message": "Invalid symbol"}));
        let err = FyersClient::parse_response("NSE:XYZ-EQ", resp).unwrap_err();
        assert!(matches!(err, FetchError::Provider { .. }));
        assert!(err.to_string().contains("Invalid symbol"));
    }

    #[test]
    fn expired_token_code_is_auth_error() {
        let resp = response(json!({"s": "error", "code": -16, "message": "Could not authenticate"}));
        let err = FyersClient::parse_response("NSE:ABC-EQ", resp).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn no_data_is_empty_success() {
        let resp = response(json!({"s": "no_data", "candles": []}));
        assert!(FyersClient::parse_response("NSE:ABC-EQ", resp).unwrap().is_empty());
    }

    #[test]
    fn ok_without_candles_is_empty() {
        let resp = response(json!({"s": "ok"}));
        assert!(FyersClient::parse_response("NSE:ABC-EQ", resp).unwrap().is_empty());
    }

    // ── HTTP behaviour against a local one-shot server ──────────────────

    /// Answer a single request with `status` and `body`; the raw request head
    /// comes back on the channel.
    fn serve_once(status: &'static str, body: &'static str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
            let _ = tx.send(String::from_utf8_lossy(&head).into_owned());
        });
        (format!("http://{addr}/data"), rx)
    }

    fn client(base_url: String, timeout_secs: u64) -> FyersClient {
        let config = ProviderConfig {
            base_url,
            timeout_secs,
            ..ProviderConfig::default()
        };
        FyersClient::new(config, "APP-100", AccessToken::new("tok-123")).unwrap()
    }

    fn fetch(client: &FyersClient) -> Result<Vec<RawCandle>, FetchError> {
        let today = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        client.fetch(
            &Ticker::new("abc").unwrap(),
            Resolution::Daily,
            DateRange::lookback(today, 5).unwrap(),
        )
    }

    #[test]
    fn sends_symbol_window_and_credentials() {
        let (url, head) = serve_once(
            "200 OK",
            r#"{"s":"ok","candles":[[1718323200,10,12,9,11,100]]}"#,
        );
        let candles = fetch(&client(url, 5)).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].volume, 100);

        let head = head.recv().unwrap().to_lowercase();
        assert!(head.starts_with("get /data/history?"), "{head}");
        for param in [
            "symbol=nse%3aabc-eq",
            "resolution=d",
            "date_format=1",
            "range_from=2024-06-09",
            "range_to=2024-06-14",
            "cont_flag=1",
        ] {
            assert!(head.contains(param), "missing {param} in {head}");
        }
        assert!(head.contains("authorization: app-100:tok-123"), "{head}");
    }

    #[test]
    fn unauthorized_and_forbidden_are_auth_errors() {
        for status in ["401 Unauthorized", "403 Forbidden"] {
            let (url, _head) = serve_once(status, "");
            let err = fetch(&client(url, 5)).unwrap_err();
            assert!(matches!(err, FetchError::Auth { .. }), "{status}: {err}");
        }
    }

    #[test]
    fn auth_code_in_error_body_is_auth_error() {
        let (url, _head) = serve_once(
            "500 Internal Server Error",
            r#"{"s":"error","code":-16,"message":"Could not authenticate"}"#,
        );
        let err = fetch(&client(url, 5)).unwrap_err();
        assert!(err.is_fatal(), "{err}");
    }

    #[test]
    fn other_error_status_is_provider_error() {
        let (url, _head) = serve_once("502 Bad Gateway", "upstream down");
        let err = fetch(&client(url, 5)).unwrap_err();
        assert!(matches!(err, FetchError::Provider { .. }), "{err}");
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn malformed_body_is_provider_error() {
        let (url, _head) = serve_once("200 OK", "<html>not json</html>");
        let err = fetch(&client(url, 5)).unwrap_err();
        assert!(matches!(err, FetchError::Provider { .. }), "{err}");
        assert!(err.to_string().contains("malformed response"));
    }

    #[test]
    fn refused_connection_is_transport_error() {
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        // listener dropped: nothing accepts on this port any more
        let err = fetch(&client(format!("http://{addr}/data"), 5)).unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }), "{err}");
        assert!(!err.is_fatal());
    }

    #[test]
    fn slow_server_times_out_as_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (_stream, _) = listener.accept().unwrap();
            std::thread::sleep(std::time::Duration::from_secs(3));
        });

        let err = fetch(&client(format!("http://{addr}/data"), 1)).unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }), "{err}");
    }
}
