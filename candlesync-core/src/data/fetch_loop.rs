//! Fetch loop: walks the ticker universe one request at a time.

use super::provider::{FetchError, FetchProgress, MarketDataClient, Resolution};
use super::throttle::Throttle;
use crate::domain::{DateRange, RawCandle, Ticker};

/// What happened to one ticker.
#[derive(Debug)]
pub struct TickerOutcome {
    pub ticker: Ticker,
    pub result: Result<Vec<RawCandle>, FetchError>,
}

impl TickerOutcome {
    /// True when the ticker returned at least one candle.
    pub fn has_rows(&self) -> bool {
        self.row_count() > 0
    }

    pub fn row_count(&self) -> usize {
        self.result.as_ref().map_or(0, |rows| rows.len())
    }
}

/// Sequential, throttled fetch over a ticker list.
///
/// Provider and transport errors are recorded and the loop moves on. An auth
/// error stops the loop: every later request would fail the same way.
pub struct FetchLoop<'a> {
    client: &'a dyn MarketDataClient,
    throttle: &'a Throttle,
    progress: &'a dyn FetchProgress,
    resolution: Resolution,
}

impl<'a> FetchLoop<'a> {
    pub fn new(
        client: &'a dyn MarketDataClient,
        throttle: &'a Throttle,
        progress: &'a dyn FetchProgress,
    ) -> Self {
        Self {
            client,
            throttle,
            progress,
            resolution: Resolution::Daily,
        }
    }

    /// Fetch every ticker in order. One outcome per ticker, same order.
    pub fn run(
        &self,
        tickers: &[Ticker],
        range: DateRange,
    ) -> Result<Vec<TickerOutcome>, FetchError> {
        let total = tickers.len();
        log::info!(
            "Starting data fetch for {total} tickers from {} ({range})...",
            self.client.name()
        );

        let mut outcomes = Vec::with_capacity(total);
        for (i, ticker) in tickers.iter().enumerate() {
            self.throttle.wait();
            self.progress.on_start(ticker, i, total);

            let result = self.client.fetch(ticker, self.resolution, range);
            self.progress.on_complete(ticker, i, total, &result);

            match result {
                Err(e) if e.is_fatal() => {
                    log::error!("Aborting fetch at {ticker} ({}/{total}): {e}", i + 1);
                    return Err(e);
                }
                result => outcomes.push(TickerOutcome {
                    ticker: ticker.clone(),
                    result,
                }),
            }
        }

        let summary = FetchSummary::from_outcomes(&outcomes);
        self.progress
            .on_finish(summary.succeeded, summary.empty, summary.failed, summary.total);
        Ok(outcomes)
    }
}

/// Counts over a finished fetch loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub empty: usize,
    pub failed: usize,
    pub rows: usize,
}

impl FetchSummary {
    pub fn from_outcomes(outcomes: &[TickerOutcome]) -> Self {
        let mut summary = FetchSummary {
            total: outcomes.len(),
            ..Default::default()
        };
        for outcome in outcomes {
            match &outcome.result {
                Ok(rows) if rows.is_empty() => summary.empty += 1,
                Ok(rows) => {
                    summary.succeeded += 1;
                    summary.rows += rows.len();
                }
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::NoProgress;
    use chrono::NaiveDate;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Clone, Copy)]
    enum Answer {
        Rows,
        NotOk,
        Expired,
    }

    /// Scripted client: per-symbol canned answers, records call order.
    struct ScriptedClient {
        answers: HashMap<String, Answer>,
        calls: RefCell<Vec<String>>,
    }

    impl MarketDataClient for ScriptedClient {
        fn name(&self) -> &str {
            "scripted"
        }

        fn fetch(
            &self,
            ticker: &Ticker,
            _resolution: Resolution,
            _range: DateRange,
        ) -> Result<Vec<RawCandle>, FetchError> {
            self.calls.borrow_mut().push(ticker.to_string());
            let symbol = ticker.provider_symbol("NSE", "EQ");
            match self.answers.get(ticker.as_str()) {
                Some(Answer::Rows) => Ok(vec![
                    RawCandle { timestamp: 1718323200, open: 1.0, high: 2.0, low: 0.5, close: 1.5, volume: 10 },
                    RawCandle { timestamp: 1718409600, open: 1.5, high: 2.5, low: 1.0, close: 2.0, volume: 20 },
                ]),
                Some(Answer::NotOk) => Err(FetchError::Provider { symbol, message: "not ok".into() }),
                Some(Answer::Expired) => Err(FetchError::Auth { symbol, message: "expired".into() }),
                None => Ok(Vec::new()),
            }
        }
    }

    fn tickers(names: &[&str]) -> Vec<Ticker> {
        names.iter().map(|n| Ticker::new(n).unwrap()).collect()
    }

    fn range() -> DateRange {
        let to = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        DateRange::lookback(to, 5).unwrap()
    }

    fn client(answers: &[(&str, Answer)]) -> ScriptedClient {
        ScriptedClient {
            answers: answers.iter().map(|(k, a)| (k.to_string(), *a)).collect(),
            calls: RefCell::new(Vec::new()),
        }
    }

    #[test]
    fn continues_past_recoverable_failures() {
        let c = client(&[("ABC", Answer::Rows), ("XYZ", Answer::NotOk)]);
        let throttle = Throttle::disabled();
        let outcomes = FetchLoop::new(&c, &throttle, &NoProgress)
            .run(&tickers(&["XYZ", "ABC", "EMPTY"]), range())
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].result.is_err());
        assert_eq!(outcomes[1].row_count(), 2);
        assert!(!outcomes[2].has_rows());
        assert_eq!(*c.calls.borrow(), vec!["XYZ", "ABC", "EMPTY"]);

        let summary = FetchSummary::from_outcomes(&outcomes);
        assert_eq!(
            summary,
            FetchSummary { total: 3, succeeded: 1, empty: 1, failed: 1, rows: 2 }
        );
    }

    #[test]
    fn auth_error_aborts_remaining_tickers() {
        let c = client(&[("ABC", Answer::Rows), ("BAD", Answer::Expired)]);
        let throttle = Throttle::disabled();
        let err = FetchLoop::new(&c, &throttle, &NoProgress)
            .run(&tickers(&["ABC", "BAD", "LATER"]), range())
            .unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(*c.calls.borrow(), vec!["ABC", "BAD"]);
    }

    #[test]
    fn requests_are_paced() {
        let c = client(&[]);
        let throttle = Throttle::new(std::time::Duration::from_millis(10));
        let start = std::time::Instant::now();
        FetchLoop::new(&c, &throttle, &NoProgress)
            .run(&tickers(&["A", "B", "C"]), range())
            .unwrap();
        assert!(start.elapsed() >= std::time::Duration::from_millis(30));
    }

    #[test]
    fn empty_universe_yields_no_outcomes() {
        let c = client(&[]);
        let throttle = Throttle::disabled();
        let outcomes = FetchLoop::new(&c, &throttle, &NoProgress)
            .run(&[], range())
            .unwrap();
        assert!(outcomes.is_empty());
    }
}
