//! Domain types for candlesync

pub mod candle;
pub mod date_range;
pub mod ticker;

pub use candle::{Batch, CandleRecord, CandleViolation, RawCandle};
pub use date_range::{DateRange, DateRangeError};
pub use ticker::{Ticker, TickerError, DEFAULT_EXCHANGE, DEFAULT_INSTRUMENT_SUFFIX};
