//! Market data acquisition: auth, provider client, fetch loop, normalization

pub mod auth;
pub mod fetch_loop;
pub mod fyers;
pub mod normalize;
pub mod provider;
pub mod throttle;

pub use auth::{AccessToken, AccessTokenProvider, AuthError, RefreshTokenExchange, RefreshTokenStore};
pub use fetch_loop::{FetchLoop, FetchSummary, TickerOutcome};
pub use fyers::{FyersClient, ProviderConfig};
pub use normalize::{build_batch, normalize};
pub use provider::{FetchError, FetchProgress, LogProgress, MarketDataClient, NoProgress, Resolution};
pub use throttle::Throttle;
