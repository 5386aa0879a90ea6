//! Remote data: provider capability, Yahoo client, fetch normalization.

pub mod fetch;
pub mod provider;
pub mod yahoo;

pub use fetch::{FetchError, FetchOptions, Fetcher};
pub use provider::{DataError, DataProvider, FetchRequest, RawBar, StaticProvider};
pub use yahoo::YahooProvider;
