//! Domain types: bars and per-timeframe policies.

pub mod bar;
pub mod timeframe;

pub use bar::Bar;
pub use timeframe::{FilterThreshold, Interval, TimeframePolicy};
