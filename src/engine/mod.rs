//! Pure chart and watchlist logic.  Nothing in here performs I/O.

pub mod ema;
pub mod market_hours;
pub mod reconciler;
pub mod watchlist;
