//! Domain models shared across the dashboard.

pub mod bar;
pub mod exchange;
pub mod screener;
pub mod tick;

pub use bar::{PriceBar, PriceDataRow};
pub use exchange::ExchangeDetails;
pub use screener::{CrossDirection, Period, Screener, ScreenerRow, SignalSide};
pub use tick::LiveTick;
