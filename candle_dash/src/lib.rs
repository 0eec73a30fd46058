pub mod app;
pub mod candles;
pub mod debug_hooks;
pub mod error;
pub mod feed;
pub mod markers;
pub mod persist;
pub mod scheduler;
pub mod sink;
pub mod timeframe;

pub use app::Dashboard;
pub use candles::{Candle, RawCandle};
pub use error::FeedError;
pub use sink::ChartSink;
pub use timeframe::Timeframe;
