pub mod orderbook;

pub use self::orderbook::{BookSide, MarketOrderBooks, OrderBook, OrderBookSide, PriceLevel};
