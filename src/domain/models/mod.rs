pub mod orderbook;
pub mod position;
pub mod types;
