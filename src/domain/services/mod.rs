pub mod exchange;
pub mod ledger;
pub mod market_maker;
pub mod matching_engine;
pub mod orderbook;
pub mod settlement;
