pub mod client;
pub mod models;

pub use broker_trait::{BrokerClient, MarketDataSource};
pub use client::KiteClient;
pub use models::*;
