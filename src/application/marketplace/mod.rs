pub mod catalog;

pub use catalog::{InMemoryMarketplace, StrategyCatalog, free_default_strategies};
