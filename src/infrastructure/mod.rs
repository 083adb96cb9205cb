pub mod cache;
pub mod core;
pub mod exchanges;
pub mod observability;
pub mod persistence;
