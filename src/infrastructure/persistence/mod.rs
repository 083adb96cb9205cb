pub mod database;
pub mod exchange_account_repository;

pub use database::Database;
pub use exchange_account_repository::SqliteExchangeAccountRepository;
