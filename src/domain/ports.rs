//! Capability interfaces between the discovery core and its collaborators.
//!
//! Every external dependency (cache transport, marketplace, platform
//! database, onboarding) sits behind one of these traits so the composition
//! root decides the wiring and tests inject hand-rolled mocks.

use crate::domain::exchange::ExchangeAccount;
use crate::domain::strategy::PortfolioSnapshot;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Shared cache with Redis-style semantics. Implementations must treat every
/// failure as recoverable; callers log and continue on a cold path.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// SET with expiry. Racing writers produce one winner; no locking.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Atomic increment, creating the key at 1 when absent.
    async fn incr(&self, key: &str) -> Result<i64>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Keys matching a glob-style pattern (trailing `*` supported).
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;
}

/// Read-model over the strategy marketplace: which strategies a user has
/// activated and what they cost.
#[async_trait]
pub trait PortfolioReader: Send + Sync {
    async fn get_user_portfolio(&self, user_id: &str) -> Result<PortfolioSnapshot>;
}

/// Hook that provisions the free default strategies for a user with an empty
/// portfolio. Returns true when strategies were activated.
#[async_trait]
pub trait OnboardingHook: Send + Sync {
    async fn provision_free_strategies(&self, user_id: &str) -> Result<bool>;
}

/// Read-only view of the platform's exchange account table.
#[async_trait]
pub trait ExchangeAccountRepository: Send + Sync {
    /// Accounts for the user that are ACTIVE with trading enabled.
    async fn active_accounts(&self, user_id: &str) -> Result<Vec<ExchangeAccount>>;
}
