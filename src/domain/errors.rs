use thiserror::Error;

/// Errors raised while fetching or parsing exchange ticker feeds. These stay
/// inside the fetcher; the orchestrator only ever sees empty data.
#[derive(Debug, Error)]
pub enum ExchangeFeedError {
    #[error("Rate limit reached for {exchange}, retry after {retry_after_secs}s")]
    RateLimited {
        exchange: String,
        retry_after_secs: u64,
    },

    #[error("{exchange} returned HTTP {status}")]
    HttpStatus { exchange: String, status: u16 },

    #[error("Request to {exchange} timed out after {timeout_secs}s")]
    Timeout { exchange: String, timeout_secs: u64 },

    #[error("Failed to parse {exchange} payload: {reason}")]
    Parse { exchange: String, reason: String },

    #[error("No {asset_type} feed configured for {exchange}")]
    MissingFeed {
        exchange: String,
        asset_type: String,
    },
}

/// Errors from the discovery pipeline that surface to the caller as a
/// degraded envelope, never as a panic or a raw message with internals.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("No tradeable assets found")]
    EmptyUniverse,

    #[error("Portfolio unavailable: {reason}")]
    PortfolioUnavailable { reason: String },

    #[error("Scan budget exhausted after {elapsed_ms}ms")]
    BudgetExhausted { elapsed_ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_error_formatting() {
        let err = ExchangeFeedError::RateLimited {
            exchange: "kraken".into(),
            retry_after_secs: 300,
        };
        let msg = err.to_string();
        assert!(msg.contains("kraken"));
        assert!(msg.contains("300"));
    }

    #[test]
    fn test_discovery_error_is_user_safe() {
        let msg = DiscoveryError::EmptyUniverse.to_string();
        assert_eq!(msg, "No tradeable assets found");
    }
}
