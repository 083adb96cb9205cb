pub mod fallback;
pub mod opportunity_cache;
pub mod orchestrator;
pub mod recommendations;

pub use opportunity_cache::OpportunityCache;
pub use orchestrator::OpportunityDiscoveryService;
