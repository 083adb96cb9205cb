//! One-shot discovery run: resolve a user's strategies, scan the universe,
//! print the opportunity envelope.

use anyhow::Result;
use clap::Parser;
use coinscout::application::bootstrap::ServicesBootstrap;
use coinscout::config::DiscoveryConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "scan", about = "Run one opportunity discovery pass for a user")]
struct Args {
    /// User to scan for
    #[arg(long)]
    user_id: String,

    /// Bypass cached results
    #[arg(long, default_value_t = false)]
    force_refresh: bool,

    /// Skip strategy purchase recommendations
    #[arg(long, default_value_t = false)]
    no_recommendations: bool,

    /// Activate the free default strategies before scanning
    #[arg(long, default_value_t = false)]
    onboard: bool,

    /// Print Prometheus metrics after the scan
    #[arg(long, default_value_t = false)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = DiscoveryConfig::from_env();
    let services = ServicesBootstrap::init(config).await?;

    if args.onboard {
        use coinscout::domain::ports::OnboardingHook;
        services
            .marketplace
            .provision_free_strategies(&args.user_id)
            .await?;
    }

    // Resolve the user's scan scope the way the request path does
    let exchanges = services
        .resolver
        .get_user_exchanges(Some(&args.user_id), None, None)
        .await;
    let symbols = services
        .resolver
        .get_symbol_universe(Some(&args.user_id), None, &exchanges, &["spot".into()], None)
        .await;
    tracing::info!(
        user_id = %args.user_id,
        exchanges = exchanges.len(),
        symbols = symbols.len(),
        "Resolved user universe"
    );

    let envelope = services
        .discovery
        .discover_opportunities_for_user(&args.user_id, args.force_refresh, !args.no_recommendations)
        .await;

    println!("{}", serde_json::to_string_pretty(&envelope)?);

    if args.metrics {
        eprintln!("{}", services.metrics.gather()?);
    }

    Ok(())
}
