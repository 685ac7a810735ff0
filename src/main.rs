//! torshare - share a video once over a temporary Tor onion service.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use torshare::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "torshare=info"
    } else {
        "torshare=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    let code = cli::run().await;

    // Exit directly: the stdin stop listener may still be blocked on a read
    // and is abandoned here rather than joined.
    std::process::exit(code);
}
