use std::sync::Arc;

use eks_token::{AmbientIdentity, TokenMinter};
use pod_census::cluster::{ClusterResolver, EksControlPlane};
use pod_census::config::HandlerConfig;
use pod_census::handler::RequestHandler;
use pod_census::kubernetes::{ApiServerPodCounter, ClientSessionBuilder};
use pod_census::serve::serve_lines;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout carries one JSON response per event
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting pod-census v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    let config = HandlerConfig::load()?;
    let sdk_config = config.aws.load_sdk_config().await;

    let resolver = ClusterResolver::with_ttl(EksControlPlane::new(&sdk_config), config.cache.ttl());
    let minter = TokenMinter::new(AmbientIdentity::from_sdk_config(&sdk_config)?);
    let pods = ApiServerPodCounter::new(ClientSessionBuilder::new(
        config.timeouts.connect(),
        config.timeouts.read(),
    ));
    let handler = Arc::new(RequestHandler::new(resolver, minter, pods, config.timeouts.call()));

    // Each stdin line is one invocation against the same warm handler
    let input = BufReader::new(tokio::io::stdin());
    let (_, answered) = serve_lines(handler.clone(), input, tokio::io::stdout()).await?;

    tracing::info!(
        "Input closed after {} event(s), {} cluster(s) cached",
        answered,
        handler.resolver().cached_len()
    );
    Ok(())
}
