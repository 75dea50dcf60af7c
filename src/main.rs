use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use voicebridge::{
    common::{banner, logger, types::AnyResult},
    configs::Config,
    gateway::RelayGateway,
    player::PacedDriver,
    server::{Outbound, SessionContext, SessionRegistry},
    sources::SourceManager,
    ws::{CommandRouter, ControlClient},
};

#[tokio::main]
async fn main() -> AnyResult<()> {
    let config = Config::load()?;

    banner::print_banner(&banner::BannerInfo::default());
    logger::init(config.logging.as_ref());

    let outbound = Outbound::new(config.control.buffer_capacity);
    let sources = Arc::new(SourceManager::new(&config));
    info!("Sources: {}", sources.names().join(", "));

    let ctx = Arc::new(SessionContext {
        gateway: Arc::new(RelayGateway::new(outbound.clone())),
        driver: Arc::new(PacedDriver::new()),
        sources,
        outbound: outbound.clone(),
        player: config.player.clone(),
    });
    let registry = Arc::new(SessionRegistry::new(ctx, config.sessions.limit()));
    let router = CommandRouter::new(registry.clone());

    if let Some(user_id) = &config.control.user_id {
        info!("Acting for user {}", user_id);
    }

    let cancel = CancellationToken::new();
    let client = ControlClient::new(config.control.clone(), router, outbound, cancel.clone());
    let client_task = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let result = client.run().await;
            cancel.cancel();
            result
        }
    });

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!("Unable to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        }
        _ = cancel.cancelled() => {}
    }

    // leave voice while the control channel may still be up
    registry.shutdown().await;
    cancel.cancel();

    match client_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Control client stopped: {}", e),
        Err(e) => error!("Control client task failed: {}", e),
    }

    info!("Shutdown complete");
    Ok(())
}
