use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest,
    http::HeaderValue,
    protocol::Message,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{backoff::Backoff, router::CommandRouter};
use crate::{
    common::{BridgeError, types::AnyResult},
    configs::ControlConfig,
    server::Outbound,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionOutcome {
    Shutdown,
    Reconnect,
}

/// Keeps the control channel connected: inbound frames go to the router,
/// outbound messages are written as they are produced.
pub struct ControlClient {
    config: ControlConfig,
    router: CommandRouter,
    outbound: Outbound,
    cancel: CancellationToken,
}

impl ControlClient {
    pub fn new(
        config: ControlConfig,
        router: CommandRouter,
        outbound: Outbound,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            router,
            outbound,
            cancel,
        }
    }

    /// Runs until cancelled or until reconnect attempts run out.
    pub async fn run(self) -> AnyResult<()> {
        let mut backoff = Backoff::new(
            self.config.reconnect_base_ms,
            self.config.max_reconnect_attempts,
        );

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            let delay = match self.connect(&mut backoff).await {
                Ok(ConnectionOutcome::Shutdown) => {
                    debug!("Control client shutting down cleanly");
                    return Ok(());
                }
                Ok(ConnectionOutcome::Reconnect) => {
                    if backoff.is_exhausted() {
                        warn!("Max reconnect attempts reached");
                        return Err(BridgeError::TransportDisconnect.into());
                    }
                    let delay = backoff.next();
                    info!(
                        "Control channel disconnected; reconnecting in {:?} ({} messages buffered)",
                        delay,
                        self.outbound.backlog_len()
                    );
                    delay
                }
                Err(e) => {
                    if backoff.is_exhausted() {
                        error!("Control channel error after max attempts: {}", e);
                        return Err(e);
                    }
                    let delay = backoff.next();
                    warn!(
                        "Control channel error: {}. Retrying in {:?} (attempt {})",
                        e,
                        delay,
                        backoff.attempt()
                    );
                    delay
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn connect(&self, backoff: &mut Backoff) -> AnyResult<ConnectionOutcome> {
        let mut request = self.config.url.as_str().into_client_request()?;
        if let Some(user_id) = &self.config.user_id {
            request
                .headers_mut()
                .insert("user-id", HeaderValue::from_str(user_id)?);
        }

        debug!("Connecting to control channel: {}", self.config.url);
        let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
        info!("Connected to control channel {}", self.config.url);
        backoff.reset();

        let (mut write, mut read) = ws_stream.split();
        let outgoing = self.outbound.attach();

        let outcome = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    break ConnectionOutcome::Shutdown;
                }
                json = outgoing.recv_async() => {
                    let Ok(json) = json else {
                        break ConnectionOutcome::Reconnect;
                    };
                    if let Err(e) = write.send(Message::Text(json.clone().into())).await {
                        warn!("Control channel write error: {}", e);
                        self.outbound.detach(&outgoing, Some(json));
                        break ConnectionOutcome::Reconnect;
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.router.submit(text.as_str());
                        }
                        Some(Ok(Message::Binary(data))) => {
                            warn!("Ignoring {} byte binary frame", data.len());
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!("Control channel closed by server: {:?}", frame);
                            break ConnectionOutcome::Reconnect;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("Control channel read error: {}", e);
                            break ConnectionOutcome::Reconnect;
                        }
                        None => break ConnectionOutcome::Reconnect,
                    }
                }
            }
        };

        self.outbound.detach(&outgoing, None);
        Ok(outcome)
    }
}
